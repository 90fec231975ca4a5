//! Region cut / region add on spatiotemporal arrays
//!
//! `region_cut` copies a box (all time points) out as a `(voxels, nt)` matrix,
//! `region_add*` adds a `(voxels, nt)` contribution back in place. Both walk
//! the box in the same row-major voxel order, so a row of the cut matrix and
//! the row added by `region_add` refer to the same voxel.

use ndarray::{aview1, Array2, ArrayView1, ArrayView2};

use crate::dataset::Dataset;
use crate::error::{LocalNmfError, LocalNmfResult};
use crate::region::bbox::BoundingBox;
use crate::utils::simd_ops::axpy;

/// Extract the box region as a `(voxel_count, nt)` matrix
pub fn region_cut(array: &Dataset, bbox: &BoundingBox) -> LocalNmfResult<Array2<f64>> {
    bbox.check_fits(array.spatial_dims())?;

    let nt = array.nt();
    let n = bbox.voxel_count();
    let data = array.as_slice();
    let mut out = Array2::zeros((n, nt));

    bbox.for_each_voxel(array.spatial_dims(), |local, voxel| {
        out.row_mut(local).assign(&aview1(&data[voxel * nt..(voxel + 1) * nt]));
    });

    Ok(out)
}

/// `array[box] += contribution`
pub fn region_add(
    array: &mut Dataset,
    bbox: &BoundingBox,
    contribution: ArrayView2<f64>,
) -> LocalNmfResult<()> {
    region_add_scaled(array, bbox, contribution, 1.0)
}

/// `array[box] += alpha * contribution`
///
/// `alpha = -1.0` subtracts the contribution.
pub fn region_add_scaled(
    array: &mut Dataset,
    bbox: &BoundingBox,
    contribution: ArrayView2<f64>,
    alpha: f64,
) -> LocalNmfResult<()> {
    bbox.check_fits(array.spatial_dims())?;

    let nt = array.nt();
    let expected = (bbox.voxel_count(), nt);
    if contribution.dim() != expected {
        return Err(LocalNmfError::ContributionShape { expected, actual: contribution.dim() });
    }

    let dims = array.spatial_dims().to_vec();
    let data = array.as_mut_slice();
    bbox.for_each_voxel(&dims, |local, voxel| {
        let dst = &mut data[voxel * nt..(voxel + 1) * nt];
        let row = contribution.row(local);
        match row.as_slice() {
            Some(src) => axpy(dst, alpha, src),
            None => {
                for (d, &c) in dst.iter_mut().zip(row.iter()) {
                    *d += alpha * c;
                }
            }
        }
    });
    Ok(())
}

/// `array[box] += alpha * shape ⊗ activity` without forming the outer product
pub fn region_add_outer(
    array: &mut Dataset,
    bbox: &BoundingBox,
    shape: ArrayView1<f64>,
    activity: ArrayView1<f64>,
    alpha: f64,
) -> LocalNmfResult<()> {
    bbox.check_fits(array.spatial_dims())?;

    let nt = array.nt();
    let expected = (bbox.voxel_count(), nt);
    if shape.len() != expected.0 || activity.len() != nt {
        return Err(LocalNmfError::ContributionShape {
            expected,
            actual: (shape.len(), activity.len()),
        });
    }

    let owned;
    let activity: &[f64] = match activity.as_slice() {
        Some(s) => s,
        None => {
            owned = activity.to_vec();
            &owned
        }
    };

    let dims = array.spatial_dims().to_vec();
    let data = array.as_mut_slice();
    bbox.for_each_voxel(&dims, |local, voxel| {
        let w = alpha * shape[local];
        if w != 0.0 {
            axpy(&mut data[voxel * nt..(voxel + 1) * nt], w, activity);
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{aview1, Array};

    /// `arange(rows * cols).reshape(rows, cols).T`
    fn transposed_arange(rows: usize, cols: usize) -> Array2<f64> {
        Array::from_shape_fn((rows, cols), |(r, c)| (r * cols + c) as f64)
            .reversed_axes()
    }

    #[test]
    fn test_region_add_3d() {
        let mut z = Dataset::filled(&[3, 4, 5], 5, 1.0).unwrap();
        let x = transposed_arange(5, 8);
        let bbox = BoundingBox::new(vec![[0, 2], [1, 3], [2, 4]]);

        region_add(&mut z, &bbox, x.view()).unwrap();

        assert_eq!(z.get(&[0, 1, 2], 3), Some(25.0));
        // Last voxel of the box, last time point: 1 + x[7, 4]
        assert_eq!(z.get(&[1, 2, 3], 4), Some(1.0 + 39.0));
        // Outside the box
        assert_eq!(z.get(&[2, 1, 2], 3), Some(1.0));
        assert_eq!(z.get(&[0, 0, 2], 3), Some(1.0));
    }

    #[test]
    fn test_region_add_2d() {
        let mut z = Dataset::filled(&[6, 4], 5, 1.0).unwrap();
        let x = transposed_arange(5, 9);
        let bbox = BoundingBox::new(vec![[0, 3], [1, 4]]);

        region_add(&mut z, &bbox, x.view()).unwrap();

        assert_eq!(z.get(&[0, 1], 2), Some(19.0));
        assert_eq!(z.get(&[3, 1], 2), Some(1.0));
    }

    #[test]
    fn test_cut_returns_added_content() {
        let mut z = Dataset::zeros(&[6, 4], 5).unwrap();
        let x = transposed_arange(5, 9);
        let bbox = BoundingBox::new(vec![[0, 3], [1, 4]]);

        region_add(&mut z, &bbox, x.view()).unwrap();
        let cut = region_cut(&z, &bbox).unwrap();
        assert_eq!(cut, x);
    }

    #[test]
    fn test_cut_then_add_doubles_region() {
        let data: Vec<f64> = (0..3 * 4 * 5 * 2).map(|i| i as f64 * 0.5 - 3.0).collect();
        let original = Dataset::new(data, &[3, 4, 5], 2).unwrap();
        let bbox = BoundingBox::new(vec![[1, 3], [0, 2], [2, 5]]);

        let mut doubled = original.clone();
        let cut = region_cut(&doubled, &bbox).unwrap();
        region_add(&mut doubled, &bbox, cut.view()).unwrap();

        let mut zeroed = original.clone();
        let cut = region_cut(&zeroed, &bbox).unwrap();
        region_add_scaled(&mut zeroed, &bbox, cut.view(), -1.0).unwrap();

        for i in 0..3 {
            for j in 0..4 {
                for k in 0..5 {
                    for t in 0..2 {
                        let c = [i, j, k];
                        let v = original.get(&c, t).unwrap();
                        if bbox.contains(&c) {
                            assert_eq!(doubled.get(&c, t), Some(2.0 * v));
                            assert_eq!(zeroed.get(&c, t), Some(0.0));
                        } else {
                            assert_eq!(doubled.get(&c, t), Some(v));
                            assert_eq!(zeroed.get(&c, t), Some(v));
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_add_delta_then_cut() {
        let data: Vec<f64> = (0..6 * 4 * 3).map(|i| (i as f64).sin()).collect();
        let mut z = Dataset::new(data, &[6, 4], 3).unwrap();
        let bbox = BoundingBox::new(vec![[2, 5], [0, 2]]);
        let before = region_cut(&z, &bbox).unwrap();
        let delta = Array::from_shape_fn((6, 3), |(v, t)| (v * 3 + t) as f64 * 0.25);

        region_add(&mut z, &bbox, delta.view()).unwrap();
        let after = region_cut(&z, &bbox).unwrap();

        for ((a, b), d) in after.iter().zip(before.iter()).zip(delta.iter()) {
            assert!((a - (b + d)).abs() < 1e-12);
        }
    }

    #[test]
    fn test_add_outer_matches_matrix_add() {
        let mut a = Dataset::filled(&[5, 5], 4, 2.0).unwrap();
        let mut b = a.clone();
        let bbox = BoundingBox::new(vec![[1, 4], [2, 4]]);
        let shape = vec![1.0, -2.0, 0.5, 0.0, 3.0, 1.5];
        let activity = vec![0.5, 1.0, -1.0, 2.0];

        let outer = Array::from_shape_fn((6, 4), |(v, t)| shape[v] * activity[t]);
        region_add_scaled(&mut a, &bbox, outer.view(), -1.0).unwrap();
        region_add_outer(&mut b, &bbox, aview1(&shape), aview1(&activity), -1.0).unwrap();

        for (x, y) in a.as_slice().iter().zip(b.as_slice()) {
            assert!((x - y).abs() < 1e-12);
        }
    }

    #[test]
    fn test_cut_is_voxels_by_time() {
        let data: Vec<f64> = (0..5 * 6 * 4).map(|i| i as f64).collect();
        let z = Dataset::new(data, &[5, 6], 4).unwrap();
        let bbox = BoundingBox::new(vec![[1, 3], [4, 6]]);

        let cut = region_cut(&z, &bbox).unwrap();
        assert_eq!(cut.dim(), (4, 4));
        assert!(cut.is_standard_layout());
        // Rows walk the box row-major: (1,4) (1,5) (2,4) (2,5)
        for (row, coord) in [[1, 4], [1, 5], [2, 4], [2, 5]].iter().enumerate() {
            let voxel = z.voxel_index(coord).unwrap();
            assert_eq!(cut.row(row).to_vec(), z.trace(voxel).to_vec());
        }

        let empty = BoundingBox::new(vec![[2, 2], [0, 6]]);
        assert_eq!(region_cut(&z, &empty).unwrap().dim(), (0, 4));
    }

    #[test]
    fn test_dimension_mismatch() {
        let z = Dataset::zeros(&[3, 4, 5], 2).unwrap();
        let bbox = BoundingBox::new(vec![[0, 2], [1, 3]]);
        assert_eq!(
            region_cut(&z, &bbox),
            Err(LocalNmfError::DimensionMismatch { expected: 3, actual: 2 })
        );
    }

    #[test]
    fn test_contribution_shape_mismatch() {
        let mut z = Dataset::zeros(&[4, 4], 3).unwrap();
        let bbox = BoundingBox::new(vec![[0, 2], [0, 2]]);
        let x = Array2::<f64>::zeros((3, 3));
        assert_eq!(
            region_add(&mut z, &bbox, x.view()),
            Err(LocalNmfError::ContributionShape { expected: (4, 3), actual: (3, 3) })
        );
    }
}
