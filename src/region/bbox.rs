//! Axis-aligned bounding boxes around component seeds

use serde::{Deserialize, Serialize};

use crate::dataset::row_major_strides;
use crate::error::{LocalNmfError, LocalNmfResult};

/// Half-open spatial box: `ranges[d] = [lo, hi)` on spatial axis `d`
///
/// Boxes are built once per component and never resized.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    ranges: Vec<[usize; 2]>,
}

impl BoundingBox {
    /// Box from explicit `[lo, hi)` ranges
    ///
    /// A range with `hi < lo` is collapsed to empty at `lo`.
    pub fn new(ranges: Vec<[usize; 2]>) -> Self {
        let ranges = ranges.into_iter().map(|[lo, hi]| [lo, hi.max(lo)]).collect();
        Self { ranges }
    }

    /// Box covering an entire spatial grid
    pub fn full(dims: &[usize]) -> Self {
        Self { ranges: dims.iter().map(|&n| [0, n]).collect() }
    }

    /// Box of radius `radius` around `seed`, clipped to `[0, dims)`
    ///
    /// Per axis: `lo = max(seed - r, 0)`, `hi = min(seed + r + 1, dims)`, so an
    /// unclipped box spans `2r + 1` voxels. Fractional bounds truncate toward
    /// zero. A seed outside the grid yields an empty box rather than an error.
    pub fn from_seed(seed: &[usize], radius: &[f64], dims: &[usize]) -> Self {
        let ranges = seed.iter().zip(radius).zip(dims)
            .map(|((&c, &r), &n)| {
                let r = if r.is_finite() { r.max(0.0) } else { 0.0 };
                let c = c as f64;
                let lo = (c - r).max(0.0) as usize;
                let hi = (c + r + 1.0).min(n as f64) as usize;
                [lo.min(hi), hi]
            })
            .collect();
        Self { ranges }
    }

    /// Number of spatial axes
    pub fn ndim(&self) -> usize {
        self.ranges.len()
    }

    pub fn ranges(&self) -> &[[usize; 2]] {
        &self.ranges
    }

    pub fn lo(&self, axis: usize) -> usize {
        self.ranges[axis][0]
    }

    pub fn hi(&self, axis: usize) -> usize {
        self.ranges[axis][1]
    }

    /// Per-axis extents `hi - lo`
    pub fn extents(&self) -> Vec<usize> {
        self.ranges.iter().map(|[lo, hi]| hi - lo).collect()
    }

    /// Number of voxels inside the box
    pub fn voxel_count(&self) -> usize {
        self.ranges.iter().map(|[lo, hi]| hi - lo).product()
    }

    pub fn is_empty(&self) -> bool {
        self.voxel_count() == 0
    }

    /// Whether a spatial coordinate lies inside the box
    pub fn contains(&self, coord: &[usize]) -> bool {
        coord.len() == self.ranges.len()
            && coord.iter().zip(&self.ranges).all(|(&c, [lo, hi])| c >= *lo && c < *hi)
    }

    /// Check that the box fits a spatial grid of shape `dims`
    pub fn check_fits(&self, dims: &[usize]) -> LocalNmfResult<()> {
        if self.ranges.len() != dims.len() {
            return Err(LocalNmfError::DimensionMismatch {
                expected: dims.len(),
                actual: self.ranges.len(),
            });
        }
        for (axis, ([_, hi], &size)) in self.ranges.iter().zip(dims).enumerate() {
            if *hi > size {
                return Err(LocalNmfError::BoxOutOfBounds { axis, hi: *hi, size });
            }
        }
        Ok(())
    }

    /// Visit every voxel of the box in row-major order
    ///
    /// `f(local, voxel)` receives the voxel's position within the box and its
    /// flat spatial index in a grid of shape `dims`. Callers must have checked
    /// the box with [`check_fits`](Self::check_fits).
    pub fn for_each_voxel<F>(&self, dims: &[usize], mut f: F)
    where
        F: FnMut(usize, usize),
    {
        if self.is_empty() {
            return;
        }
        let strides = row_major_strides(dims);
        let extents = self.extents();
        let ndim = extents.len();
        let mut counter = vec![0usize; ndim];
        let mut voxel: usize = self.ranges.iter().zip(&strides).map(|([lo, _], s)| lo * s).sum();
        let mut local = 0usize;

        loop {
            f(local, voxel);
            local += 1;

            // Odometer step, last axis fastest
            let mut axis = ndim;
            loop {
                if axis == 0 {
                    return;
                }
                axis -= 1;
                counter[axis] += 1;
                voxel += strides[axis];
                if counter[axis] < extents[axis] {
                    break;
                }
                voxel -= strides[axis] * extents[axis];
                counter[axis] = 0;
            }
        }
    }
}

/// Bounding box for a seed, see [`BoundingBox::from_seed`]
pub fn compute_box(seed: &[usize], radius: &[f64], dims: &[usize]) -> BoundingBox {
    BoundingBox::from_seed(seed, radius, dims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_interior() {
        let b = compute_box(&[10, 20], &[3.0, 2.0], &[50, 50]);
        assert_eq!(b.ranges(), &[[7, 14], [18, 23]]);
        assert_eq!(b.extents(), vec![7, 5]);
        assert_eq!(b.voxel_count(), 35);
    }

    #[test]
    fn test_box_clipped_at_edges() {
        let b = compute_box(&[1, 48], &[3.0, 3.0], &[50, 50]);
        assert_eq!(b.lo(0), 0);
        assert_eq!(b.hi(0), 5);
        assert_eq!(b.lo(1), 45);
        assert_eq!(b.hi(1), 50);

        // Radius larger than the whole grid
        let b = compute_box(&[2], &[100.0], &[5]);
        assert_eq!(b.ranges(), &[[0, 5]]);
    }

    #[test]
    fn test_box_fractional_radius() {
        let b = compute_box(&[10], &[4.5], &[40]);
        assert_eq!(b.ranges(), &[[5, 15]]);
    }

    #[test]
    fn test_seed_outside_grid_is_empty() {
        let b = compute_box(&[20], &[2.0], &[10]);
        assert!(b.is_empty());
        assert!(b.lo(0) <= b.hi(0));
        assert!(b.hi(0) <= 10);
    }

    #[test]
    fn test_check_fits() {
        let b = BoundingBox::new(vec![[0, 2], [1, 3]]);
        assert!(b.check_fits(&[4, 4]).is_ok());
        assert_eq!(
            b.check_fits(&[4, 4, 4]),
            Err(LocalNmfError::DimensionMismatch { expected: 3, actual: 2 })
        );
        assert_eq!(
            b.check_fits(&[4, 2]),
            Err(LocalNmfError::BoxOutOfBounds { axis: 1, hi: 3, size: 2 })
        );
    }

    #[test]
    fn test_voxel_order_is_row_major() {
        let dims = [3, 4, 5];
        let b = BoundingBox::new(vec![[1, 3], [0, 2], [3, 5]]);
        let mut visited = Vec::new();
        b.for_each_voxel(&dims, |local, voxel| visited.push((local, voxel)));

        let mut expected = Vec::new();
        let mut local = 0;
        for i in 1..3 {
            for j in 0..2 {
                for k in 3..5 {
                    expected.push((local, i * 20 + j * 5 + k));
                    local += 1;
                }
            }
        }
        assert_eq!(visited, expected);
    }

    #[test]
    fn test_contains() {
        let b = BoundingBox::new(vec![[0, 2], [1, 3]]);
        assert!(b.contains(&[1, 2]));
        assert!(!b.contains(&[2, 2]));
        assert!(!b.contains(&[1]));
    }
}
