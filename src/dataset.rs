//! Dense spatiotemporal arrays
//!
//! A [`Dataset`] holds D spatial axes plus one temporal axis in a single flat
//! buffer. The layout is row-major over `[d0, d1, .., dD-1, t]`, so the time
//! trace of every voxel is one contiguous run of `nt` samples:
//!
//! index = voxel * nt + t, voxel = Σ coord[d] * stride[d]
//!
//! The same type doubles as the solver's residual, which is only ever touched
//! through [`crate::region::region_cut`] and the `region_add*` family.

use ndarray::{ArrayD, IxDyn};

use crate::error::{LocalNmfError, LocalNmfResult};
use crate::utils::simd_ops::norm_squared;

/// Row-major strides for a spatial shape (last axis varies fastest)
pub fn row_major_strides(dims: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; dims.len()];
    for d in (0..dims.len().saturating_sub(1)).rev() {
        strides[d] = strides[d + 1] * dims[d + 1];
    }
    strides
}

/// Spatiotemporal array: spatial shape + time length + flat samples
#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
    spatial_dims: Vec<usize>,
    nt: usize,
    data: Vec<f64>,
}

impl Dataset {
    /// Wrap a flat buffer laid out as `[d0, .., dD-1, t]`
    pub fn new(data: Vec<f64>, spatial_dims: &[usize], nt: usize) -> LocalNmfResult<Self> {
        let expected = checked_len(spatial_dims, nt)?;
        if data.len() != expected {
            return Err(LocalNmfError::DataLength { expected, actual: data.len() });
        }
        Ok(Self { spatial_dims: spatial_dims.to_vec(), nt, data })
    }

    /// All-zero dataset
    pub fn zeros(spatial_dims: &[usize], nt: usize) -> LocalNmfResult<Self> {
        let n = checked_len(spatial_dims, nt)?;
        Ok(Self { spatial_dims: spatial_dims.to_vec(), nt, data: vec![0.0; n] })
    }

    /// Dataset filled with a constant
    pub fn filled(spatial_dims: &[usize], nt: usize, value: f64) -> LocalNmfResult<Self> {
        let mut ds = Self::zeros(spatial_dims, nt)?;
        ds.data.fill(value);
        Ok(ds)
    }

    /// Build from an n-d array whose last axis is time
    pub fn from_array(array: ArrayD<f64>) -> LocalNmfResult<Self> {
        let shape = array.shape().to_vec();
        let Some((&nt, spatial)) = shape.split_last() else {
            return Err(LocalNmfError::EmptyDataset);
        };
        // Logical iteration order is row-major regardless of memory layout
        let data: Vec<f64> = array.iter().copied().collect();
        Self::new(data, spatial, nt)
    }

    /// Copy out as an n-d array of shape `[d0, .., dD-1, nt]`
    pub fn to_array(&self) -> LocalNmfResult<ArrayD<f64>> {
        let mut shape = self.spatial_dims.clone();
        shape.push(self.nt);
        ArrayD::from_shape_vec(IxDyn(&shape), self.data.clone()).map_err(|_| {
            LocalNmfError::DataLength { expected: shape.iter().product(), actual: self.data.len() }
        })
    }

    pub fn spatial_dims(&self) -> &[usize] {
        &self.spatial_dims
    }

    /// Number of spatial axes
    pub fn spatial_rank(&self) -> usize {
        self.spatial_dims.len()
    }

    /// Length of the temporal axis
    pub fn nt(&self) -> usize {
        self.nt
    }

    /// Number of spatial voxels
    pub fn n_voxels(&self) -> usize {
        self.spatial_dims.iter().product()
    }

    /// Total number of samples (voxels * time points)
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    /// Flat spatial index of a coordinate, `None` if outside the grid
    pub fn voxel_index(&self, coord: &[usize]) -> Option<usize> {
        if coord.len() != self.spatial_dims.len() {
            return None;
        }
        let strides = row_major_strides(&self.spatial_dims);
        let mut idx = 0;
        for ((&c, &n), &s) in coord.iter().zip(&self.spatial_dims).zip(&strides) {
            if c >= n {
                return None;
            }
            idx += c * s;
        }
        Some(idx)
    }

    /// Time trace of one voxel (flat spatial index)
    pub fn trace(&self, voxel: usize) -> &[f64] {
        &self.data[voxel * self.nt..(voxel + 1) * self.nt]
    }

    /// Sample at spatial coordinate `coord`, time `t`
    pub fn get(&self, coord: &[usize], t: usize) -> Option<f64> {
        if t >= self.nt {
            return None;
        }
        self.voxel_index(coord).map(|v| self.data[v * self.nt + t])
    }

    /// Sum of squared samples
    pub fn sum_squares(&self) -> f64 {
        norm_squared(&self.data)
    }

    /// Mean squared value over all samples
    pub fn mse(&self) -> f64 {
        self.sum_squares() / self.data.len() as f64
    }
}

/// Sample count `Π spatial_dims * nt` of a non-empty shape
///
/// Fails with `ShapeOverflow` if the count, or its size in bytes, does not
/// fit in `usize`/`isize`.
pub fn checked_len(spatial_dims: &[usize], nt: usize) -> LocalNmfResult<usize> {
    if spatial_dims.is_empty() || nt == 0 || spatial_dims.iter().any(|&n| n == 0) {
        return Err(LocalNmfError::EmptyDataset);
    }
    spatial_dims.iter()
        .try_fold(nt, |acc, &n| acc.checked_mul(n))
        .filter(|&len| {
            len.checked_mul(std::mem::size_of::<f64>())
                .is_some_and(|bytes| bytes <= isize::MAX as usize)
        })
        .ok_or_else(|| LocalNmfError::ShapeOverflow { dims: spatial_dims.to_vec(), nt })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;

    #[test]
    fn test_strides() {
        assert_eq!(row_major_strides(&[3, 4, 5]), vec![20, 5, 1]);
        assert_eq!(row_major_strides(&[7]), vec![1]);
    }

    #[test]
    fn test_layout_matches_ndarray() {
        let arr = Array::from_shape_fn(IxDyn(&[3, 4, 2]), |ix| (ix[0] * 100 + ix[1] * 10 + ix[2]) as f64);
        let ds = Dataset::from_array(arr.clone()).unwrap();

        assert_eq!(ds.spatial_dims(), &[3, 4]);
        assert_eq!(ds.nt(), 2);
        assert_eq!(ds.get(&[2, 3], 1), Some(231.0));
        assert_eq!(ds.trace(ds.voxel_index(&[1, 2]).unwrap()), &[120.0, 121.0]);
        assert_eq!(ds.to_array().unwrap(), arr);
    }

    #[test]
    fn test_from_non_standard_layout() {
        // Transposed view: logical order must win over memory order
        let arr = Array::from_shape_fn(IxDyn(&[2, 3]), |ix| (ix[0] * 3 + ix[1]) as f64);
        let transposed = arr.t().to_owned();
        let ds = Dataset::from_array(transposed).unwrap();
        assert_eq!(ds.spatial_dims(), &[3]);
        assert_eq!(ds.get(&[2], 1), Some(5.0));
    }

    #[test]
    fn test_rejects_bad_shapes() {
        assert_eq!(Dataset::zeros(&[], 4), Err(LocalNmfError::EmptyDataset));
        assert_eq!(Dataset::zeros(&[3, 0], 4), Err(LocalNmfError::EmptyDataset));
        assert_eq!(Dataset::zeros(&[3], 0), Err(LocalNmfError::EmptyDataset));
        assert_eq!(
            Dataset::new(vec![0.0; 5], &[2, 2], 1),
            Err(LocalNmfError::DataLength { expected: 4, actual: 5 })
        );
    }

    #[test]
    fn test_oversized_shape_is_an_error() {
        // 2^66 samples: the unchecked product would wrap to 0 and accept an empty buffer
        assert_eq!(
            Dataset::new(vec![], &[1 << 22; 3], 1),
            Err(LocalNmfError::ShapeOverflow { dims: vec![1 << 22; 3], nt: 1 })
        );
        assert!(matches!(
            Dataset::zeros(&[usize::MAX, 2], 1),
            Err(LocalNmfError::ShapeOverflow { .. })
        ));
        // Fits in usize but not as bytes
        assert!(matches!(checked_len(&[1 << 21; 3], 1), Err(LocalNmfError::ShapeOverflow { .. })));
        assert_eq!(checked_len(&[3, 4], 5), Ok(60));
    }

    #[test]
    fn test_mse() {
        let ds = Dataset::new(vec![1.0, -1.0, 2.0, 0.0], &[2], 2).unwrap();
        assert!((ds.mse() - 1.5).abs() < 1e-12);
        assert_eq!(ds.get(&[2], 0), None);
        assert_eq!(ds.get(&[0], 2), None);
    }
}
