//! Separable Gaussian kernel
//!
//! Initial component shapes are a Gaussian bump around the seed:
//!
//! g(x) = exp(-Σ_d (x_d - c_d)² / (2 σ_d)) / sqrt(2π) / Π_d σ_d
//!
//! `σ_d` enters the exponent as a variance, not a standard deviation.

use std::f64::consts::PI;

use crate::region::bbox::BoundingBox;

/// Gaussian kernel over a whole grid of shape `dims` (row-major)
///
/// # Arguments
/// * `dims` - Spatial grid shape
/// * `center` - Kernel centre per axis (voxel units)
/// * `sigma` - Per-axis scale, one entry per axis
pub fn gaussian_kernel(dims: &[usize], center: &[f64], sigma: &[f64]) -> Vec<f64> {
    gaussian_shape(&BoundingBox::full(dims), center, sigma)
}

/// Gaussian kernel evaluated only on the voxels of `bbox`
///
/// Equal to cutting [`gaussian_kernel`] to the box, in the same row-major
/// voxel order as [`crate::region::region_cut`].
pub fn gaussian_shape(bbox: &BoundingBox, center: &[f64], sigma: &[f64]) -> Vec<f64> {
    debug_assert_eq!(bbox.ndim(), center.len());
    debug_assert_eq!(bbox.ndim(), sigma.len());

    let norm = 1.0 / (2.0 * PI).sqrt() / sigma.iter().product::<f64>();

    // Outer product of 1-D profiles, last axis fastest
    let mut values = vec![norm];
    for ((&[lo, hi], &c), &s) in bbox.ranges().iter().zip(center).zip(sigma) {
        let profile: Vec<f64> = (lo..hi)
            .map(|x| {
                let dx = x as f64 - c;
                (-dx * dx / (2.0 * s)).exp()
            })
            .collect();

        values = values.iter()
            .flat_map(|&v| profile.iter().map(move |&p| v * p))
            .collect();
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use crate::region::extract::region_cut;

    #[test]
    fn test_peak_at_center() {
        let dims = [9, 7];
        let k = gaussian_kernel(&dims, &[4.0, 3.0], &[2.0, 1.5]);
        assert_eq!(k.len(), 63);

        let peak = 1.0 / (2.0 * PI).sqrt() / 3.0;
        let center_idx = 4 * 7 + 3;
        assert!((k[center_idx] - peak).abs() < 1e-12);

        let max_idx = k.iter().enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(max_idx, center_idx);
    }

    #[test]
    fn test_variance_convention() {
        // One step along axis 0 with sigma = 2 -> exp(-1 / 4)
        let k = gaussian_kernel(&[5], &[2.0], &[2.0]);
        assert!((k[3] / k[2] - (-0.25f64).exp()).abs() < 1e-12);
        assert!((k[1] - k[3]).abs() < 1e-15);
    }

    #[test]
    fn test_shape_equals_cut_of_full_kernel() {
        let dims = [6, 8, 5];
        let center = [2.0, 6.0, 1.0];
        let sigma = [1.0, 2.0, 1.5];
        let bbox = BoundingBox::from_seed(&[2, 6, 1], &[1.0, 3.0, 2.0], &dims);

        let full = Dataset::new(gaussian_kernel(&dims, &center, &sigma), &dims, 1).unwrap();
        let cut = region_cut(&full, &bbox).unwrap();
        let shape = gaussian_shape(&bbox, &center, &sigma);

        assert_eq!(shape.len(), bbox.voxel_count());
        for (a, b) in shape.iter().zip(cut.iter()) {
            assert!((a - b).abs() < 1e-15);
        }
    }

    #[test]
    fn test_empty_box() {
        let bbox = BoundingBox::new(vec![[2, 2], [0, 3]]);
        assert!(gaussian_shape(&bbox, &[2.0, 1.0], &[1.0, 1.0]).is_empty());
    }
}
