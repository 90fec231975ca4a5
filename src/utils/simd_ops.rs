//! SIMD-accelerated vector operations for the local NMF solver
//!
//! The solver spends its time in three kernels: dot products and squared
//! norms for the rank-1 update and the MSE, and `y += alpha * x` when adding
//! a component in or out of the residual. When the `simd` feature is enabled
//! these use 256-bit f64x4 lanes from `wide`; otherwise plain scalar loops.

#[cfg(feature = "simd")]
use wide::f64x4;

/// SIMD lane width (4 for f64x4)
#[cfg(feature = "simd")]
pub const SIMD_WIDTH: usize = 4;

#[cfg(not(feature = "simd"))]
pub const SIMD_WIDTH: usize = 1;

#[cfg(feature = "simd")]
#[inline]
fn load(c: &[f64]) -> f64x4 {
    f64x4::from([c[0], c[1], c[2], c[3]])
}

// ============================================================================
// Reductions
// ============================================================================

/// Compute dot product: sum(a[i] * b[i])
#[cfg(feature = "simd")]
#[inline]
pub fn dot_product(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    let mut sum = f64x4::ZERO;

    let ca = a.chunks_exact(SIMD_WIDTH);
    let cb = b.chunks_exact(SIMD_WIDTH);
    let (ra, rb) = (ca.remainder(), cb.remainder());
    for (xa, xb) in ca.zip(cb) {
        sum += load(xa) * load(xb);
    }

    let mut result = sum.reduce_add();
    for (&x, &y) in ra.iter().zip(rb) {
        result += x * y;
    }
    result
}

#[cfg(not(feature = "simd"))]
#[inline]
pub fn dot_product(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(&ai, &bi)| ai * bi).sum()
}

/// Compute squared norm: sum(a[i]^2)
#[cfg(feature = "simd")]
#[inline]
pub fn norm_squared(a: &[f64]) -> f64 {
    let mut sum = f64x4::ZERO;
    let chunks = a.chunks_exact(SIMD_WIDTH);
    let rem = chunks.remainder();
    for c in chunks {
        let v = load(c);
        sum += v * v;
    }

    let mut result = sum.reduce_add();
    for &x in rem {
        result += x * x;
    }
    result
}

#[cfg(not(feature = "simd"))]
#[inline]
pub fn norm_squared(a: &[f64]) -> f64 {
    a.iter().map(|&ai| ai * ai).sum()
}

// ============================================================================
// Element-wise updates
// ============================================================================

/// Compute y[i] = y[i] + alpha * x[i]
#[cfg(feature = "simd")]
#[inline]
pub fn axpy(y: &mut [f64], alpha: f64, x: &[f64]) {
    debug_assert_eq!(y.len(), x.len());
    let valpha = f64x4::splat(alpha);

    let mut cy = y.chunks_exact_mut(SIMD_WIDTH);
    let mut cx = x.chunks_exact(SIMD_WIDTH);
    for (dy, sx) in (&mut cy).zip(&mut cx) {
        let r = load(dy) + valpha * load(sx);
        dy.copy_from_slice(r.as_array_ref());
    }
    for (dy, &sx) in cy.into_remainder().iter_mut().zip(cx.remainder()) {
        *dy += alpha * sx;
    }
}

#[cfg(not(feature = "simd"))]
#[inline]
pub fn axpy(y: &mut [f64], alpha: f64, x: &[f64]) {
    debug_assert_eq!(y.len(), x.len());
    for (yi, &xi) in y.iter_mut().zip(x.iter()) {
        *yi += alpha * xi;
    }
}

/// Nonnegativity projection: a[i] = max(a[i], 0)
#[inline]
pub fn clamp_nonnegative(a: &mut [f64]) {
    for v in a.iter_mut() {
        if *v < 0.0 {
            *v = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_product() {
        let a = vec![1.0, 2.0, 3.0, 4.0, 5.0, -1.0];
        let b = vec![2.0, 3.0, 4.0, 5.0, 6.0, 7.0];

        let result = dot_product(&a, &b);
        let expected: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();

        assert!((result - expected).abs() < 1e-12);
    }

    #[test]
    fn test_norm_squared() {
        let a = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert!((norm_squared(&a) - 55.0).abs() < 1e-12);
        assert_eq!(norm_squared(&[]), 0.0);
    }

    #[test]
    fn test_axpy() {
        let mut a = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let b = vec![2.0, 3.0, 4.0, 5.0, 6.0];
        let alpha = -0.5;

        let expected: Vec<f64> = a.iter().zip(b.iter()).map(|(x, y)| x + alpha * y).collect();
        axpy(&mut a, alpha, &b);

        for (r, e) in a.iter().zip(expected.iter()) {
            assert!((r - e).abs() < 1e-12);
        }
    }

    #[test]
    fn test_clamp_nonnegative() {
        let mut a = vec![1.0, -2.0, 0.0, -0.0, 3.5];
        clamp_nonnegative(&mut a);
        assert_eq!(a, vec![1.0, 0.0, 0.0, 0.0, 3.5]);
    }
}
