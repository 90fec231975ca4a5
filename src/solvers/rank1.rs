//! Alternating rank-1 least squares
//!
//! Fits X ≈ s aᵀ for a `(voxels, nt)` matrix X by alternating the two
//! closed-form half-steps:
//!
//! a ← Xᵀ s / ‖s‖²,  s ← X a / ‖a‖²
//!
//! with optional projection onto the nonnegative orthant after each half-step.
//! The number of passes is fixed; there is no inner convergence test.

use ndarray::{Array1, ArrayView2};

use crate::utils::simd_ops::{clamp_nonnegative, dot_product, norm_squared};

/// Outcome of a rank-1 refinement
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rank1Outcome {
    /// All passes ran
    Completed,
    /// A factor norm collapsed to zero; refinement stopped after `passes` full passes
    Degenerate { passes: usize },
}

fn usable_norm_sq(v: &Array1<f64>) -> Option<f64> {
    let n2 = match v.as_slice() {
        Some(s) => norm_squared(s),
        None => v.dot(v),
    };
    (n2 > 0.0 && n2.is_finite()).then_some(n2)
}

/// `X v`, one contiguous row at a time
fn matvec(x: ArrayView2<f64>, v: &Array1<f64>) -> Array1<f64> {
    let Some(vs) = v.as_slice() else {
        return x.dot(v);
    };
    x.rows()
        .into_iter()
        .map(|row| match row.as_slice() {
            Some(r) => dot_product(r, vs),
            None => row.dot(v),
        })
        .collect()
}

fn project(v: &mut Array1<f64>) {
    match v.as_slice_mut() {
        Some(s) => clamp_nonnegative(s),
        None => v.mapv_inplace(|x| x.max(0.0)),
    }
}

/// Refine `shape` and `activity` in place against `x`
///
/// # Arguments
/// * `x` - Target matrix (shape.len() × activity.len())
/// * `shape` - Spatial factor, used as the starting point
/// * `activity` - Temporal factor, overwritten by the first half-step
/// * `passes` - Number of alternating passes
/// * `non_negative` - Clamp negative entries after each half-step
///
/// # Returns
/// `Degenerate` if a factor norm hit zero. The factor whose norm vanished is
/// left as is and no division by zero takes place, so the factors stay finite.
pub fn rank1_refine(
    x: ArrayView2<f64>,
    shape: &mut Array1<f64>,
    activity: &mut Array1<f64>,
    passes: usize,
    non_negative: bool,
) -> Rank1Outcome {
    debug_assert_eq!(x.nrows(), shape.len());
    debug_assert_eq!(x.ncols(), activity.len());

    for pass in 0..passes {
        let Some(s2) = usable_norm_sq(shape) else {
            return Rank1Outcome::Degenerate { passes: pass };
        };
        let mut a = x.t().dot(&*shape) / s2;
        if non_negative {
            project(&mut a);
        }
        *activity = a;

        let Some(a2) = usable_norm_sq(activity) else {
            return Rank1Outcome::Degenerate { passes: pass };
        };
        let mut s = matvec(x, activity) / a2;
        if non_negative {
            project(&mut s);
        }
        *shape = s;
    }
    Rank1Outcome::Completed
}
