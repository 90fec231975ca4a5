//! Block-local NMF: block coordinate descent over localized rank-1 components
//!
//! The dataset is modelled as
//!
//! data ≈ Σ_l place(shape_l ⊗ activity_l, box_l)
//!
//! where every component lives in a small box around its seed. All components
//! share one residual. Each outer iteration visits the components in index
//! order (Gauss-Seidel): put the component back into the residual, refit it on
//! its box with a few alternating rank-1 passes, take the refit out again.
//! Component `l` therefore sees components `0..l` already updated in the
//! current iteration and `l+1..` from the previous one.
//!
//! Invariant between component visits:
//! residual = data - Σ_l place(shape_l ⊗ activity_l, box_l)

use std::sync::atomic::{AtomicBool, Ordering};

use ndarray::{aview1, Array1};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dataset::Dataset;
use crate::decomposition::init::{initialize_components, Components};
use crate::error::LocalNmfResult;
use crate::region::bbox::BoundingBox;
use crate::region::extract::{region_add_outer, region_cut};
use crate::solvers::rank1::{rank1_refine, Rank1Outcome};

/// Local NMF parameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalNmfParams {
    /// Project shapes and activities onto the nonnegative orthant
    pub non_negative: bool,
    /// Stop when |1 - mse_k / mse_(k-1)| < tol
    pub tol: f64,
    /// Maximum number of outer iterations
    pub max_iter: usize,
    /// Alternating rank-1 passes per component visit
    pub inner_iter: usize,
    /// Box radius in units of sigma
    pub radius_factor: f64,
    /// Log one progress line per outer iteration
    pub verbose: bool,
}

impl Default for LocalNmfParams {
    fn default() -> Self {
        Self {
            non_negative: false,
            tol: 1e-7,
            max_iter: 100,
            inner_iter: 5,
            radius_factor: 3.0,
            verbose: false,
        }
    }
}

/// Solver state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverStatus {
    Running,
    /// Relative MSE change fell below `tol`
    Converged,
    /// `max_iter` outer iterations ran without convergence
    MaxIterationsReached,
    /// Stop flag raised between outer iterations
    Cancelled,
}

impl SolverStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SolverStatus::Running => "running",
            SolverStatus::Converged => "converged",
            SolverStatus::MaxIterationsReached => "max_iterations_reached",
            SolverStatus::Cancelled => "cancelled",
        }
    }
}

/// Result of a local NMF run; per-component vectors are indexed by component
#[derive(Clone, Debug)]
pub struct LocalNmfOutput {
    /// MSE after each completed outer iteration
    pub mse_history: Vec<f64>,
    /// Spatial weights, one per voxel of the component's box (row-major)
    pub shapes: Vec<Array1<f64>>,
    /// Temporal traces, length nt
    pub activities: Vec<Array1<f64>>,
    pub boxes: Vec<BoundingBox>,
    /// Data minus the final model
    pub residual: Dataset,
    pub status: SolverStatus,
    /// Outer iterations executed
    pub iterations: usize,
}

impl LocalNmfOutput {
    pub fn component_count(&self) -> usize {
        self.boxes.len()
    }

    pub fn converged(&self) -> bool {
        self.status == SolverStatus::Converged
    }

    /// Final MSE, `None` if no iteration ran
    pub fn final_mse(&self) -> Option<f64> {
        self.mse_history.last().copied()
    }

    /// Σ_l place(shape_l ⊗ activity_l, box_l) on a grid of the dataset's shape
    pub fn reconstruct(&self) -> LocalNmfResult<Dataset> {
        let mut model = Dataset::zeros(self.residual.spatial_dims(), self.residual.nt())?;
        for ((bbox, shape), activity) in self.boxes.iter().zip(&self.shapes).zip(&self.activities) {
            region_add_outer(&mut model, bbox, shape.view(), activity.view(), 1.0)?;
        }
        Ok(model)
    }

    /// Sum of all placed shapes as one spatial map (row-major, no time axis)
    pub fn footprint_map(&self) -> LocalNmfResult<Vec<f64>> {
        let mut map = Dataset::zeros(self.residual.spatial_dims(), 1)?;
        let one = [1.0];
        for (bbox, shape) in self.boxes.iter().zip(&self.shapes) {
            region_add_outer(&mut map, bbox, shape.view(), aview1(&one), 1.0)?;
        }
        Ok(map.into_vec())
    }
}

/// Relative-change convergence test on consecutive MSE values
fn has_converged(prev: f64, current: f64, tol: f64) -> bool {
    let change = if prev > 0.0 {
        (1.0 - current / prev).abs()
    } else if current == 0.0 {
        0.0
    } else {
        f64::INFINITY
    };
    change < tol
}

/// Refit one component against the shared residual
///
/// On return the residual invariant holds again with the refit factors.
fn update_component(
    residual: &mut Dataset,
    components: &mut Components,
    l: usize,
    params: &LocalNmfParams,
) -> LocalNmfResult<Rank1Outcome> {
    let bbox = &components.boxes[l];
    let shape = &mut components.shapes[l];
    let activity = &mut components.activities[l];

    // Restore: residual now holds everything except the other components
    region_add_outer(residual, bbox, shape.view(), activity.view(), 1.0)?;

    let x = region_cut(residual, bbox)?;
    let outcome = rank1_refine(x.view(), shape, activity, params.inner_iter, params.non_negative);

    // Remove the refit contribution
    region_add_outer(residual, bbox, shape.view(), activity.view(), -1.0)?;

    Ok(outcome)
}

/// Block-local NMF
///
/// # Arguments
/// * `dataset` - Input data, D spatial axes + time
/// * `seeds` - Spatial centre of each component
/// * `activities` - Initial trace of each component (length nt)
/// * `sigma` - Per-axis Gaussian scale used for initial shapes and box radius
/// * `params` - Solver parameters
///
/// # Returns
/// Fitted components, MSE history, residual and terminal status
pub fn local_nmf(
    dataset: &Dataset,
    seeds: &[Vec<usize>],
    activities: &[Vec<f64>],
    sigma: &[f64],
    params: &LocalNmfParams,
) -> LocalNmfResult<LocalNmfOutput> {
    local_nmf_with_progress(dataset, seeds, activities, sigma, params, None, |_, _| {})
}

/// Block-local NMF with progress callback and stop flag
///
/// Same as `local_nmf` but calls `progress_callback(iteration, max_iter)` after
/// each outer iteration, and checks `stop` before starting the next one. A
/// raised flag ends the run with [`SolverStatus::Cancelled`]; the partial
/// result is returned.
pub fn local_nmf_with_progress<F>(
    dataset: &Dataset,
    seeds: &[Vec<usize>],
    activities: &[Vec<f64>],
    sigma: &[f64],
    params: &LocalNmfParams,
    stop: Option<&AtomicBool>,
    mut progress_callback: F,
) -> LocalNmfResult<LocalNmfOutput>
where
    F: FnMut(usize, usize),
{
    let (mut components, mut residual) =
        initialize_components(dataset, seeds, activities, sigma, params.radius_factor, params.non_negative)?;

    let n_components = components.len();
    let mut mse_history: Vec<f64> = Vec::with_capacity(params.max_iter.min(1024));
    let mut status = SolverStatus::Running;
    let mut iterations = 0;

    debug!(
        components = n_components,
        dims = ?dataset.spatial_dims(),
        nt = dataset.nt(),
        initial_mse = residual.mse(),
        "starting local NMF"
    );

    for iter in 0..params.max_iter {
        if stop.is_some_and(|s| s.load(Ordering::Relaxed)) {
            status = SolverStatus::Cancelled;
            break;
        }

        for l in 0..n_components {
            let outcome = update_component(&mut residual, &mut components, l, params)?;
            debug!(iteration = iter, component = l, ?outcome, "component visited");
            if let Rank1Outcome::Degenerate { passes } = outcome {
                warn!(iteration = iter, component = l, passes, "component norm collapsed to zero, refinement skipped");
            }
        }
        iterations += 1;

        let mse = residual.mse();
        let prev = mse_history.last().copied();
        mse_history.push(mse);

        if params.verbose {
            info!("{}: MSE = {:.3}", iter, mse);
        }
        progress_callback(iter + 1, params.max_iter);

        // Needs two completed iterations
        if let Some(prev) = prev {
            if has_converged(prev, mse, params.tol) {
                status = SolverStatus::Converged;
                break;
            }
        }
    }

    if status == SolverStatus::Running {
        status = SolverStatus::MaxIterationsReached;
        warn!(max_iter = params.max_iter, "Maximum iteration limit reached");
    }

    debug!(status = status.as_str(), iterations, "local NMF finished");

    Ok(LocalNmfOutput {
        mse_history,
        shapes: components.shapes,
        activities: components.activities,
        boxes: components.boxes,
        residual,
        status,
        iterations,
    })
}
