//! Component initialization
//!
//! Each seed gets a box of radius `radius_factor * sigma`, a Gaussian initial
//! shape restricted to that box, and the caller's initial activity. The
//! residual starts as the dataset minus every initial reconstruction.

use ndarray::{aview1, Array1};
use tracing::debug;

use crate::dataset::Dataset;
use crate::error::{LocalNmfError, LocalNmfResult};
use crate::kernels::gaussian::gaussian_shape;
use crate::region::bbox::BoundingBox;
use crate::region::extract::region_add_outer;

/// Ordered component list; box, shape and activity share index `l`
#[derive(Clone, Debug, PartialEq)]
pub struct Components {
    pub boxes: Vec<BoundingBox>,
    pub shapes: Vec<Array1<f64>>,
    pub activities: Vec<Array1<f64>>,
}

impl Components {
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }
}

/// Check solver inputs against the dataset
pub fn validate_inputs(
    dataset: &Dataset,
    seeds: &[Vec<usize>],
    activities: &[Vec<f64>],
    sigma: &[f64],
) -> LocalNmfResult<()> {
    let rank = dataset.spatial_rank();
    let dims = dataset.spatial_dims();

    if seeds.len() != activities.len() {
        return Err(LocalNmfError::ComponentCount {
            seeds: seeds.len(),
            activities: activities.len(),
        });
    }
    if sigma.len() != rank {
        return Err(LocalNmfError::ScaleLength { expected: rank, actual: sigma.len() });
    }
    if let Some((axis, &value)) = sigma.iter().enumerate().find(|(_, s)| !(s.is_finite() && **s > 0.0)) {
        return Err(LocalNmfError::InvalidScale { axis, value });
    }

    for (component, (seed, activity)) in seeds.iter().zip(activities).enumerate() {
        if seed.len() != rank {
            return Err(LocalNmfError::DimensionMismatch { expected: rank, actual: seed.len() });
        }
        for (axis, (&coord, &size)) in seed.iter().zip(dims).enumerate() {
            if coord >= size {
                return Err(LocalNmfError::SeedOutOfBounds { component, axis, coord, size });
            }
        }
        if activity.len() != dataset.nt() {
            return Err(LocalNmfError::ActivityLength {
                component,
                expected: dataset.nt(),
                actual: activity.len(),
            });
        }
    }
    Ok(())
}

/// Build initial components and the matching residual
///
/// # Arguments
/// * `dataset` - Input data, left untouched
/// * `seeds` - One spatial coordinate per component
/// * `activities` - One initial trace (length nt) per component
/// * `sigma` - Per-axis Gaussian scale, shared by all components
/// * `radius_factor` - Box radius in units of `sigma`
/// * `non_negative` - Clamp initial activities to >= 0
///
/// # Returns
/// (components, residual) with residual = dataset - Σ place(shape ⊗ activity)
pub fn initialize_components(
    dataset: &Dataset,
    seeds: &[Vec<usize>],
    activities: &[Vec<f64>],
    sigma: &[f64],
    radius_factor: f64,
    non_negative: bool,
) -> LocalNmfResult<(Components, Dataset)> {
    validate_inputs(dataset, seeds, activities, sigma)?;

    let dims = dataset.spatial_dims();
    let radius: Vec<f64> = sigma.iter().map(|&s| radius_factor * s).collect();
    let mut residual = dataset.clone();

    let mut components = Components {
        boxes: Vec::with_capacity(seeds.len()),
        shapes: Vec::with_capacity(seeds.len()),
        activities: Vec::with_capacity(seeds.len()),
    };

    for (l, (seed, activity)) in seeds.iter().zip(activities).enumerate() {
        let bbox = BoundingBox::from_seed(seed, &radius, dims);
        let center: Vec<f64> = seed.iter().map(|&c| c as f64).collect();
        let shape = gaussian_shape(&bbox, &center, sigma);
        let mut activity = Array1::from(activity.clone());
        if non_negative {
            activity.mapv_inplace(|a| a.max(0.0));
        }

        debug!(component = l, ranges = ?bbox.ranges(), voxels = bbox.voxel_count(), "initialized component");

        region_add_outer(&mut residual, &bbox, aview1(&shape), activity.view(), -1.0)?;

        components.boxes.push(bbox);
        components.shapes.push(Array1::from(shape));
        components.activities.push(activity);
    }

    Ok((components, residual))
}
