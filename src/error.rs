//! Error types for local NMF

use thiserror::Error;

/// Result type for local NMF operations
pub type LocalNmfResult<T> = Result<T, LocalNmfError>;

/// Errors that can occur while building regions or running the solver
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocalNmfError {
    /// Box rank does not match the array's spatial rank
    #[error("box has the wrong number of dimensions: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Box reaches past the end of an axis
    #[error("box exceeds axis {axis}: upper bound {hi} > size {size}")]
    BoxOutOfBounds { axis: usize, hi: usize, size: usize },

    /// Contribution matrix does not cover the box
    #[error("contribution shape mismatch: expected {expected:?}, got {actual:?}")]
    ContributionShape {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    /// Seeds and initial activities differ in count
    #[error("got {seeds} seeds but {activities} initial activities")]
    ComponentCount { seeds: usize, activities: usize },

    /// Initial activity trace is not T samples long
    #[error("activity {component} has length {actual}, expected {expected}")]
    ActivityLength {
        component: usize,
        expected: usize,
        actual: usize,
    },

    /// Seed lies outside the dataset
    #[error("seed {component} is out of bounds on axis {axis}: {coord} >= {size}")]
    SeedOutOfBounds {
        component: usize,
        axis: usize,
        coord: usize,
        size: usize,
    },

    /// Wrong number of spatial scale entries
    #[error("expected {expected} spatial scale entries, got {actual}")]
    ScaleLength { expected: usize, actual: usize },

    /// Spatial scale must be positive and finite
    #[error("invalid spatial scale on axis {axis}: {value}")]
    InvalidScale { axis: usize, value: f64 },

    /// Dataset needs at least one spatial axis and one time point
    #[error("dataset must have at least one spatial and one temporal sample")]
    EmptyDataset,

    /// Sample count of the declared shape does not fit in memory
    #[error("dataset shape {dims:?} x {nt} is too large")]
    ShapeOverflow { dims: Vec<usize>, nt: usize },

    /// Flat buffer length does not match the declared shape
    #[error("data length mismatch: expected {expected}, got {actual}")]
    DataLength { expected: usize, actual: usize },

    /// NIfTI decode/encode failure
    #[error("NIfTI error: {0}")]
    Nifti(String),
}
