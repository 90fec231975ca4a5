//! Kernel functions for component initialization
//!
//! - Separable Gaussian kernel, on the full grid or restricted to a box

pub mod gaussian;

pub use gaussian::*;
