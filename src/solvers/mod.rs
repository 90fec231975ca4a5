//! Inner solvers for local NMF
//!
//! - Rank-1: alternating (optionally nonnegative) rank-1 least squares

pub mod rank1;

pub use rank1::*;
