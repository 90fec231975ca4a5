//! Utility functions for local NMF
//!
//! - SIMD-accelerated vector kernels (optional, with `simd` feature)

pub mod simd_ops;

pub use simd_ops::*;
