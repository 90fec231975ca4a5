//! Localized matrix factorization
//!
//! - `init`: seed boxes, Gaussian initial shapes, initial residual
//! - `local_nmf`: block coordinate descent over the components

pub mod init;
pub mod local_nmf;

pub use init::*;
pub use local_nmf::*;
