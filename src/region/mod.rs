//! Region primitives for block-local processing
//!
//! - `bbox`: seed-centred bounding boxes clipped to the grid
//! - `extract`: region cut (box → `(voxels, nt)` matrix) and region add

pub mod bbox;
pub mod extract;

pub use bbox::*;
pub use extract::*;
