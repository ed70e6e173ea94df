//! Integer geometry for the rift simulation substrate.
//!
//! This is the leaf crate with no internal rift dependencies. It defines
//! N-dimensional integer points, half-open axis-aligned hyperrectangles,
//! and the toroidal coordinate arithmetic the partitioning and halo layers
//! are built on.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod point;
pub mod rect;
pub mod torus;

pub use point::{Axes, Point};
pub use rect::{HyperRect, WORLD_ID};
pub use torus::{diff_axis, layer, shifted_copies, wrap, wrap_point};
