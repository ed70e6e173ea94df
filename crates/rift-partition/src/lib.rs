//! Quadtree spatial partitioning for the rift simulation substrate.
//!
//! The world rectangle is recursively decomposed into a `2^D`-way tree of
//! nested hyperrectangles whose leaves tile the world exactly. Each leaf
//! is assigned to one worker rank; the [`Partition`] replica on every
//! worker answers owner and neighbor queries locally and drives the
//! coordinated commit protocol when the decomposition is rebalanced at
//! runtime.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod partition;
pub mod tree;

pub use error::{CommitError, PartitionError, TopologyError};
pub use partition::{client_handle, CommitClient, Group, Mutation, Partition};
pub use tree::{QuadTree, ROOT_ID};
