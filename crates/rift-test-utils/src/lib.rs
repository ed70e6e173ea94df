//! Shared fixtures for rift tests.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

pub use fixtures::{
    reference_neighbor_table, reference_partition, reference_split_points, reference_tree,
    square_world,
};
