//! Halo-exchanged grid fields.
//!
//! A [`HaloField`] binds a dense grid to the spatial partition: the
//! worker's storage covers its owned rectangle plus a ghost ring of
//! [`aoi`](rift_partition::Partition::aoi) cells around it. After each
//! [`sync`](HaloField::sync) every ghost cell equals the owning worker's
//! value as of the moment that worker packed its send buffers, so local
//! reads within the halo never need communication. Reads beyond the halo
//! fall back to the published-snapshot registry; writes beyond the owned
//! rectangle either abort (numeric fields) or migrate to the owner
//! (object fields).

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod halo;
pub mod link;

pub use error::FieldError;
pub use halo::{FieldSlot, HaloField, WritePolicy};
pub use link::NeighborLink;
