//! Inter-worker migration of agents, work items, and field values.
//!
//! A [`Transporter`] keeps one append buffer per direct neighbor and an
//! inbox of arrived [`Envelope`]s. Migrations to a direct neighbor ride
//! the next exchange; migrations to anyone else are handed to the
//! neighbor nearest the destination and forwarded one hop per exchange,
//! which in a quadtree neighbor graph delivers within the graph diameter.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod envelope;
pub mod error;
pub mod transporter;

pub use envelope::{Envelope, FieldIndex, Payload};
pub use error::TransportError;
pub use transporter::Transporter;
