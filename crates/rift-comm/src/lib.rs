//! Collective transport for the rift simulation substrate.
//!
//! Workers synchronize exclusively through the [`Communicator`] trait:
//! pairwise neighbor exchanges, gather/scatter, a min-reduction, and
//! barriers, over the full worker set or a sub-communicator. The
//! [`LocalCluster`] backend runs one worker per OS thread with channel
//! mailboxes, which is what tests, demos, and single-machine runs use; a
//! message-passing deployment implements the same trait.
//!
//! The crate also hosts the [`CellDirectory`], the published-snapshot
//! registry behind remote point reads.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod comm;
pub mod directory;
pub mod error;
pub mod local;

pub use comm::Communicator;
pub use directory::{CellDirectory, CellLayout, ProxyError};
pub use error::CommError;
pub use local::{LocalCluster, LocalComm};
