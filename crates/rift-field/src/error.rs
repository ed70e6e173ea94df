//! Error types for halo fields.

use rift_comm::{CommError, ProxyError};
use rift_geom::{HyperRect, Point};
use rift_grid::GridError;
use rift_partition::TopologyError;
use rift_transport::TransportError;
use std::error::Error;
use std::fmt;

/// Errors from field reads, writes, and synchronization.
///
/// Only remote reads recover (through the snapshot registry, which is
/// already folded into [`HaloField::get`](crate::HaloField::get)); every
/// variant that reaches a caller is fatal to the worker.
#[derive(Debug)]
pub enum FieldError {
    /// A coordinate outside the world rectangle.
    OutOfWorld {
        /// The offending point.
        point: Point,
    },
    /// A write outside the owned rectangle on a field whose values
    /// cannot be migrated.
    OutOfLocalWrite {
        /// The offending point.
        point: Point,
        /// This worker's owned rectangle.
        owned: HyperRect,
    },
    /// The field was used before registration assigned it an index.
    Unregistered,
    /// A group master reached a collect/distribute without group
    /// storage.
    MissingGroupStorage,
    /// The staged rebalance snapshot and the post-commit group role
    /// disagree (a rebalance reassigned the group master mid-commit).
    StageMismatch {
        /// What was inconsistent.
        detail: String,
    },
    /// Pack/unpack or cell decoding failed.
    Grid(GridError),
    /// A collective failed.
    Comm(CommError),
    /// The remote-read registry rejected a fallback read.
    Proxy(ProxyError),
    /// The partition could not answer an owner query.
    Topology(TopologyError),
    /// An out-of-owned object write could not be migrated.
    Transport(TransportError),
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfWorld { point } => write!(f, "point {point} outside the world"),
            Self::OutOfLocalWrite { point, owned } => {
                write!(f, "write at {point} outside owned rectangle {owned}")
            }
            Self::Unregistered => write!(f, "field used before registration"),
            Self::MissingGroupStorage => {
                write!(f, "group master called without group storage")
            }
            Self::StageMismatch { detail } => {
                write!(f, "staged snapshot inconsistent: {detail}")
            }
            Self::Grid(e) => write!(f, "{e}"),
            Self::Comm(e) => write!(f, "{e}"),
            Self::Proxy(e) => write!(f, "{e}"),
            Self::Topology(e) => write!(f, "{e}"),
            Self::Transport(e) => write!(f, "{e}"),
        }
    }
}

impl Error for FieldError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Grid(e) => Some(e),
            Self::Comm(e) => Some(e),
            Self::Proxy(e) => Some(e),
            Self::Topology(e) => Some(e),
            Self::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GridError> for FieldError {
    fn from(e: GridError) -> Self {
        Self::Grid(e)
    }
}

impl From<CommError> for FieldError {
    fn from(e: CommError) -> Self {
        Self::Comm(e)
    }
}

impl From<ProxyError> for FieldError {
    fn from(e: ProxyError) -> Self {
        Self::Proxy(e)
    }
}

impl From<TopologyError> for FieldError {
    fn from(e: TopologyError) -> Self {
        Self::Topology(e)
    }
}

impl From<TransportError> for FieldError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}
