//! Error types for partition management.

use rift_geom::{HyperRect, Point};
use std::error::Error;
use std::fmt;

/// Errors from quadtree construction and mutation.
///
/// All topology errors are fatal: they abort startup or the rebalance
/// that raised them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TopologyError {
    /// The worker count cannot tile a `2^D`-way tree
    /// (`count ≢ 1 (mod 2^D − 1)`).
    InadmissibleWorkerCount {
        /// The rejected count.
        count: usize,
        /// `2^D` for the world's dimensionality.
        fanout: usize,
    },
    /// A split was requested but the id pool is empty.
    IdPoolExhausted,
    /// A split point does not lie strictly inside the target leaf.
    NotInterior {
        /// The offending point.
        point: Point,
        /// The leaf rectangle it must be strictly inside.
        rect: HyperRect,
    },
    /// A point lies outside the world rectangle.
    OutsideWorld {
        /// The offending point.
        point: Point,
    },
    /// An operation referenced a node id not present in the tree.
    UnknownNode {
        /// The missing id.
        id: i32,
    },
    /// An operation requires a leaf but the node has children.
    NotALeaf {
        /// The internal node's id.
        id: i32,
    },
}

impl fmt::Display for TopologyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InadmissibleWorkerCount { count, fanout } => write!(
                f,
                "worker count {count} is not 1 modulo {}",
                fanout - 1
            ),
            Self::IdPoolExhausted => {
                write!(f, "id pool exhausted, cannot create more partitions")
            }
            Self::NotInterior { point, rect } => {
                write!(f, "split point {point} not strictly inside {rect}")
            }
            Self::OutsideWorld { point } => {
                write!(f, "point {point} outside the world")
            }
            Self::UnknownNode { id } => write!(f, "no node with id {id}"),
            Self::NotALeaf { id } => write!(f, "node {id} is not a leaf"),
        }
    }
}

impl Error for TopologyError {}

/// Error raised by a pre- or post-commit client during a topology commit.
///
/// Commit clients move data through collectives; any failure there leaves
/// the cluster out of step, so the commit is abandoned and the worker
/// aborts with this diagnostic.
#[derive(Clone, Debug)]
pub struct CommitError {
    /// Which client failed.
    pub client: &'static str,
    /// The underlying failure rendered as text.
    pub detail: String,
}

impl fmt::Display for CommitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "commit client '{}' failed: {}", self.client, self.detail)
    }
}

impl Error for CommitError {}

/// Errors from the commit protocol as a whole.
#[derive(Debug)]
pub enum PartitionError {
    /// The underlying tree mutation failed.
    Topology(TopologyError),
    /// A registered client failed during pre- or post-commit.
    Client(CommitError),
}

impl fmt::Display for PartitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Topology(e) => write!(f, "{e}"),
            Self::Client(e) => write!(f, "{e}"),
        }
    }
}

impl Error for PartitionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Topology(e) => Some(e),
            Self::Client(e) => Some(e),
        }
    }
}

impl From<TopologyError> for PartitionError {
    fn from(e: TopologyError) -> Self {
        Self::Topology(e)
    }
}

impl From<CommitError> for PartitionError {
    fn from(e: CommitError) -> Self {
        Self::Client(e)
    }
}
