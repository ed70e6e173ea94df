//! Error types for envelope transport.

use rift_comm::CommError;
use rift_grid::GridError;
use rift_partition::TopologyError;
use std::error::Error;
use std::fmt;

/// Errors from migration and transporter synchronization. All fatal.
#[derive(Debug)]
pub enum TransportError {
    /// No route exists toward the destination rank.
    Unroutable {
        /// The unreachable destination.
        destination: usize,
    },
    /// A received segment failed to decode.
    Wire(GridError),
    /// The underlying collective failed.
    Comm(CommError),
    /// The partition could not answer a routing query.
    Topology(TopologyError),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unroutable { destination } => {
                write!(f, "no route toward rank {destination}")
            }
            Self::Wire(e) => write!(f, "transport wire error: {e}"),
            Self::Comm(e) => write!(f, "transport collective error: {e}"),
            Self::Topology(e) => write!(f, "transport topology error: {e}"),
        }
    }
}

impl Error for TransportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Unroutable { .. } => None,
            Self::Wire(e) => Some(e),
            Self::Comm(e) => Some(e),
            Self::Topology(e) => Some(e),
        }
    }
}

impl From<GridError> for TransportError {
    fn from(e: GridError) -> Self {
        Self::Wire(e)
    }
}

impl From<CommError> for TransportError {
    fn from(e: CommError) -> Self {
        Self::Comm(e)
    }
}

impl From<TopologyError> for TransportError {
    fn from(e: TopologyError) -> Self {
        Self::Topology(e)
    }
}
