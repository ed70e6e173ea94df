//! Error type for the coordination loop.

use crate::config::ConfigError;
use rift_comm::CommError;
use rift_field::FieldError;
use rift_partition::{PartitionError, TopologyError};
use rift_transport::TransportError;
use std::error::Error;
use std::fmt;

/// Errors from simulation-state construction and the per-tick loop.
///
/// Everything here is fatal: the worker aborts with the diagnostic. The
/// only recovered condition in the core — a read outside the local halo
/// — never surfaces this far.
#[derive(Debug)]
pub enum EngineError {
    /// The configuration was rejected.
    Config(ConfigError),
    /// A field operation failed.
    Field(FieldError),
    /// An envelope exchange failed.
    Transport(TransportError),
    /// A collective failed.
    Comm(CommError),
    /// The partition rejected a query or mutation.
    Topology(TopologyError),
    /// A coordinated rebalance failed.
    Partition(PartitionError),
    /// An arrived envelope named a field index that was never
    /// registered.
    UnknownField {
        /// The bogus index.
        index: u32,
    },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "{e}"),
            Self::Field(e) => write!(f, "{e}"),
            Self::Transport(e) => write!(f, "{e}"),
            Self::Comm(e) => write!(f, "{e}"),
            Self::Topology(e) => write!(f, "{e}"),
            Self::Partition(e) => write!(f, "{e}"),
            Self::UnknownField { index } => {
                write!(f, "envelope names unregistered field {index}")
            }
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Field(e) => Some(e),
            Self::Transport(e) => Some(e),
            Self::Comm(e) => Some(e),
            Self::Topology(e) => Some(e),
            Self::Partition(e) => Some(e),
            Self::UnknownField { .. } => None,
        }
    }
}

impl From<ConfigError> for EngineError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<FieldError> for EngineError {
    fn from(e: FieldError) -> Self {
        Self::Field(e)
    }
}

impl From<TransportError> for EngineError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<CommError> for EngineError {
    fn from(e: CommError) -> Self {
        Self::Comm(e)
    }
}

impl From<TopologyError> for EngineError {
    fn from(e: TopologyError) -> Self {
        Self::Topology(e)
    }
}

impl From<PartitionError> for EngineError {
    fn from(e: PartitionError) -> Self {
        Self::Partition(e)
    }
}
