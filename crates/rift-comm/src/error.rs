//! Error types for collective transport.

use std::error::Error;
use std::fmt;
use std::time::Duration;

/// Errors from collective operations.
///
/// Every variant is fatal to the worker: the neighbor topology is static
/// between rebalance commits, so a failed collective means a worker is
/// gone or out of step, which is outside the failure model. There are no
/// retries.
#[derive(Clone, Debug)]
pub enum CommError {
    /// A peer's mailbox is gone (its thread or process terminated).
    Down {
        /// The unreachable rank.
        rank: usize,
    },
    /// A peer did not produce the expected message in time.
    Stalled {
        /// The rank that never answered.
        rank: usize,
        /// How long this worker waited.
        waited: Duration,
    },
    /// The two sides of a collective disagreed about its shape.
    Protocol {
        /// What was inconsistent.
        detail: String,
    },
}

impl fmt::Display for CommError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Down { rank } => write!(f, "rank {rank} is unreachable"),
            Self::Stalled { rank, waited } => {
                write!(f, "rank {rank} stalled for {waited:?} in a collective")
            }
            Self::Protocol { detail } => write!(f, "collective protocol violation: {detail}"),
        }
    }
}

impl Error for CommError {}
