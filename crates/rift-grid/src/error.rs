//! Error types for grid storage and the byte codec.

use rift_geom::HyperRect;
use std::error::Error;
use std::fmt;

/// Errors from grid pack/unpack and wire decoding.
///
/// Every variant is fatal to the worker: a malformed buffer means two
/// workers disagree about the exchange layout, which the synchronization
/// protocol cannot recover from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GridError {
    /// A pack/unpack sub-rectangle is not fully inside the storage
    /// rectangle.
    RectOutOfStorage {
        /// The offending sub-rectangle.
        rect: HyperRect,
        /// The storage rectangle.
        storage: HyperRect,
    },
    /// A buffer ended before the expected data.
    Truncated {
        /// What was being read.
        detail: String,
    },
    /// A buffer decoded to something structurally invalid.
    Malformed {
        /// What went wrong.
        detail: String,
    },
    /// A buffer held a different number of cells than the target
    /// sub-rectangles cover.
    LengthMismatch {
        /// Bytes left over after the last expected cell.
        trailing: usize,
    },
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RectOutOfStorage { rect, storage } => {
                write!(f, "sub-rect {rect} outside storage {storage}")
            }
            Self::Truncated { detail } => write!(f, "truncated buffer: {detail}"),
            Self::Malformed { detail } => write!(f, "malformed buffer: {detail}"),
            Self::LengthMismatch { trailing } => {
                write!(f, "buffer length mismatch: {trailing} trailing bytes")
            }
        }
    }
}

impl Error for GridError {}
