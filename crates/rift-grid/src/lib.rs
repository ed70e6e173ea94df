//! Dense per-cell storage over integer hyperrectangles.
//!
//! A [`DenseGrid`] holds one value per cell of a rectangle in row-major
//! order and can pack and unpack arbitrary lists of sub-rectangles to and
//! from byte buffers. The wire form of a cell is defined by the [`Cell`]
//! trait; everything on the wire is little-endian with IEEE-754 bit
//! patterns, so buffers are bit-identical across workers.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod cell;
pub mod codec;
pub mod dense;
pub mod error;

pub use cell::Cell;
pub use codec::ByteReader;
pub use dense::DenseGrid;
pub use error::GridError;

/// Dense storage whose cells are optional records; absent cells encode as
/// a single presence byte.
pub type ObjectGrid<R> = DenseGrid<Option<R>>;
