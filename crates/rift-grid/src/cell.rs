//! The per-cell wire form.

use crate::codec::{self, ByteReader};
use crate::error::GridError;

/// A value that can live in a grid cell and travel between workers.
///
/// Numeric primitives encode as fixed-width little-endian values, which
/// lets pack/unpack stream whole row spans. Optional records encode a
/// presence byte followed by the record body, so empty cells cost one
/// byte on the wire.
pub trait Cell: Clone {
    /// Append this value's wire form to `buf`.
    fn encode(&self, buf: &mut Vec<u8>);

    /// Decode one value from the reader.
    fn decode(r: &mut ByteReader<'_>) -> Result<Self, GridError>;

    /// Encoded width in bytes when every value of the type has the same
    /// one. Variable-width cells return `None`.
    fn fixed_width() -> Option<usize> {
        None
    }
}

impl Cell for i32 {
    fn encode(&self, buf: &mut Vec<u8>) {
        codec::put_i32(buf, *self);
    }

    fn decode(r: &mut ByteReader<'_>) -> Result<Self, GridError> {
        r.i32()
    }

    fn fixed_width() -> Option<usize> {
        Some(4)
    }
}

impl Cell for i64 {
    fn encode(&self, buf: &mut Vec<u8>) {
        codec::put_i64(buf, *self);
    }

    fn decode(r: &mut ByteReader<'_>) -> Result<Self, GridError> {
        r.i64()
    }

    fn fixed_width() -> Option<usize> {
        Some(8)
    }
}

impl Cell for f32 {
    fn encode(&self, buf: &mut Vec<u8>) {
        codec::put_f32(buf, *self);
    }

    fn decode(r: &mut ByteReader<'_>) -> Result<Self, GridError> {
        r.f32()
    }

    fn fixed_width() -> Option<usize> {
        Some(4)
    }
}

impl Cell for f64 {
    fn encode(&self, buf: &mut Vec<u8>) {
        codec::put_f64(buf, *self);
    }

    fn decode(r: &mut ByteReader<'_>) -> Result<Self, GridError> {
        r.f64()
    }

    fn fixed_width() -> Option<usize> {
        Some(8)
    }
}

/// Opaque byte payloads: applications serialize their records however
/// they like and store the bytes.
impl Cell for Vec<u8> {
    fn encode(&self, buf: &mut Vec<u8>) {
        codec::put_bytes(buf, self);
    }

    fn decode(r: &mut ByteReader<'_>) -> Result<Self, GridError> {
        r.bytes()
    }
}

impl<T: Cell> Cell for Option<T> {
    fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            Some(v) => {
                codec::put_u8(buf, 1);
                v.encode(buf);
            }
            None => codec::put_u8(buf, 0),
        }
    }

    fn decode(r: &mut ByteReader<'_>) -> Result<Self, GridError> {
        match r.u8()? {
            0 => Ok(None),
            1 => Ok(Some(T::decode(r)?)),
            flag => Err(GridError::Malformed {
                detail: format!("invalid cell presence flag: {flag}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: Cell + PartialEq + std::fmt::Debug>(v: T) {
        let mut buf = Vec::new();
        v.encode(&mut buf);
        let mut r = ByteReader::new(&buf);
        assert_eq!(T::decode(&mut r).unwrap(), v);
        assert!(r.is_empty());
    }

    #[test]
    fn primitives_roundtrip() {
        roundtrip(-17i32);
        roundtrip(1i64 << 40);
        roundtrip(3.5f32);
        roundtrip(-0.25f64);
    }

    #[test]
    fn optional_cells_roundtrip() {
        roundtrip::<Option<i32>>(None);
        roundtrip(Some(99i32));
        roundtrip(Some(vec![1u8, 2, 3]));
    }

    #[test]
    fn absent_cell_is_one_byte() {
        let mut buf = Vec::new();
        Option::<f64>::None.encode(&mut buf);
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn bad_presence_flag_rejected() {
        let buf = [7u8];
        let mut r = ByteReader::new(&buf);
        assert!(matches!(
            Option::<i32>::decode(&mut r),
            Err(GridError::Malformed { .. })
        ));
    }
}
