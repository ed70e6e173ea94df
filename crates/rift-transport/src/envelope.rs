//! The envelope wire format.
//!
//! A transported record is self-delimiting: a receiver decodes records
//! from a segment until the bytes run out. Integers and floats are
//! little-endian, so `destination`, `field`, and `location` survive the
//! trip bit-identically regardless of who packed them.

use rift_geom::Point;
use rift_grid::codec::{self, ByteReader};
use rift_grid::GridError;
use std::fmt;

/// Index of a registered field, stable for the life of the run.
///
/// Fields register in the same order on every worker, so an index names
/// the same field everywhere.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldIndex(pub u32);

impl fmt::Display for FieldIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

const TAG_OBJECT: u8 = 0;
const TAG_AGENT: u8 = 1;
const TAG_REPEAT: u8 = 2;

/// Wire sentinel for "insert into no field".
const NO_FIELD: i32 = -1;

/// What an envelope carries.
///
/// Payload bodies are opaque byte strings; when the receiver inserts one
/// into a field, the bytes must be the field's cell encoding.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// A bare value to drop into a field at the envelope's location.
    Object(Vec<u8>),
    /// An agent to schedule once and add to a field. A negative `time`
    /// requests "the next step"; a non-negative one an absolute time.
    Agent {
        /// Serialized agent.
        agent: Vec<u8>,
        /// Scheduler ordering within a timestep.
        ordering: i32,
        /// Absolute schedule time, or any negative value for next step.
        time: f64,
    },
    /// A recurring work item to schedule repeating and add to a field.
    Repeat {
        /// Serialized step closure.
        step: Vec<u8>,
        /// Scheduler ordering within a timestep.
        ordering: i32,
        /// First firing time.
        time: f64,
        /// Repeat interval.
        interval: f64,
    },
}

/// A record migrating between workers.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    /// Rank that must finally receive this record.
    pub destination: usize,
    /// Field to insert the payload into on arrival; `None` suppresses
    /// the insert.
    pub field: Option<FieldIndex>,
    /// World location the payload belongs at.
    pub location: Point,
    /// The cargo.
    pub payload: Payload,
}

impl Envelope {
    /// Append this record's wire form to `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        codec::put_u32(buf, self.destination as u32);
        codec::put_i32(
            buf,
            match self.field {
                Some(FieldIndex(i)) => i as i32,
                None => NO_FIELD,
            },
        );
        codec::put_u8(buf, self.location.ndim() as u8);
        for &c in self.location.as_slice() {
            codec::put_i32(buf, c);
        }
        match &self.payload {
            Payload::Object(bytes) => {
                codec::put_u8(buf, TAG_OBJECT);
                codec::put_bytes(buf, bytes);
            }
            Payload::Agent {
                agent,
                ordering,
                time,
            } => {
                codec::put_u8(buf, TAG_AGENT);
                codec::put_bytes(buf, agent);
                codec::put_i32(buf, *ordering);
                codec::put_f64(buf, *time);
            }
            Payload::Repeat {
                step,
                ordering,
                time,
                interval,
            } => {
                codec::put_u8(buf, TAG_REPEAT);
                codec::put_bytes(buf, step);
                codec::put_i32(buf, *ordering);
                codec::put_f64(buf, *time);
                codec::put_f64(buf, *interval);
            }
        }
    }

    /// Decode one record.
    pub fn decode(r: &mut ByteReader<'_>) -> Result<Self, GridError> {
        let destination = r.u32()? as usize;
        let field = match r.i32()? {
            NO_FIELD => None,
            i if i >= 0 => Some(FieldIndex(i as u32)),
            i => {
                return Err(GridError::Malformed {
                    detail: format!("invalid field index {i}"),
                })
            }
        };
        let ndim = r.u8()? as usize;
        let mut coords = Vec::with_capacity(ndim);
        for _ in 0..ndim {
            coords.push(r.i32()?);
        }
        let location = Point::new(&coords);
        let payload = match r.u8()? {
            TAG_OBJECT => Payload::Object(r.bytes()?),
            TAG_AGENT => Payload::Agent {
                agent: r.bytes()?,
                ordering: r.i32()?,
                time: r.f64()?,
            },
            TAG_REPEAT => Payload::Repeat {
                step: r.bytes()?,
                ordering: r.i32()?,
                time: r.f64()?,
                interval: r.f64()?,
            },
            tag => {
                return Err(GridError::Malformed {
                    detail: format!("unknown payload tag {tag}"),
                })
            }
        };
        Ok(Self {
            destination,
            field,
            location,
            payload,
        })
    }

    /// Decode every record in a received segment.
    pub fn decode_stream(segment: &[u8]) -> Result<Vec<Self>, GridError> {
        let mut r = ByteReader::new(segment);
        let mut out = Vec::new();
        while !r.is_empty() {
            out.push(Self::decode(&mut r)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_payload() -> impl Strategy<Value = Payload> {
        prop_oneof![
            prop::collection::vec(any::<u8>(), 0..32).prop_map(Payload::Object),
            (
                prop::collection::vec(any::<u8>(), 0..32),
                any::<i32>(),
                prop_oneof![Just(-1.0f64), 0.0f64..1e6],
            )
                .prop_map(|(agent, ordering, time)| Payload::Agent {
                    agent,
                    ordering,
                    time,
                }),
            (
                prop::collection::vec(any::<u8>(), 0..32),
                any::<i32>(),
                0.0f64..1e6,
                0.5f64..100.0,
            )
                .prop_map(|(step, ordering, time, interval)| Payload::Repeat {
                    step,
                    ordering,
                    time,
                    interval,
                }),
        ]
    }

    fn arb_envelope() -> impl Strategy<Value = Envelope> {
        (
            0usize..64,
            prop_oneof![Just(None), (0u32..16).prop_map(|i| Some(FieldIndex(i)))],
            prop::collection::vec(-1000i32..1000, 1..4),
            arb_payload(),
        )
            .prop_map(|(destination, field, coords, payload)| Envelope {
                destination,
                field,
                location: Point::new(&coords),
                payload,
            })
    }

    proptest! {
        #[test]
        fn envelope_roundtrips(env in arb_envelope()) {
            let mut buf = Vec::new();
            env.encode(&mut buf);
            let mut r = ByteReader::new(&buf);
            prop_assert_eq!(Envelope::decode(&mut r).unwrap(), env);
            prop_assert!(r.is_empty());
        }

        #[test]
        fn streams_decode_record_by_record(
            envs in prop::collection::vec(arb_envelope(), 0..8),
        ) {
            let mut buf = Vec::new();
            for env in &envs {
                env.encode(&mut buf);
            }
            prop_assert_eq!(Envelope::decode_stream(&buf).unwrap(), envs);
        }
    }

    #[test]
    fn none_field_uses_the_negative_sentinel() {
        let env = Envelope {
            destination: 3,
            field: None,
            location: Point::from([1, 2]),
            payload: Payload::Object(vec![9]),
        };
        let mut buf = Vec::new();
        env.encode(&mut buf);
        // Bytes 4..8 are the little-endian field index.
        assert_eq!(&buf[4..8], (-1i32).to_le_bytes().as_slice());
    }

    #[test]
    fn truncated_record_is_rejected() {
        let env = Envelope {
            destination: 0,
            field: Some(FieldIndex(2)),
            location: Point::from([5, 5]),
            payload: Payload::Agent {
                agent: vec![1, 2, 3],
                ordering: 0,
                time: -1.0,
            },
        };
        let mut buf = Vec::new();
        env.encode(&mut buf);
        buf.truncate(buf.len() - 3);
        assert!(matches!(
            Envelope::decode_stream(&buf),
            Err(GridError::Truncated { .. })
        ));
    }
}
