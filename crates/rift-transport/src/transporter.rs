//! Per-neighbor buffers, routing, and the exchange step.

use crate::envelope::Envelope;
use crate::error::TransportError;
use rift_comm::Communicator;
use rift_geom::{shifted_copies, HyperRect, Point};
use rift_partition::{CommitClient, CommitError, Partition};
use std::rc::Rc;
use tracing::{debug, trace};

/// Moves envelopes between workers over the neighbor graph.
///
/// One append buffer per direct neighbor plus an inbox. Each
/// [`sync`](Transporter::sync) announces buffer sizes, swaps the raw
/// bytes, and decodes arrivals; records addressed elsewhere are
/// re-enqueued toward their destination and ride the next sync, so a
/// record crosses one edge of the neighbor graph per sync.
pub struct Transporter {
    comm: Rc<dyn Communicator>,
    my_rank: usize,
    world: HyperRect,
    toroidal: bool,
    neighbors: Vec<usize>,
    neighbor_rects: Vec<HyperRect>,
    buffers: Vec<Vec<u8>>,
    inbox: Vec<Envelope>,
}

impl Transporter {
    /// Build a transporter for this worker and load the neighbor table.
    pub fn new(comm: Rc<dyn Communicator>, partition: &Partition) -> Result<Self, TransportError> {
        let mut t = Self {
            my_rank: comm.rank(),
            comm,
            world: partition.world().clone(),
            toroidal: partition.is_toroidal(),
            neighbors: Vec::new(),
            neighbor_rects: Vec::new(),
            buffers: Vec::new(),
            inbox: Vec::new(),
        };
        t.reload(partition)?;
        Ok(t)
    }

    /// Refresh the neighbor table after the partition changed. Clears
    /// buffers and the inbox.
    pub fn reload(&mut self, partition: &Partition) -> Result<(), TransportError> {
        self.world = partition.world().clone();
        self.toroidal = partition.is_toroidal();
        self.neighbors = partition.neighbor_ranks(self.my_rank)?;
        self.neighbor_rects = self
            .neighbors
            .iter()
            .filter_map(|&r| partition.rect_of_rank(r))
            .collect();
        self.buffers = vec![Vec::new(); self.neighbors.len()];
        self.inbox.clear();
        Ok(())
    }

    /// Direct neighbor ranks, ascending.
    pub fn neighbors(&self) -> &[usize] {
        &self.neighbors
    }

    /// Records that have arrived for this worker.
    pub fn inbox(&self) -> &[Envelope] {
        &self.inbox
    }

    /// Number of arrived records.
    pub fn inbox_len(&self) -> usize {
        self.inbox.len()
    }

    /// Take the arrived records, leaving the inbox empty.
    pub fn take_inbox(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.inbox)
    }

    /// Hand an envelope to the transport. Direct-neighbor destinations
    /// ride the next sync; others are forwarded hop by hop through the
    /// neighbor geometrically nearest the envelope's location.
    pub fn migrate(&mut self, envelope: Envelope) -> Result<(), TransportError> {
        if envelope.destination == self.my_rank {
            self.inbox.push(envelope);
            return Ok(());
        }
        let slot = self.choose_slot(&envelope)?;
        envelope.encode(&mut self.buffers[slot]);
        Ok(())
    }

    /// Exchange buffered records with every direct neighbor.
    ///
    /// Arrivals addressed to this worker land in the inbox; the rest are
    /// re-enqueued toward their destination for the next sync.
    pub fn sync(&mut self) -> Result<(), TransportError> {
        let counts: Vec<u32> = self.buffers.iter().map(|b| b.len() as u32).collect();
        let recv_counts = self.comm.exchange_counts(&self.neighbors, &counts)?;
        let payloads: Vec<Vec<u8>> = self.buffers.iter_mut().map(std::mem::take).collect();
        let segments = self
            .comm
            .exchange_bytes(&self.neighbors, payloads, &recv_counts)?;

        let mut forwards = Vec::new();
        for segment in &segments {
            for envelope in Envelope::decode_stream(segment)? {
                if envelope.destination == self.my_rank {
                    self.inbox.push(envelope);
                } else {
                    forwards.push(envelope);
                }
            }
        }
        if !forwards.is_empty() {
            trace!(
                target: "rift::transport",
                rank = self.my_rank,
                count = forwards.len(),
                "forwarding in-transit records"
            );
        }
        for envelope in forwards {
            let slot = self.choose_slot(&envelope)?;
            envelope.encode(&mut self.buffers[slot]);
        }
        Ok(())
    }

    /// Buffer index for an envelope: the destination itself when it is a
    /// direct neighbor, otherwise the neighbor nearest the envelope's
    /// location (ties to the lowest rank).
    fn choose_slot(&self, envelope: &Envelope) -> Result<usize, TransportError> {
        if let Some(i) = self
            .neighbors
            .iter()
            .position(|&n| n == envelope.destination)
        {
            return Ok(i);
        }
        if self.neighbors.is_empty() {
            return Err(TransportError::Unroutable {
                destination: envelope.destination,
            });
        }
        let mut best = 0usize;
        let mut best_dist = i64::MAX;
        for (i, rect) in self.neighbor_rects.iter().enumerate() {
            let d = self.distance_to(rect, &envelope.location);
            if d < best_dist {
                best = i;
                best_dist = d;
            }
        }
        debug!(
            target: "rift::transport",
            rank = self.my_rank,
            destination = envelope.destination,
            via = self.neighbors[best],
            "destination is not a direct neighbor, forwarding"
        );
        Ok(best)
    }

    /// L1 gap between a rectangle and a point, through the wrap when the
    /// world is toroidal.
    fn distance_to(&self, rect: &HyperRect, p: &Point) -> i64 {
        let images: Vec<HyperRect> = if self.toroidal {
            shifted_copies(rect, &self.world)
        } else {
            vec![rect.clone()]
        };
        let mut best = i64::MAX;
        for image in &images {
            let mut d: i64 = 0;
            for dim in 0..image.ndim() {
                let c = p[dim];
                if c < image.ul[dim] {
                    d += (image.ul[dim] - c) as i64;
                } else if c >= image.br[dim] {
                    d += (c - image.br[dim] + 1) as i64;
                }
            }
            best = best.min(d);
        }
        best
    }
}

impl CommitClient for Transporter {
    fn name(&self) -> &'static str {
        "transporter"
    }

    fn before_commit(&mut self, _level: u32, _partition: &Partition) -> Result<(), CommitError> {
        // Flush in-flight records under the old topology so nothing is
        // buffered toward a neighbor that stops being one.
        self.sync().map_err(|e| CommitError {
            client: "transporter",
            detail: e.to_string(),
        })
    }

    fn after_commit(&mut self, _level: u32, partition: &Partition) -> Result<(), CommitError> {
        self.reload(partition).map_err(|e| CommitError {
            client: "transporter",
            detail: e.to_string(),
        })?;
        self.sync().map_err(|e| CommitError {
            client: "transporter",
            detail: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Payload;
    use rift_comm::LocalCluster;
    use rift_partition::Mutation;

    fn world_100() -> HyperRect {
        HyperRect::new(-1, Point::from([0, 0]), Point::from([100, 100]))
    }

    fn envelope_to(destination: usize, location: [i32; 2], marker: u8) -> Envelope {
        Envelope {
            destination,
            field: None,
            location: Point::from(location),
            payload: Payload::Object(vec![marker]),
        }
    }

    #[test]
    fn direct_neighbor_migration_arrives_in_one_sync() {
        let results = LocalCluster::run(4, |comm| {
            let mut p = Partition::new(
                HyperRect::new(-1, Point::from([0, 0]), Point::from([40, 40])),
                4,
                comm.rank(),
                true,
                &[1, 1],
            )
            .unwrap();
            p.init_uniform().unwrap();
            let comm: Rc<dyn Communicator> = Rc::new(comm);
            let mut t = Transporter::new(comm, &p).unwrap();

            if t.my_rank == 0 {
                t.migrate(envelope_to(3, [30, 30], 7)).unwrap();
            }
            t.sync().unwrap();
            t.take_inbox()
        });
        assert!(results[0].is_empty());
        assert!(results[1].is_empty());
        assert!(results[2].is_empty());
        assert_eq!(results[3].len(), 1);
        assert_eq!(results[3][0].payload, Payload::Object(vec![7]));
    }

    #[test]
    fn non_neighbor_migration_is_forwarded_until_delivered() {
        let results = LocalCluster::run(7, |comm| {
            let mut p =
                Partition::new(world_100(), 7, comm.rank(), false, &[1, 1]).unwrap();
            p.apply(Mutation::Split(Point::from([40, 60]))).unwrap();
            p.apply(Mutation::Split(Point::from([10, 80]))).unwrap();

            // Pick a pair of ranks whose leaves are not adjacent.
            let src = p.owner_of(&Point::from([80, 20])).unwrap();
            let dst = p.owner_of(&Point::from([5, 95])).unwrap();
            assert!(!p.neighbor_ranks(src).unwrap().contains(&dst));

            let comm: Rc<dyn Communicator> = Rc::new(comm);
            let mut t = Transporter::new(comm, &p).unwrap();
            if t.my_rank == src {
                t.migrate(envelope_to(dst, [5, 95], 42)).unwrap();
            }
            let mut arrived = Vec::new();
            for _ in 0..6 {
                t.sync().unwrap();
                arrived.extend(t.take_inbox());
            }
            (t.my_rank == dst, arrived)
        });

        let mut total = 0;
        for (is_dst, arrived) in &results {
            if *is_dst {
                assert_eq!(arrived.len(), 1, "destination must receive exactly once");
                assert_eq!(arrived[0].payload, Payload::Object(vec![42]));
            } else {
                assert!(arrived.is_empty(), "only the destination may receive");
            }
            total += arrived.len();
        }
        assert_eq!(total, 1);
    }

    #[test]
    fn migration_conservation_under_load() {
        // Every worker sends one envelope to every other worker; after
        // enough syncs the multiset of arrivals equals the multiset sent.
        let results = LocalCluster::run(4, |comm| {
            let mut p = Partition::new(
                HyperRect::new(-1, Point::from([0, 0]), Point::from([40, 40])),
                4,
                comm.rank(),
                true,
                &[1, 1],
            )
            .unwrap();
            p.init_uniform().unwrap();
            let me = comm.rank();
            let comm: Rc<dyn Communicator> = Rc::new(comm);
            let mut t = Transporter::new(comm, &p).unwrap();

            for dst in 0..4 {
                if dst != me {
                    let rect = p.rect_of_rank(dst).unwrap();
                    t.migrate(envelope_to(
                        dst,
                        [rect.ul[0], rect.ul[1]],
                        (me * 4 + dst) as u8,
                    ))
                    .unwrap();
                }
            }
            let mut arrived = Vec::new();
            for _ in 0..4 {
                t.sync().unwrap();
                arrived.extend(t.take_inbox());
            }
            arrived
        });

        let mut markers: Vec<u8> = results
            .iter()
            .flatten()
            .map(|env| match &env.payload {
                Payload::Object(b) => b[0],
                _ => unreachable!(),
            })
            .collect();
        markers.sort_unstable();
        let mut expected: Vec<u8> = (0..4u8)
            .flat_map(|s| (0..4u8).filter(move |&d| d != s).map(move |d| s * 4 + d))
            .collect();
        expected.sort_unstable();
        assert_eq!(markers, expected);
        // Each arrival landed at its addressed destination.
        for (rank, arrived) in results.iter().enumerate() {
            assert!(arrived.iter().all(|env| env.destination == rank));
        }
    }

    #[test]
    fn unroutable_without_neighbors() {
        let results = LocalCluster::run(1, |comm| {
            let p = Partition::new(world_100(), 1, comm.rank(), false, &[1, 1]).unwrap();
            let comm: Rc<dyn Communicator> = Rc::new(comm);
            let mut t = Transporter::new(comm, &p).unwrap();
            matches!(
                t.migrate(envelope_to(5, [10, 10], 0)),
                Err(TransportError::Unroutable { destination: 5 })
            )
        });
        assert!(results[0]);
    }
}
