//! In-process cluster backend: one OS thread per worker, channel
//! mailboxes, collectives built from tagged point-to-point frames.

use crate::comm::Communicator;
use crate::error::CommError;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// How long a worker waits inside a collective before declaring the
/// cluster out of step.
const STALL_TIMEOUT: Duration = Duration::from_secs(60);

/// One tagged message between two workers.
///
/// `comm` fingerprints the communicator the frame belongs to and `seq`
/// the collective operation within it, so back-to-back collectives on
/// the same communicator cannot interleave even when a peer runs ahead.
struct Frame {
    src: usize,
    comm: u64,
    seq: u64,
    bytes: Vec<u8>,
}

struct Router {
    senders: Vec<Sender<Frame>>,
}

/// A worker's receiving end, shared by every communicator instance the
/// worker holds (the world communicator and any sub-communicators).
struct WorkerPort {
    rank: usize,
    rx: Receiver<Frame>,
    pending: RefCell<Vec<Frame>>,
}

impl WorkerPort {
    /// Receive the frame tagged `(comm, seq)` from `src`, buffering
    /// frames that belong to other operations until their turn.
    fn recv_tagged(&self, src: usize, comm: u64, seq: u64) -> Result<Vec<u8>, CommError> {
        {
            let mut pending = self.pending.borrow_mut();
            if let Some(pos) = pending
                .iter()
                .position(|f| f.src == src && f.comm == comm && f.seq == seq)
            {
                return Ok(pending.remove(pos).bytes);
            }
        }
        let deadline = Instant::now() + STALL_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(f) if f.src == src && f.comm == comm && f.seq == seq => return Ok(f.bytes),
                Ok(f) => self.pending.borrow_mut().push(f),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(CommError::Stalled {
                        rank: src,
                        waited: STALL_TIMEOUT,
                    })
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(CommError::Down { rank: src })
                }
            }
        }
    }
}

/// FNV-1a over the member ranks; identifies a communicator's membership
/// identically on every worker.
fn fingerprint(members: &[usize]) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for &m in members {
        h ^= m as u64;
        h = h.wrapping_mul(0x0000_0100_0000_01b3);
    }
    h ^ members.len() as u64
}

/// Channel-backed [`Communicator`] for one worker of a [`LocalCluster`].
pub struct LocalComm {
    members: Vec<usize>,
    comm_id: u64,
    seq: Cell<u64>,
    router: Arc<Router>,
    port: Rc<WorkerPort>,
}

impl LocalComm {
    fn world(rank: usize, workers: usize, rx: Receiver<Frame>, router: Arc<Router>) -> Self {
        let members: Vec<usize> = (0..workers).collect();
        let comm_id = fingerprint(&members);
        Self {
            members,
            comm_id,
            seq: Cell::new(0),
            router,
            port: Rc::new(WorkerPort {
                rank,
                rx,
                pending: RefCell::new(Vec::new()),
            }),
        }
    }

    fn next_seq(&self) -> u64 {
        let s = self.seq.get();
        self.seq.set(s + 1);
        s
    }

    fn send(&self, dst: usize, seq: u64, bytes: Vec<u8>) -> Result<(), CommError> {
        let frame = Frame {
            src: self.port.rank,
            comm: self.comm_id,
            seq,
            bytes,
        };
        self.router
            .senders
            .get(dst)
            .ok_or(CommError::Protocol {
                detail: format!("rank {dst} outside the cluster"),
            })?
            .send(frame)
            .map_err(|_| CommError::Down { rank: dst })
    }

    fn recv(&self, src: usize, seq: u64) -> Result<Vec<u8>, CommError> {
        self.port.recv_tagged(src, self.comm_id, seq)
    }

    /// Root sends `bytes` to every other member; everyone returns it.
    fn bcast(&self, root: usize, bytes: Vec<u8>) -> Result<Vec<u8>, CommError> {
        let seq = self.next_seq();
        if self.port.rank == root {
            for &m in &self.members {
                if m != root {
                    self.send(m, seq, bytes.clone())?;
                }
            }
            Ok(bytes)
        } else {
            self.recv(root, seq)
        }
    }

    fn check_member(&self, rank: usize, what: &str) -> Result<(), CommError> {
        if self.members.binary_search(&rank).is_err() {
            return Err(CommError::Protocol {
                detail: format!("{what}: rank {rank} is not a member"),
            });
        }
        Ok(())
    }
}

impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        self.port.rank
    }

    fn members(&self) -> &[usize] {
        &self.members
    }

    fn exchange_counts(&self, peers: &[usize], counts: &[u32]) -> Result<Vec<u32>, CommError> {
        if peers.len() != counts.len() {
            return Err(CommError::Protocol {
                detail: format!(
                    "exchange_counts: {} peers but {} counts",
                    peers.len(),
                    counts.len()
                ),
            });
        }
        let seq = self.next_seq();
        for (&p, &c) in peers.iter().zip(counts) {
            self.send(p, seq, c.to_le_bytes().to_vec())?;
        }
        let mut out = Vec::with_capacity(peers.len());
        for &p in peers {
            let bytes = self.recv(p, seq)?;
            let arr: [u8; 4] = bytes.as_slice().try_into().map_err(|_| CommError::Protocol {
                detail: format!("exchange_counts: rank {p} sent {} bytes", bytes.len()),
            })?;
            out.push(u32::from_le_bytes(arr));
        }
        Ok(out)
    }

    fn exchange_bytes(
        &self,
        peers: &[usize],
        payloads: Vec<Vec<u8>>,
        expected: &[u32],
    ) -> Result<Vec<Vec<u8>>, CommError> {
        if peers.len() != payloads.len() || peers.len() != expected.len() {
            return Err(CommError::Protocol {
                detail: "exchange_bytes: peer/payload/count lists differ in length".into(),
            });
        }
        let seq = self.next_seq();
        for (&p, payload) in peers.iter().zip(payloads) {
            self.send(p, seq, payload)?;
        }
        let mut out = Vec::with_capacity(peers.len());
        for (&p, &want) in peers.iter().zip(expected) {
            let bytes = self.recv(p, seq)?;
            if bytes.len() != want as usize {
                return Err(CommError::Protocol {
                    detail: format!(
                        "exchange_bytes: rank {p} announced {want} bytes, delivered {}",
                        bytes.len()
                    ),
                });
            }
            out.push(bytes);
        }
        Ok(out)
    }

    fn gather(&self, root: usize, payload: Vec<u8>) -> Result<Option<Vec<Vec<u8>>>, CommError> {
        self.check_member(root, "gather")?;
        let seq = self.next_seq();
        if self.port.rank == root {
            let mut out = Vec::with_capacity(self.members.len());
            for &m in &self.members {
                if m == root {
                    out.push(payload.clone());
                } else {
                    out.push(self.recv(m, seq)?);
                }
            }
            Ok(Some(out))
        } else {
            self.send(root, seq, payload)?;
            Ok(None)
        }
    }

    fn scatter(&self, root: usize, payloads: Option<Vec<Vec<u8>>>) -> Result<Vec<u8>, CommError> {
        self.check_member(root, "scatter")?;
        let seq = self.next_seq();
        if self.port.rank == root {
            let payloads = payloads.ok_or(CommError::Protocol {
                detail: "scatter: root called without payloads".into(),
            })?;
            if payloads.len() != self.members.len() {
                return Err(CommError::Protocol {
                    detail: format!(
                        "scatter: {} payloads for {} members",
                        payloads.len(),
                        self.members.len()
                    ),
                });
            }
            let mut own = Vec::new();
            for (&m, payload) in self.members.iter().zip(payloads) {
                if m == root {
                    own = payload;
                } else {
                    self.send(m, seq, payload)?;
                }
            }
            Ok(own)
        } else {
            self.recv(root, seq)
        }
    }

    fn all_reduce_min_f64(&self, value: f64) -> Result<f64, CommError> {
        let root = self.members[0];
        let gathered = self.gather(root, value.to_le_bytes().to_vec())?;
        let min_bytes = match gathered {
            Some(all) => {
                let mut min = f64::INFINITY;
                for bytes in &all {
                    let arr: [u8; 8] =
                        bytes.as_slice().try_into().map_err(|_| CommError::Protocol {
                            detail: "all_reduce_min_f64: malformed contribution".into(),
                        })?;
                    let v = f64::from_le_bytes(arr);
                    if v < min {
                        min = v;
                    }
                }
                min.to_le_bytes().to_vec()
            }
            None => Vec::new(),
        };
        let result = self.bcast(root, min_bytes)?;
        let arr: [u8; 8] = result.as_slice().try_into().map_err(|_| CommError::Protocol {
            detail: "all_reduce_min_f64: malformed result".into(),
        })?;
        Ok(f64::from_le_bytes(arr))
    }

    fn barrier(&self) -> Result<(), CommError> {
        let root = self.members[0];
        self.gather(root, Vec::new())?;
        self.bcast(root, Vec::new())?;
        Ok(())
    }

    fn group(&self, members: &[usize]) -> Result<Box<dyn Communicator>, CommError> {
        let mut sorted: Vec<usize> = members.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        if !sorted.contains(&self.port.rank) {
            return Err(CommError::Protocol {
                detail: format!("group: calling rank {} not in member list", self.port.rank),
            });
        }
        for &m in &sorted {
            self.check_member(m, "group")?;
        }
        Ok(Box::new(LocalComm {
            comm_id: fingerprint(&sorted),
            members: sorted,
            seq: Cell::new(0),
            router: self.router.clone(),
            port: self.port.clone(),
        }))
    }
}

/// Spawns one thread per worker and hands each a world [`LocalComm`].
pub struct LocalCluster;

impl LocalCluster {
    /// Run `f` on `workers` threads, one per rank, and collect the
    /// results in rank order. Panics in a worker propagate.
    pub fn run<R, F>(workers: usize, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(LocalComm) -> R + Send + Sync,
    {
        let mut senders = Vec::with_capacity(workers);
        let mut receivers = Vec::with_capacity(workers);
        for _ in 0..workers {
            let (tx, rx) = unbounded();
            senders.push(tx);
            receivers.push(rx);
        }
        let router = Arc::new(Router { senders });

        thread::scope(|scope| {
            let f = &f;
            let handles: Vec<_> = receivers
                .into_iter()
                .enumerate()
                .map(|(rank, rx)| {
                    let router = router.clone();
                    scope.spawn(move || f(LocalComm::world(rank, workers, rx, router)))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| match h.join() {
                    Ok(r) => r,
                    Err(payload) => std::panic::resume_unwind(payload),
                })
                .collect()
        })
    }
}
