//! The collective-transport trait.

use crate::error::CommError;

/// Synchronous collectives over a fixed set of worker ranks.
///
/// Each instance spans a set of `members` (world ranks, ascending); the
/// world communicator spans every worker. All members of a communicator
/// must call the same operations in the same order — every operation is a
/// synchronization point across the participants, and a worker that
/// deviates shows up on its peers as [`CommError::Stalled`].
///
/// Pairwise neighbor exchanges take a `peers` list; peer lists must be
/// symmetric (if rank `a` lists `b`, then `b` lists `a`), which the
/// partition manager guarantees for halo neighbor sets.
pub trait Communicator {
    /// This worker's world rank.
    fn rank(&self) -> usize;

    /// The world ranks spanned by this communicator, ascending.
    fn members(&self) -> &[usize];

    /// Number of members.
    fn size(&self) -> usize {
        self.members().len()
    }

    /// Send one `u32` to each peer and receive one from each, in peer
    /// list order. Used to announce byte counts ahead of a payload
    /// exchange.
    fn exchange_counts(&self, peers: &[usize], counts: &[u32]) -> Result<Vec<u32>, CommError>;

    /// Send `payloads[i]` to `peers[i]` and receive each peer's payload,
    /// in peer list order. `expected[i]` is the byte count peer `i`
    /// announced; a mismatched delivery is a protocol violation.
    fn exchange_bytes(
        &self,
        peers: &[usize],
        payloads: Vec<Vec<u8>>,
        expected: &[u32],
    ) -> Result<Vec<Vec<u8>>, CommError>;

    /// Collect every member's payload at `root` (a member's world rank).
    /// Returns `Some(payloads)` in member order at the root, `None`
    /// elsewhere.
    fn gather(&self, root: usize, payload: Vec<u8>) -> Result<Option<Vec<Vec<u8>>>, CommError>;

    /// Distribute one payload per member from `root`. The root passes
    /// `Some(payloads)` in member order, everyone else `None`; each
    /// member receives its own slice.
    fn scatter(&self, root: usize, payloads: Option<Vec<Vec<u8>>>) -> Result<Vec<u8>, CommError>;

    /// The minimum of every member's value.
    fn all_reduce_min_f64(&self, value: f64) -> Result<f64, CommError>;

    /// Block until every member arrives.
    fn barrier(&self) -> Result<(), CommError>;

    /// A sub-communicator over a subset of this one's members. The
    /// calling rank must be in `members`, and every listed member must
    /// make the same call.
    fn group(&self, members: &[usize]) -> Result<Box<dyn Communicator>, CommError>;
}
