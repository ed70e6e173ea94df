//! Per-worker runtime context.

use crate::timing::TickTimer;

/// State every component of a worker shares but none owns globally:
/// the worker's identity for diagnostics and the rebalance-runtime
/// timer. Handed in explicitly at construction instead of living in
/// process-wide singletons.
#[derive(Debug)]
pub struct RuntimeContext {
    /// This worker's rank.
    pub rank: usize,
    /// Rolling tick-cost timer consulted by load balancing.
    pub timer: TickTimer,
}

impl RuntimeContext {
    /// A context for `rank` with a timer over `window` ticks.
    pub fn new(rank: usize, window: usize) -> Self {
        Self {
            rank,
            timer: TickTimer::new(window),
        }
    }
}
