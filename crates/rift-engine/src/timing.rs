//! Rolling-window tick-cost measurement.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Measures the wall-clock cost of the application step over a rolling
/// window of ticks.
///
/// The coordination loop stops the timer when synchronization begins and
/// restarts it when control returns to the application, so the samples
/// cover exactly the local compute a rebalance would redistribute.
#[derive(Debug)]
pub struct TickTimer {
    window: usize,
    samples: VecDeque<Duration>,
    started: Option<Instant>,
}

impl TickTimer {
    /// A timer averaging over the last `window` ticks.
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            samples: VecDeque::with_capacity(window.max(1)),
            started: None,
        }
    }

    /// Begin timing a tick. Restarting without a stop discards the open
    /// interval.
    pub fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    /// End the open interval and record it. A stop without a start is a
    /// no-op (the first tick's synchronization phase has nothing to
    /// measure).
    pub fn stop(&mut self) {
        if let Some(started) = self.started.take() {
            if self.samples.len() == self.window {
                self.samples.pop_front();
            }
            self.samples.push_back(started.elapsed());
        }
    }

    /// Mean cost over the recorded window, or `None` before the first
    /// complete tick.
    pub fn mean(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        let total: Duration = self.samples.iter().sum();
        Some(total / self.samples.len() as u32)
    }

    /// Number of recorded samples (at most the window).
    pub fn samples(&self) -> usize {
        self.samples.len()
    }

    /// The configured window width.
    pub fn window(&self) -> usize {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_without_start_records_nothing() {
        let mut t = TickTimer::new(4);
        t.stop();
        assert_eq!(t.samples(), 0);
        assert!(t.mean().is_none());
    }

    #[test]
    fn window_caps_the_sample_count() {
        let mut t = TickTimer::new(3);
        for _ in 0..10 {
            t.start();
            t.stop();
        }
        assert_eq!(t.samples(), 3);
        assert!(t.mean().is_some());
    }

    #[test]
    fn zero_window_is_clamped_to_one() {
        let t = TickTimer::new(0);
        assert_eq!(t.window(), 1);
    }
}
