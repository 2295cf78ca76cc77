//! Wait strategies for spin loops.
//!
//! Both ends of the pipeline loop on a non-blocking operation: producers retry
//! `try_publish` while the channel is full, consumers retry `try_poll` while
//! it is empty. A [`WaitStrategy`] decides what happens between two attempts.
//! It never changes the result of an attempt, so the consumer's "nothing
//! available right now" signal stays immediate.

use std::time::Duration;

use crossbeam_utils::Backoff;
use serde::{Deserialize, Serialize};

/// What a spinning thread does between two failed attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WaitStrategy {
    /// True busy-spinning: only a CPU spin hint. Lowest wake-up latency,
    /// burns a whole core.
    #[default]
    BusySpin,
    /// Exponential spin backoff, then yield the time slice to the OS.
    Yield,
    /// Spin for `spin_iters` attempts, then park for `park_us` microseconds
    /// per retry.
    SpinThenPark { spin_iters: u32, park_us: u64 },
}

/// Per-loop waiting state for a [`WaitStrategy`].
///
/// Create one per wait loop (or [`reset`](Waiter::reset) it after a
/// successful attempt) so the escalation starts over.
#[derive(Debug)]
pub struct Waiter {
    strategy: WaitStrategy,
    backoff: Backoff,
    spins: u32,
}

impl Waiter {
    pub fn new(strategy: WaitStrategy) -> Self {
        Self { strategy, backoff: Backoff::new(), spins: 0 }
    }

    /// Wait once, escalating according to the strategy.
    #[inline]
    pub fn wait(&mut self) {
        match self.strategy {
            WaitStrategy::BusySpin => std::hint::spin_loop(),
            WaitStrategy::Yield => self.backoff.snooze(),
            WaitStrategy::SpinThenPark { spin_iters, park_us } => {
                if self.spins < spin_iters {
                    self.spins += 1;
                    std::hint::spin_loop();
                } else {
                    std::thread::park_timeout(Duration::from_micros(park_us));
                }
            }
        }
    }

    /// Start the escalation over (call after a successful attempt).
    #[inline]
    pub fn reset(&mut self) {
        self.backoff.reset();
        self.spins = 0;
    }

    pub fn strategy(&self) -> WaitStrategy {
        self.strategy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_busy_spin() {
        assert_eq!(WaitStrategy::default(), WaitStrategy::BusySpin);
    }

    #[test]
    fn park_escalates_after_spins() {
        let mut w = Waiter::new(WaitStrategy::SpinThenPark { spin_iters: 3, park_us: 100 });
        for _ in 0..3 {
            w.wait();
        }
        assert_eq!(w.spins, 3);
        // Further waits park instead of counting more spins.
        w.wait();
        assert_eq!(w.spins, 3);
    }

    #[test]
    fn reset_restarts_spinning() {
        let mut w = Waiter::new(WaitStrategy::SpinThenPark { spin_iters: 1, park_us: 10 });
        w.wait();
        assert_eq!(w.spins, 1);
        w.reset();
        assert_eq!(w.spins, 0);
    }

    #[test]
    fn deserializes_from_json() {
        let s: WaitStrategy = serde_json::from_str(r#"{"kind":"yield"}"#).unwrap();
        assert_eq!(s, WaitStrategy::Yield);
        let s: WaitStrategy =
            serde_json::from_str(r#"{"kind":"spin_then_park","spin_iters":100,"park_us":50}"#).unwrap();
        assert_eq!(s, WaitStrategy::SpinThenPark { spin_iters: 100, park_us: 50 });
    }
}
