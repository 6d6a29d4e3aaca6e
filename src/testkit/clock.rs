//! Manually advanced clock.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::clock::Clock;

struct Sleeper {
    deadline: Duration,
    wake: oneshot::Sender<()>,
}

struct ClockState {
    now: Duration,
    sleepers: Vec<Sleeper>,
}

/// A [`Clock`] whose time only moves when a test calls
/// [`advance`](ManualClock::advance). Sleeps park until the clock
/// reaches their deadline.
pub struct ManualClock {
    state: Mutex<ClockState>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ClockState {
                now: Duration::ZERO,
                sleepers: Vec::new(),
            }),
        }
    }

    /// Move time forward, waking every sleeper whose deadline has passed.
    pub fn advance(&self, by: Duration) {
        let woken: Vec<Sleeper> = {
            let mut state = self.state.lock();
            state.now += by;
            let now = state.now;
            let (due, pending) = state
                .sleepers
                .drain(..)
                .partition(|sleeper| sleeper.deadline <= now);
            state.sleepers = pending;
            due
        };
        for sleeper in woken {
            let _ = sleeper.wake.send(());
        }
    }

    /// Time elapsed on this clock.
    pub fn now(&self) -> Duration {
        self.state.lock().now
    }

    /// Number of tasks currently parked in [`Clock::sleep`].
    pub fn sleeper_count(&self) -> usize {
        self.state.lock().sleepers.len()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    async fn sleep(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        let receiver = {
            let mut state = self.state.lock();
            let (wake, receiver) = oneshot::channel();
            let deadline = state.now + duration;
            state.sleepers.push(Sleeper { deadline, wake });
            receiver
        };
        let _ = receiver.await;
    }
}
