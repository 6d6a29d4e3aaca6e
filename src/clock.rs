//! Injectable clock for delay-sensitive components.
//!
//! The runner's restart delay and the tailer's poll interval both sleep
//! through a [`Clock`] so tests can drive time with
//! [`ManualClock`](crate::testkit::clock::ManualClock) instead of waiting
//! on the wall clock.

use std::time::Duration;

use async_trait::async_trait;

/// A source of delay.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Sleep for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// The process clock, backed by the tokio timer.
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
