//! Clock adapters - real time and manual time.

use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::foundation::Timestamp;
use crate::ports::Clock;

/// Real clock backed by the tokio timer.
#[derive(Debug, Default, Clone)]
pub struct TokioClock;

impl TokioClock {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Manually driven clock for deterministic tests.
///
/// `sleep` advances the internal time instantly and yields once so other
/// tasks scheduled on the runtime get to run, which is what a real
/// suspension would allow.
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<Timestamp>,
    sleeps: AtomicUsize,
}

impl ManualClock {
    /// Creates a clock starting at the given moment.
    pub fn starting_at(now: Timestamp) -> Self {
        Self {
            now: RwLock::new(now),
            sleeps: AtomicUsize::new(0),
        }
    }

    /// Moves time forward without sleeping.
    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.write().unwrap();
        *now = now.plus(duration);
    }

    /// Number of `sleep` calls observed.
    pub fn sleep_count(&self) -> usize {
        self.sleeps.load(Ordering::SeqCst)
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::starting_at(Timestamp::from_unix_millis(1_700_000_000_000))
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.read().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}
