//! Clock port - time observation and suspension.
//!
//! The bounded polling loop needs both "what time is it" and "wait this
//! long". Putting them behind one port lets tests drive the loop with a
//! manual clock instead of real sleeps.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::foundation::Timestamp;

/// Port for time.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Returns the current moment.
    fn now(&self) -> Timestamp;

    /// Suspends the calling task for `duration`.
    async fn sleep(&self, duration: Duration);
}
