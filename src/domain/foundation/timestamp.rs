//! Timestamp value object for immutable points in time.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Immutable point in time, always UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a timestamp for the current moment.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a timestamp from a DateTime<Utc>.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the inner DateTime.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Creates a timestamp from Unix milliseconds.
    ///
    /// Out-of-range values clamp to the Unix epoch.
    pub fn from_unix_millis(millis: i64) -> Self {
        let dt = Utc
            .timestamp_millis_opt(millis)
            .single()
            .unwrap_or(DateTime::UNIX_EPOCH);
        Self(dt)
    }

    /// Returns the timestamp as Unix milliseconds.
    pub fn as_unix_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// Checks if this timestamp is before another.
    pub fn is_before(&self, other: &Timestamp) -> bool {
        self.0 < other.0
    }

    /// Checks if this timestamp is after another.
    pub fn is_after(&self, other: &Timestamp) -> bool {
        self.0 > other.0
    }

    /// Returns the elapsed time from `earlier` to this timestamp.
    ///
    /// Saturates to zero if `earlier` is actually later.
    pub fn duration_since(&self, earlier: &Timestamp) -> Duration {
        self.0
            .signed_duration_since(earlier.0)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Creates a new timestamp advanced by the given duration.
    pub fn plus(&self, duration: Duration) -> Self {
        Self(self.0 + chrono::Duration::milliseconds(duration.as_millis() as i64))
    }

    /// Creates a new timestamp moved back by the given duration.
    pub fn minus(&self, duration: Duration) -> Self {
        Self(self.0 - chrono::Duration::milliseconds(duration.as_millis() as i64))
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_now_creates_current_time() {
        let before = Utc::now();
        let ts = Timestamp::now();
        let after = Utc::now();

        assert!(ts.as_datetime() >= &before);
        assert!(ts.as_datetime() <= &after);
    }

    #[test]
    fn timestamp_unix_millis_roundtrips() {
        let millis = 1_705_276_800_000_i64;
        let ts = Timestamp::from_unix_millis(millis);
        assert_eq!(ts.as_unix_millis(), millis);
    }

    #[test]
    fn timestamp_ordering_works() {
        let ts1 = Timestamp::from_unix_millis(1_000);
        let ts2 = Timestamp::from_unix_millis(2_000);

        assert!(ts1.is_before(&ts2));
        assert!(ts2.is_after(&ts1));
        assert!(ts1 < ts2);
    }

    #[test]
    fn duration_since_returns_elapsed_time() {
        let earlier = Timestamp::from_unix_millis(10_000);
        let later = Timestamp::from_unix_millis(12_500);

        assert_eq!(later.duration_since(&earlier), Duration::from_millis(2_500));
    }

    #[test]
    fn duration_since_saturates_when_reversed() {
        let earlier = Timestamp::from_unix_millis(10_000);
        let later = Timestamp::from_unix_millis(12_500);

        assert_eq!(earlier.duration_since(&later), Duration::ZERO);
    }

    #[test]
    fn plus_and_minus_shift_the_timestamp() {
        let ts = Timestamp::from_unix_millis(60_000);

        assert_eq!(
            ts.plus(Duration::from_secs(30)).as_unix_millis(),
            90_000
        );
        assert_eq!(
            ts.minus(Duration::from_secs(60)).as_unix_millis(),
            0
        );
    }

    #[test]
    fn timestamp_serializes_to_rfc3339() {
        let ts = Timestamp::from_unix_millis(1_705_276_800_000);
        let json = serde_json::to_string(&ts).unwrap();
        assert!(json.contains("2024-01-15"));
    }
}
