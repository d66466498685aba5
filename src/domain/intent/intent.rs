//! Pending intent - a deferred user action captured before authentication.
//!
//! Users express an action ("join event 482913", "finish buying these
//! tickets") before they are signed in. The action is parked while the
//! authentication redirect happens and replayed once the identity resolves.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::EventCode;
use crate::domain::foundation::Timestamp;

/// Which storage location produced a pending intent.
///
/// Ordered by read precedence; the reconciliation logic in the intent store
/// consults them in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentSource {
    /// Short-lived scope, cleared when the browsing context closes.
    ShortLived,
    /// Durable scope, survives context closes.
    Durable,
    /// Provider-specific companion payload carrying its own timestamp.
    CompanionPayload,
    /// The current page's own query parameters.
    Query,
}

impl IntentSource {
    /// Returns a label for log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentSource::ShortLived => "short-lived",
            IntentSource::Durable => "durable",
            IntentSource::CompanionPayload => "companion-payload",
            IntentSource::Query => "query",
        }
    }
}

impl fmt::Display for IntentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The deferred action itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentAction {
    /// Join the event identified by a 6-digit code.
    JoinEvent { code: EventCode },
    /// Resume an interrupted ticket purchase at the given absolute path.
    ResumePurchase { path: String },
}

/// A pending intent together with where and when it was captured.
///
/// At most one intent is active at a time; the intent store's precedence
/// rules pick the winner when multiple scopes hold values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingIntent {
    pub action: IntentAction,
    pub captured_at: Timestamp,
    pub source: IntentSource,
}

impl PendingIntent {
    /// Returns true if the intent was captured longer than `ttl` ago.
    pub fn is_stale(&self, now: &Timestamp, ttl: Duration) -> bool {
        now.duration_since(&self.captured_at) > ttl
    }
}

/// Companion payload persisted alongside the plain event-code slots.
///
/// Carries its own capture timestamp (Unix milliseconds) so staleness can be
/// judged even when the plain scopes were dropped by a federated redirect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventCodePayload {
    pub code: String,
    pub timestamp: i64,
}

impl EventCodePayload {
    /// Creates a payload capturing the code at the given moment.
    pub fn new(code: &EventCode, captured_at: &Timestamp) -> Self {
        Self {
            code: code.as_str().to_string(),
            timestamp: captured_at.as_unix_millis(),
        }
    }

    /// Returns the capture timestamp.
    pub fn captured_at(&self) -> Timestamp {
        Timestamp::from_unix_millis(self.timestamp)
    }

    /// Returns true if the payload was captured longer than `ttl` ago.
    pub fn is_stale(&self, now: &Timestamp, ttl: Duration) -> bool {
        now.duration_since(&self.captured_at()) > ttl
    }
}
