//! Event gateway port - the handler a join intent is replayed against.
//!
//! Whether a code maps to a real, open event is this collaborator's
//! judgement; the redirect router only replays the deferred action and
//! reports the outcome.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::foundation::UserId;
use crate::domain::intent::EventCode;

/// Errors from the event service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EventGatewayError {
    /// No event exists for the code.
    #[error("No event found for code {0}")]
    UnknownCode(EventCode),

    /// The event exists but is not accepting attendees.
    #[error("Event is not accepting new attendees")]
    Closed,

    /// The event service is unreachable.
    #[error("Event service unavailable: {0}")]
    Unavailable(String),
}

/// Port for joining events by code.
#[async_trait]
pub trait EventGateway: Send + Sync {
    /// Registers the user as an attendee of the event behind `code`.
    async fn join_by_code(&self, user_id: &UserId, code: &EventCode)
        -> Result<(), EventGatewayError>;
}
