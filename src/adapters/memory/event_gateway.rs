//! In-memory event gateway for tests and development.

use std::collections::HashSet;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::domain::foundation::UserId;
use crate::domain::intent::EventCode;
use crate::ports::{EventGateway, EventGatewayError};

/// In-memory event gateway.
///
/// Knows a set of valid codes and records who joined what.
#[derive(Debug, Default)]
pub struct InMemoryEventGateway {
    codes: RwLock<HashSet<String>>,
    joins: RwLock<Vec<(UserId, EventCode)>>,
    force_error: RwLock<Option<EventGatewayError>>,
}

impl InMemoryEventGateway {
    /// Creates a gateway with no events.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a joinable event code.
    pub fn with_event(self, code: &EventCode) -> Self {
        self.codes.write().unwrap().insert(code.as_str().to_string());
        self
    }

    /// Forces all joins to return the specified error.
    pub fn with_error(self, error: EventGatewayError) -> Self {
        *self.force_error.write().unwrap() = Some(error);
        self
    }

    /// Joins recorded so far.
    pub fn joins(&self) -> Vec<(UserId, EventCode)> {
        self.joins.read().unwrap().clone()
    }
}

#[async_trait]
impl EventGateway for InMemoryEventGateway {
    async fn join_by_code(
        &self,
        user_id: &UserId,
        code: &EventCode,
    ) -> Result<(), EventGatewayError> {
        if let Some(error) = self.force_error.read().unwrap().clone() {
            return Err(error);
        }

        if !self.codes.read().unwrap().contains(code.as_str()) {
            return Err(EventGatewayError::UnknownCode(code.clone()));
        }

        self.joins
            .write()
            .unwrap()
            .push((user_id.clone(), code.clone()));
        Ok(())
    }
}
