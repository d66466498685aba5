//! Pending Intent Store - the write-once-read-once intent ledger.
//!
//! One logical value, four physical locations. An intent is written
//! redundantly because OAuth providers navigate through intermediate
//! browsing contexts that drop the short-lived scope, and some federated
//! redirects preserve only the query string. The read side reconciles the
//! redundancy in one place: a ranked list of sources consulted in fixed
//! order, first fresh hit wins, everything erased afterwards.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::domain::foundation::{Timestamp, UserRole};
use crate::domain::intent::{
    EventCode, EventCodePayload, IntentAction, IntentSource, PendingIntent,
};
use crate::ports::{Clock, ScopedStorage, StorageError, StorageScope};

/// Storage keys, namespaced so the shared scopes never collide with
/// unrelated features.
pub mod keys {
    /// Plain event code, written to both scopes.
    pub const EVENT_CODE: &str = "pending.eventCode";
    /// Role chosen before a registration or OAuth redirect (durable only).
    pub const ROLE: &str = "pending.role";
    /// JSON `{ code, timestamp }` companion payload (durable only).
    pub const EVENT_PAYLOAD: &str = "pending.eventPayload";
    /// Absolute path of an interrupted ticket purchase (durable only).
    pub const RESUME_PURCHASE_PATH: &str = "pending.resumePurchasePath";

    /// Prefix covering every key this subsystem owns.
    pub const PREFIX: &str = "pending.";
}

/// Query parameters mirrored back by the OAuth redirect.
///
/// The last-resort read source: when every storage scope was dropped along
/// the redirect chain, the outbound request's mirrored parameters are all
/// that survives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedirectQuery {
    pub role: Option<UserRole>,
    pub event_code: Option<EventCode>,
}

impl RedirectQuery {
    /// An empty query (non-redirect entry points).
    pub fn none() -> Self {
        Self::default()
    }

    /// Parses the `role` / `eventCode` pairs from a query string's pairs.
    ///
    /// Unparseable values are dropped rather than rejected - a mangled
    /// query parameter must never block sign-in.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut query = Self::default();
        for (key, value) in pairs {
            match key {
                "role" => query.role = value.parse().ok(),
                "eventCode" => query.event_code = EventCode::new(value).ok(),
                _ => {}
            }
        }
        query
    }
}

/// The pending-intent ledger over the two storage scopes.
///
/// All reads and writes go through here; the precedence order lives in
/// [`take`](PendingIntentStore::take) and nowhere else.
pub struct PendingIntentStore {
    storage: Arc<dyn ScopedStorage>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl PendingIntentStore {
    /// Creates a store over the given scopes with the given staleness window.
    pub fn new(storage: Arc<dyn ScopedStorage>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self { storage, clock, ttl }
    }

    /// Stashes a join intent across every location that might survive the
    /// upcoming redirect: the plain code in both scopes, plus the durable
    /// companion payload carrying the capture timestamp.
    pub async fn stash_join_intent(&self, code: &EventCode) -> Result<(), StorageError> {
        for scope in StorageScope::ALL {
            self.storage.set(scope, keys::EVENT_CODE, code.as_str()).await?;
        }

        let payload = EventCodePayload::new(code, &self.clock.now());
        let json = serde_json::to_string(&payload)
            .map_err(|e| StorageError::Encoding(e.to_string()))?;
        self.storage
            .set(StorageScope::Durable, keys::EVENT_PAYLOAD, &json)
            .await
    }

    /// Stashes the path of an interrupted ticket purchase.
    pub async fn stash_resume_purchase(&self, path: &str) -> Result<(), StorageError> {
        self.storage
            .set(StorageScope::Durable, keys::RESUME_PURCHASE_PATH, path)
            .await
    }

    /// Stashes the role chosen before a registration or OAuth hand-off.
    pub async fn stash_role(&self, role: UserRole) -> Result<(), StorageError> {
        self.storage
            .set(StorageScope::Durable, keys::ROLE, role.as_str())
            .await
    }

    /// Takes the stashed role, clearing the slot.
    ///
    /// An unparseable stored value is treated as absent and cleared.
    pub async fn take_role(&self) -> Result<Option<UserRole>, StorageError> {
        let value = self.storage.get(StorageScope::Durable, keys::ROLE).await?;
        self.storage.remove(StorageScope::Durable, keys::ROLE).await?;
        Ok(value.and_then(|v| v.parse().ok()))
    }

    /// Clears the pending-role slot without reading it.
    pub async fn clear_role(&self) -> Result<(), StorageError> {
        self.storage.remove(StorageScope::Durable, keys::ROLE).await
    }

    /// The exactly-once read: reconciles all sources and consumes the winner.
    ///
    /// Precedence, highest first:
    /// 1. durable resume-purchase path
    /// 2. join code, short-lived scope
    /// 3. join code, durable scope
    /// 4. companion payload, rejected when older than the TTL
    /// 5. the redirect query parameters
    ///
    /// On any hit, every location is erased - partial cleanup would re-fire
    /// the intent on the next unrelated navigation.
    pub async fn take(&self, query: &RedirectQuery) -> Result<Option<PendingIntent>, StorageError> {
        let now = self.clock.now();
        let found = self.reconcile(query, &now).await?;

        if let Some(intent) = &found {
            debug!(
                source = %intent.source,
                "consuming pending intent"
            );
            self.erase_all().await?;
        }

        Ok(found)
    }

    /// Erases every intent location in both scopes.
    ///
    /// Also used by the sign-out scrub, where the `pending.` prefix covers
    /// these keys wholesale.
    pub async fn erase_all(&self) -> Result<(), StorageError> {
        for scope in StorageScope::ALL {
            self.storage.remove_by_prefix(scope, keys::PREFIX).await?;
        }
        Ok(())
    }

    async fn reconcile(
        &self,
        query: &RedirectQuery,
        now: &Timestamp,
    ) -> Result<Option<PendingIntent>, StorageError> {
        if let Some(path) = self
            .storage
            .get(StorageScope::Durable, keys::RESUME_PURCHASE_PATH)
            .await?
        {
            if !path.is_empty() {
                return Ok(Some(PendingIntent {
                    action: IntentAction::ResumePurchase { path },
                    captured_at: *now,
                    source: IntentSource::Durable,
                }));
            }
        }

        if let Some(intent) = self.read_code(StorageScope::ShortLived, now).await? {
            return Ok(Some(intent));
        }
        if let Some(intent) = self.read_code(StorageScope::Durable, now).await? {
            return Ok(Some(intent));
        }
        if let Some(intent) = self.read_payload(now).await? {
            return Ok(Some(intent));
        }

        Ok(query.event_code.clone().map(|code| PendingIntent {
            action: IntentAction::JoinEvent { code },
            captured_at: *now,
            source: IntentSource::Query,
        }))
    }

    async fn read_code(
        &self,
        scope: StorageScope,
        now: &Timestamp,
    ) -> Result<Option<PendingIntent>, StorageError> {
        let Some(value) = self.storage.get(scope, keys::EVENT_CODE).await? else {
            return Ok(None);
        };

        match EventCode::new(value) {
            Ok(code) => Ok(Some(PendingIntent {
                action: IntentAction::JoinEvent { code },
                captured_at: *now,
                source: match scope {
                    StorageScope::ShortLived => IntentSource::ShortLived,
                    StorageScope::Durable => IntentSource::Durable,
                },
            })),
            Err(e) => {
                warn!(scope = %scope, error = %e, "discarding malformed pending event code");
                Ok(None)
            }
        }
    }

    async fn read_payload(&self, now: &Timestamp) -> Result<Option<PendingIntent>, StorageError> {
        let Some(json) = self
            .storage
            .get(StorageScope::Durable, keys::EVENT_PAYLOAD)
            .await?
        else {
            return Ok(None);
        };

        let payload: EventCodePayload = match serde_json::from_str(&json) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "discarding malformed companion payload");
                return Ok(None);
            }
        };

        if payload.is_stale(now, self.ttl) {
            debug!("discarding stale companion payload");
            self.storage
                .remove(StorageScope::Durable, keys::EVENT_PAYLOAD)
                .await?;
            return Ok(None);
        }

        let captured_at = payload.captured_at();
        match EventCode::new(payload.code) {
            Ok(code) => Ok(Some(PendingIntent {
                action: IntentAction::JoinEvent { code },
                captured_at,
                source: IntentSource::CompanionPayload,
            })),
            Err(e) => {
                warn!(error = %e, "discarding companion payload with invalid code");
                Ok(None)
            }
        }
    }
}
