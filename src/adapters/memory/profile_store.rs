//! In-memory profile store for tests and development.
//!
//! Besides plain row storage, this adapter can simulate the backend
//! creation trigger: a row registered with [`with_trigger_created`] stays
//! invisible for a configured number of lookups before appearing, which is
//! exactly the race the profile resolver has to tolerate. A [`LookupGate`]
//! lets tests pause a lookup mid-flight to exercise the epoch guard.
//!
//! [`with_trigger_created`]: InMemoryProfileStore::with_trigger_created

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::domain::foundation::UserId;
use crate::ports::{ProfilePatch, ProfileRow, ProfileStore, ProfileStoreError};

/// Coordination handle for pausing lookups mid-flight.
///
/// `entered` fires when a lookup reaches the store; the lookup then waits
/// until `release` is notified.
#[derive(Debug, Clone, Default)]
pub struct LookupGate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

/// In-memory profile store.
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    rows: RwLock<HashMap<String, ProfileRow>>,
    /// Rows pending "trigger creation": invisible until the per-id lookup
    /// countdown reaches zero.
    hidden_for: RwLock<HashMap<String, u32>>,
    force_error: RwLock<Option<ProfileStoreError>>,
    fail_inserts: AtomicBool,
    gate: RwLock<Option<LookupGate>>,
    lookups: AtomicUsize,
    inserts: AtomicUsize,
}

impl InMemoryProfileStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a row that is immediately visible.
    pub fn with_row(self, row: ProfileRow) -> Self {
        self.rows
            .write()
            .unwrap()
            .insert(row.id.as_str().to_string(), row);
        self
    }

    /// Adds a row that becomes visible only after `lookups` failed lookups,
    /// simulating the backend creation trigger landing late.
    pub fn with_trigger_created(self, row: ProfileRow, lookups: u32) -> Self {
        self.hidden_for
            .write()
            .unwrap()
            .insert(row.id.as_str().to_string(), lookups);
        self.rows
            .write()
            .unwrap()
            .insert(row.id.as_str().to_string(), row);
        self
    }

    /// Forces all operations to return the specified error.
    pub fn with_error(self, error: ProfileStoreError) -> Self {
        *self.force_error.write().unwrap() = Some(error);
        self
    }

    /// Makes every insert fail while lookups keep working.
    pub fn with_failing_inserts(self) -> Self {
        self.fail_inserts.store(true, Ordering::SeqCst);
        self
    }

    /// Pauses each lookup until the gate's `release` is notified.
    pub fn with_lookup_gate(self, gate: LookupGate) -> Self {
        *self.gate.write().unwrap() = Some(gate);
        self
    }

    /// Clears the forced error.
    pub fn clear_error(&self) {
        *self.force_error.write().unwrap() = None;
    }

    /// Returns a stored row for assertions.
    pub fn row(&self, id: &UserId) -> Option<ProfileRow> {
        self.rows.read().unwrap().get(id.as_str()).cloned()
    }

    /// Number of stored rows.
    pub fn row_count(&self) -> usize {
        self.rows.read().unwrap().len()
    }

    /// Number of lookups performed.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Number of inserts attempted.
    pub fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    fn check_forced_error(&self) -> Result<(), ProfileStoreError> {
        if let Some(error) = self.force_error.read().unwrap().clone() {
            return Err(error);
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn get_by_id(&self, id: &UserId) -> Result<Option<ProfileRow>, ProfileStoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);

        let gate = self.gate.read().unwrap().clone();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        self.check_forced_error()?;

        {
            let mut hidden = self.hidden_for.write().unwrap();
            if let Some(remaining) = hidden.get_mut(id.as_str()) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Ok(None);
                }
                hidden.remove(id.as_str());
            }
        }

        Ok(self.rows.read().unwrap().get(id.as_str()).cloned())
    }

    async fn insert(&self, row: &ProfileRow) -> Result<(), ProfileStoreError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.check_forced_error()?;

        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(ProfileStoreError::Unavailable(
                "insert rejected".to_string(),
            ));
        }

        let mut rows = self.rows.write().unwrap();
        if rows.contains_key(row.id.as_str()) {
            return Err(ProfileStoreError::AlreadyExists(row.id.clone()));
        }
        rows.insert(row.id.as_str().to_string(), row.clone());
        Ok(())
    }

    async fn update(&self, id: &UserId, patch: ProfilePatch) -> Result<(), ProfileStoreError> {
        self.check_forced_error()?;

        let mut rows = self.rows.write().unwrap();
        let row = rows
            .get_mut(id.as_str())
            .ok_or_else(|| ProfileStoreError::NotFound(id.clone()))?;

        if let Some(display_name) = patch.display_name {
            row.display_name = display_name;
        }
        if let Some(role) = patch.role {
            row.role = role;
        }
        if let Some(avatar_url) = patch.avatar_url {
            row.avatar_url = Some(avatar_url);
        }
        Ok(())
    }
}
