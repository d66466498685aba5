//! In-memory scoped storage for tests and development.
//!
//! Models the two browser storage scopes as plain maps. Useful for
//! asserting on exactly which keys survive a scrub or an intent
//! consumption.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::ports::{ScopedStorage, StorageError, StorageScope};

/// In-memory implementation of both storage scopes.
#[derive(Debug, Default)]
pub struct InMemoryScopedStorage {
    short_lived: RwLock<HashMap<String, String>>,
    durable: RwLock<HashMap<String, String>>,
    force_error: RwLock<Option<StorageError>>,
}

impl InMemoryScopedStorage {
    /// Creates empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a value, bypassing error forcing.
    pub fn with_value(
        self,
        scope: StorageScope,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.map(scope).write().unwrap().insert(key.into(), value.into());
        self
    }

    /// Forces all operations to return the specified error.
    pub fn with_error(self, error: StorageError) -> Self {
        *self.force_error.write().unwrap() = Some(error);
        self
    }

    /// Clears the forced error.
    pub fn clear_error(&self) {
        *self.force_error.write().unwrap() = None;
    }

    /// Reads a value directly for assertions.
    pub fn value(&self, scope: StorageScope, key: &str) -> Option<String> {
        self.map(scope).read().unwrap().get(key).cloned()
    }

    /// Number of keys held in a scope.
    pub fn len(&self, scope: StorageScope) -> usize {
        self.map(scope).read().unwrap().len()
    }

    /// True if the scope holds no keys.
    pub fn is_empty(&self, scope: StorageScope) -> bool {
        self.len(scope) == 0
    }

    fn map(&self, scope: StorageScope) -> &RwLock<HashMap<String, String>> {
        match scope {
            StorageScope::ShortLived => &self.short_lived,
            StorageScope::Durable => &self.durable,
        }
    }

    fn check_forced_error(&self) -> Result<(), StorageError> {
        if let Some(error) = self.force_error.read().unwrap().clone() {
            return Err(error);
        }
        Ok(())
    }
}

#[async_trait]
impl ScopedStorage for InMemoryScopedStorage {
    async fn get(&self, scope: StorageScope, key: &str) -> Result<Option<String>, StorageError> {
        self.check_forced_error()?;
        Ok(self.map(scope).read().unwrap().get(key).cloned())
    }

    async fn set(&self, scope: StorageScope, key: &str, value: &str) -> Result<(), StorageError> {
        self.check_forced_error()?;
        self.map(scope)
            .write()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, scope: StorageScope, key: &str) -> Result<(), StorageError> {
        self.check_forced_error()?;
        self.map(scope).write().unwrap().remove(key);
        Ok(())
    }

    async fn remove_by_prefix(
        &self,
        scope: StorageScope,
        prefix: &str,
    ) -> Result<(), StorageError> {
        self.check_forced_error()?;
        self.map(scope)
            .write()
            .unwrap()
            .retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips_within_a_scope() {
        let storage = InMemoryScopedStorage::new();

        storage
            .set(StorageScope::Durable, "pending.role", "host")
            .await
            .unwrap();

        assert_eq!(
            storage.get(StorageScope::Durable, "pending.role").await.unwrap(),
            Some("host".to_string())
        );
        assert_eq!(
            storage.get(StorageScope::ShortLived, "pending.role").await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn set_is_last_writer_wins() {
        let storage = InMemoryScopedStorage::new();

        storage.set(StorageScope::Durable, "k", "one").await.unwrap();
        storage.set(StorageScope::Durable, "k", "two").await.unwrap();

        assert_eq!(storage.value(StorageScope::Durable, "k"), Some("two".to_string()));
    }

    #[tokio::test]
    async fn remove_of_absent_key_succeeds() {
        let storage = InMemoryScopedStorage::new();
        assert!(storage.remove(StorageScope::ShortLived, "nope").await.is_ok());
    }

    #[tokio::test]
    async fn remove_by_prefix_clears_only_matching_keys() {
        let storage = InMemoryScopedStorage::new()
            .with_value(StorageScope::Durable, "sb-auth.token", "t")
            .with_value(StorageScope::Durable, "sb-auth.refresh", "r")
            .with_value(StorageScope::Durable, "pending.eventCode", "482913");

        storage
            .remove_by_prefix(StorageScope::Durable, "sb-auth.")
            .await
            .unwrap();

        assert_eq!(storage.len(StorageScope::Durable), 1);
        assert!(storage.value(StorageScope::Durable, "pending.eventCode").is_some());
    }

    #[tokio::test]
    async fn forced_error_applies_to_all_operations() {
        let storage = InMemoryScopedStorage::new()
            .with_error(StorageError::Unavailable("quota".to_string()));

        assert!(storage.get(StorageScope::Durable, "k").await.is_err());
        assert!(storage.set(StorageScope::Durable, "k", "v").await.is_err());

        storage.clear_error();
        assert!(storage.get(StorageScope::Durable, "k").await.is_ok());
    }
}
