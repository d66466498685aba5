//! Scoped storage port - the two client-side key/value scopes.
//!
//! One logical store with two lifetimes: a short-lived scope cleared when
//! the browsing context closes, and a durable scope that survives it. Both
//! hold plain string values under namespaced keys. The pending-intent
//! reconciliation and the sign-out scrub are the only readers and writers;
//! all keys they use carry a subsystem prefix to avoid collisions.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// Which of the two storage lifetimes to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageScope {
    /// Cleared when the browsing context closes.
    ShortLived,
    /// Survives context closes.
    Durable,
}

impl StorageScope {
    /// Both scopes, in write order.
    pub const ALL: [StorageScope; 2] = [StorageScope::ShortLived, StorageScope::Durable];

    /// Returns a label for log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageScope::ShortLived => "short-lived",
            StorageScope::Durable => "durable",
        }
    }
}

impl fmt::Display for StorageScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors from a storage scope.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// The scope is unavailable (quota, disabled storage, I/O failure).
    #[error("Storage scope unavailable: {0}")]
    Unavailable(String),

    /// A value could not be encoded for storage.
    #[error("Failed to encode stored value: {0}")]
    Encoding(String),
}

/// Port for the two key/value scopes.
///
/// # Contract
///
/// - `get` returns `Ok(None)` for absent keys
/// - `remove` of an absent key succeeds
/// - `set` is last-writer-wins within a scope
#[async_trait]
pub trait ScopedStorage: Send + Sync {
    /// Reads a value.
    async fn get(&self, scope: StorageScope, key: &str) -> Result<Option<String>, StorageError>;

    /// Writes a value, replacing any previous one.
    async fn set(&self, scope: StorageScope, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removes a key. Absent keys are fine.
    async fn remove(&self, scope: StorageScope, key: &str) -> Result<(), StorageError>;

    /// Removes every key starting with `prefix`.
    ///
    /// Used by the sign-out scrub for the provider's auth-token keys and
    /// this subsystem's own `pending.` namespace.
    async fn remove_by_prefix(&self, scope: StorageScope, prefix: &str)
        -> Result<(), StorageError>;
}
