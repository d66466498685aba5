//! Profile store port - the durable application-level user record.
//!
//! Rows are keyed by the provider's user id. A server-side trigger outside
//! this subsystem creates a row shortly after account creation, with unknown
//! and variable delay - callers must tolerate `get_by_id` returning `None`
//! for a user that definitely exists.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::foundation::{IdentityPatch, UserId, UserRole};
use super::identity_provider::SessionUser;

/// Errors from the profile store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProfileStoreError {
    /// Update targeted a row that does not exist.
    #[error("Profile not found for user {0}")]
    NotFound(UserId),

    /// Insert collided with an existing row (usually the creation trigger
    /// winning the race).
    #[error("Profile already exists for user {0}")]
    AlreadyExists(UserId),

    /// The store returned something we could not decode.
    #[error("Malformed profile row: {0}")]
    Malformed(String),

    /// The store is unreachable (network, config, etc.).
    #[error("Profile store unavailable: {0}")]
    Unavailable(String),
}

impl ProfileStoreError {
    /// Returns true if this error may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProfileStoreError::Unavailable(_))
    }
}

/// The durable user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRow {
    pub id: UserId,
    pub email: String,
    pub display_name: String,
    pub role: UserRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl ProfileRow {
    /// Builds a minimal row for a user with no profile yet, from the
    /// best-available session metadata.
    pub fn synthesized(user: &SessionUser, role: UserRole) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            display_name: user.display_name_or_email().to_string(),
            role,
            avatar_url: user.avatar_url.clone(),
        }
    }
}

/// Partial update to a profile row. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<UserRole>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl ProfilePatch {
    /// A patch that only changes the role.
    pub fn role(role: UserRole) -> Self {
        Self {
            role: Some(role),
            ..Default::default()
        }
    }

    /// Returns true if the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.role.is_none() && self.avatar_url.is_none()
    }
}

impl From<IdentityPatch> for ProfilePatch {
    fn from(patch: IdentityPatch) -> Self {
        Self {
            display_name: patch.display_name,
            role: patch.role,
            avatar_url: None,
        }
    }
}

/// Port for the profile data store.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Fetches a profile row by user id.
    ///
    /// Returns `Ok(None)` when no row exists yet - absence is an expected
    /// state during the trigger-creation race, not an error.
    async fn get_by_id(&self, id: &UserId) -> Result<Option<ProfileRow>, ProfileStoreError>;

    /// Inserts a new profile row.
    ///
    /// # Errors
    ///
    /// Returns `ProfileStoreError::AlreadyExists` when a row for the id is
    /// already present.
    async fn insert(&self, row: &ProfileRow) -> Result<(), ProfileStoreError>;

    /// Applies a partial update to an existing row.
    ///
    /// # Errors
    ///
    /// Returns `ProfileStoreError::NotFound` when no row exists for the id.
    async fn update(&self, id: &UserId, patch: ProfilePatch) -> Result<(), ProfileStoreError>;
}
