//! Authentication types for the domain layer.
//!
//! These types represent the resolved identity of an authenticated user and
//! the process-wide authentication status. They have **no external
//! dependencies** - any identity provider can populate them via the
//! `IdentityProvider` port.
//!
//! # Design Decisions
//!
//! - `ResolvedIdentity` is an immutable value object, mutated only by
//!   reassignment through the session manager
//! - `AuthError` is domain-centric, not provider-specific
//! - `AuthStatus` is a `StateMachine` so transitions can be validated

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::{StateMachine, UserId, ValidationError};

/// Role a user holds on the platform.
///
/// Hosts manage events; attendees join them. The role is stored on the
/// profile row and, transiently, in the pending-role slot while a
/// registration or OAuth redirect is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Host,
    Attendee,
}

impl UserRole {
    /// Returns the wire representation (`host` / `attendee`).
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Host => "host",
            UserRole::Attendee => "attendee",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "host" => Ok(UserRole::Host),
            "attendee" => Ok(UserRole::Attendee),
            other => Err(ValidationError::invalid_format(
                "role",
                format!("expected 'host' or 'attendee', got '{}'", other),
            )),
        }
    }
}

/// Process-wide authentication status.
///
/// The session manager starts in `Loading` (bootstrap pending) and only
/// enters `Unauthenticated` on a definitive determination: no session found
/// at startup, sign-out, provider-pushed sign-out, or unrecoverable
/// resolution failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    Unauthenticated,
    Loading,
    Authenticated,
}

impl StateMachine for AuthStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use AuthStatus::*;
        matches!(
            (self, target),
            (Unauthenticated, Loading)
                | (Loading, Authenticated)
                | (Loading, Unauthenticated)
                | (Authenticated, Loading)
                | (Authenticated, Unauthenticated)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use AuthStatus::*;
        match self {
            Unauthenticated => vec![Loading],
            Loading => vec![Authenticated, Unauthenticated],
            Authenticated => vec![Loading, Unauthenticated],
        }
    }
}

/// Fully resolved identity of an authenticated user.
///
/// Created by profile resolution once a profile row is observed or the
/// best-effort fallback is exhausted. Immutable; the session manager
/// replaces the whole value on change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    /// The provider-assigned user id.
    pub id: UserId,

    /// Display name, falling back to the email address.
    pub display_name: String,

    /// Email address from the session.
    pub email: String,

    /// Role resolved from the profile row or the pending-role slot.
    pub role: UserRole,

    /// Whether a fully-formed profile row backed this identity.
    ///
    /// False for identities synthesized for first-time users; the rest of
    /// the application may use this to prompt for onboarding.
    pub profile_complete: bool,

    /// Whether the backing profile row is durably persisted.
    ///
    /// False when the synthesize-and-insert step could not write the row;
    /// the identity is still usable in memory.
    pub persisted: bool,
}

impl ResolvedIdentity {
    /// Applies a patch, producing the updated identity.
    pub fn with_patch(&self, patch: &IdentityPatch) -> Self {
        let mut updated = self.clone();
        if let Some(display_name) = &patch.display_name {
            updated.display_name = display_name.clone();
        }
        if let Some(role) = patch.role {
            updated.role = role;
        }
        if let Some(complete) = patch.profile_complete {
            updated.profile_complete = complete;
        }
        updated
    }
}

/// Partial update to a resolved identity.
///
/// Only the fields a signed-in user can change about themselves; the id and
/// email belong to the identity provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityPatch {
    pub display_name: Option<String>,
    pub role: Option<UserRole>,
    pub profile_complete: Option<bool>,
}

impl IdentityPatch {
    /// Returns true if the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.role.is_none() && self.profile_complete.is_none()
    }
}

/// Snapshot of the authentication state published to the rest of the
/// application.
///
/// `identity` is `Some` exactly when `status` is `Authenticated`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSnapshot {
    pub identity: Option<ResolvedIdentity>,
    pub status: AuthStatus,
}

impl AuthSnapshot {
    /// Snapshot for a bootstrap or resolution in progress.
    pub fn loading() -> Self {
        Self {
            identity: None,
            status: AuthStatus::Loading,
        }
    }

    /// Snapshot for a definitive no-session determination.
    pub fn unauthenticated() -> Self {
        Self {
            identity: None,
            status: AuthStatus::Unauthenticated,
        }
    }

    /// Snapshot for a resolved identity.
    pub fn authenticated(identity: ResolvedIdentity) -> Self {
        Self {
            identity: Some(identity),
            status: AuthStatus::Authenticated,
        }
    }

    /// Returns true if an identity is resolved.
    pub fn is_authenticated(&self) -> bool {
        self.status == AuthStatus::Authenticated
    }
}

/// Authentication errors surfaced by the session subsystem.
///
/// These errors are **domain-centric** - they describe what went wrong from
/// the application's perspective, not the provider's.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// The email/password pair was rejected.
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Registration attempted with an email that already has an account.
    #[error("Email is already registered")]
    EmailTaken,

    /// An operation that needs a signed-in user ran without one.
    #[error("No authenticated session")]
    NotAuthenticated,

    /// The sign-in was overtaken by a newer session change and its result
    /// was discarded.
    #[error("Sign-in superseded by a newer session change")]
    Superseded,

    /// The provider refused the request for a reason we pass through.
    #[error("Auth provider rejected the request: {0}")]
    ProviderRejected(String),

    /// The provider or profile store is unreachable (network, config, etc.).
    #[error("Auth service unavailable: {0}")]
    ServiceUnavailable(String),

    /// A value failed domain validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl AuthError {
    /// Creates a service unavailable error with a message.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable(message.into())
    }

    /// Returns true if this error indicates the user should re-authenticate.
    pub fn requires_reauthentication(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidCredentials | AuthError::NotAuthenticated
        )
    }

    /// Returns true if this is a transient error that may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::ServiceUnavailable(_))
    }
}
