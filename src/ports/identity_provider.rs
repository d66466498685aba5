//! Identity provider port - the external authentication collaborator.
//!
//! The provider owns credentials and session tokens; this subsystem only
//! observes sessions and requests transitions. Token refresh and rotation
//! stay on the provider's side of this boundary.
//!
//! # Contract
//!
//! Implementations must:
//! - Return `Ok(None)` from `get_session` when no session exists (this is
//!   the terminal negative, not an error)
//! - Return `AuthError::ServiceUnavailable` for transport failures
//! - Push `AuthChange` events to every receiver handed out by
//!   `subscribe_changes`; events carry the session when one is present
//!
//! Change events are delivered over a channel rather than a callback so
//! consumers process them on their own task - the provider forbids network
//! calls from inside its own notification path.

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::mpsc;
use url::Url;

use crate::domain::foundation::{AuthError, UserId, UserRole};

/// User attributes the provider knows about, prior to profile resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    /// The provider-assigned user id.
    pub id: UserId,

    /// Email address the account was created with.
    pub email: String,

    /// Display name from provider metadata, if any.
    pub display_name: Option<String>,

    /// Avatar URL from provider metadata (OAuth providers usually set one).
    pub avatar_url: Option<String>,
}

impl SessionUser {
    /// Returns the display name, or email as fallback.
    pub fn display_name_or_email(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.email)
    }
}

/// Provider-issued proof of authentication.
///
/// The token is opaque to this subsystem; we carry it only so adapters can
/// authenticate follow-up calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Opaque access token.
    pub access_token: String,

    /// The user the session belongs to.
    pub user: SessionUser,
}

impl Session {
    /// Returns the session's user id.
    pub fn user_id(&self) -> &UserId {
        &self.user.id
    }
}

/// State transitions pushed by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthChange {
    /// A session became present (sign-in completed, possibly elsewhere).
    SignedIn,
    /// The provider rotated the session token.
    TokenRefreshed,
    /// The session ended (sign-out, possibly elsewhere).
    SignedOut,
}

/// A pushed change event with the session, when one exists.
pub type AuthChangeEvent = (AuthChange, Option<Session>);

/// Email/password credentials for password login.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: SecretString::new(password.into()),
        }
    }
}

/// Registration request: credentials plus the profile seed.
#[derive(Debug, Clone)]
pub struct SignUpRequest {
    pub email: String,
    pub password: SecretString,
    pub display_name: Option<String>,
    /// The role the user chose during registration.
    pub role: UserRole,
}

impl SignUpRequest {
    pub fn new(
        email: impl Into<String>,
        password: impl Into<String>,
        display_name: Option<String>,
        role: UserRole,
    ) -> Self {
        Self {
            email: email.into(),
            password: SecretString::new(password.into()),
            display_name,
            role,
        }
    }
}

/// Federated providers we can hand the browser off to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthProvider {
    Google,
    Github,
}

impl OAuthProvider {
    /// Returns the provider slug used in authorize URLs.
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
            OAuthProvider::Github => "github",
        }
    }
}

/// Request to start an OAuth flow.
///
/// `query` pairs are mirrored onto the redirect URL so they come back with
/// the user - the last-resort read source for a pending intent.
#[derive(Debug, Clone)]
pub struct OAuthRequest {
    pub provider: OAuthProvider,
    pub redirect_url: String,
    pub query: Vec<(String, String)>,
}

/// Scope of a sign-out request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutScope {
    /// End only this client's session.
    Local,
    /// Revoke the session everywhere.
    Global,
}

impl SignOutScope {
    /// Returns the wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SignOutScope::Local => "local",
            SignOutScope::Global => "global",
        }
    }
}

/// Port for the external identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Returns the current session, if any.
    async fn get_session(&self) -> Result<Option<Session>, AuthError>;

    /// Returns the current session's user, if any.
    async fn get_user(&self) -> Result<Option<SessionUser>, AuthError>;

    /// Signs in with email and password.
    ///
    /// # Errors
    ///
    /// * `AuthError::InvalidCredentials` - the pair was rejected
    /// * `AuthError::ServiceUnavailable` - provider unreachable
    async fn sign_in_with_password(&self, credentials: Credentials) -> Result<Session, AuthError>;

    /// Creates an account and signs it in.
    ///
    /// # Errors
    ///
    /// * `AuthError::EmailTaken` - an account already exists for the email
    /// * `AuthError::ServiceUnavailable` - provider unreachable
    async fn sign_up(&self, request: SignUpRequest) -> Result<Session, AuthError>;

    /// Builds the authorize URL for a federated sign-in.
    ///
    /// The caller navigates to the returned URL; the session materializes
    /// after the redirect returns.
    async fn sign_in_with_oauth(&self, request: OAuthRequest) -> Result<Url, AuthError>;

    /// Ends the session with the given scope.
    async fn sign_out(&self, scope: SignOutScope) -> Result<(), AuthError>;

    /// Subscribes to provider-pushed state transitions.
    ///
    /// Dropping the receiver unsubscribes.
    fn subscribe_changes(&self) -> mpsc::UnboundedReceiver<AuthChangeEvent>;
}
