//! In-memory identity provider for tests and development.
//!
//! Stores registered accounts and the current session in memory and pushes
//! change events to subscribers, mimicking the real provider's behavior:
//! sign-in emits `SignedIn`, sign-out emits `SignedOut`, and tests can
//! inject arbitrary pushed transitions (token refreshed, signed out
//! elsewhere) with [`InMemoryIdentityProvider::push_change`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tokio::sync::mpsc;
use url::Url;
use uuid::Uuid;

use crate::domain::foundation::{AuthError, UserId};
use crate::ports::{
    AuthChange, AuthChangeEvent, Credentials, IdentityProvider, OAuthRequest, Session,
    SessionUser, SignOutScope, SignUpRequest,
};

/// Registered account: password plus the user record a sign-in yields.
struct Account {
    password: String,
    user: SessionUser,
}

/// In-memory identity provider.
#[derive(Default)]
pub struct InMemoryIdentityProvider {
    accounts: RwLock<HashMap<String, Account>>,
    session: RwLock<Option<Session>>,
    subscribers: RwLock<Vec<mpsc::UnboundedSender<AuthChangeEvent>>>,
    /// Optional error to return for all provider calls (for error testing)
    force_error: RwLock<Option<AuthError>>,
    /// Makes global sign-out fail while local still succeeds
    fail_global_sign_out: AtomicBool,
    session_queries: AtomicUsize,
}

impl InMemoryIdentityProvider {
    /// Creates a provider with no accounts and no session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an account that `sign_in_with_password` will accept.
    pub fn with_account(
        self,
        email: impl Into<String>,
        password: impl Into<String>,
        user: SessionUser,
    ) -> Self {
        self.accounts.write().unwrap().insert(
            email.into(),
            Account {
                password: password.into(),
                user,
            },
        );
        self
    }

    /// Starts with an already-open session.
    pub fn with_session(self, session: Session) -> Self {
        *self.session.write().unwrap() = Some(session);
        self
    }

    /// Forces all provider calls to return the specified error.
    pub fn with_error(self, error: AuthError) -> Self {
        *self.force_error.write().unwrap() = Some(error);
        self
    }

    /// Makes `sign_out(Global)` fail; `sign_out(Local)` keeps working.
    pub fn with_failing_global_sign_out(self) -> Self {
        self.fail_global_sign_out.store(true, Ordering::SeqCst);
        self
    }

    /// Clears the forced error and returns to normal operation.
    pub fn clear_error(&self) {
        *self.force_error.write().unwrap() = None;
    }

    /// Opens a session directly and pushes `SignedIn`, the way the real
    /// provider does after processing redirect tokens.
    pub fn push_session(&self, session: Session) {
        *self.session.write().unwrap() = Some(session.clone());
        self.emit(AuthChange::SignedIn, Some(session));
    }

    /// Pushes an arbitrary change event to all subscribers.
    pub fn push_change(&self, change: AuthChange, session: Option<Session>) {
        if let Some(session) = &session {
            *self.session.write().unwrap() = Some(session.clone());
        } else if change == AuthChange::SignedOut {
            *self.session.write().unwrap() = None;
        }
        self.emit(change, session);
    }

    /// Number of `get_session` calls made so far.
    pub fn session_query_count(&self) -> usize {
        self.session_queries.load(Ordering::SeqCst)
    }

    fn check_forced_error(&self) -> Result<(), AuthError> {
        if let Some(error) = self.force_error.read().unwrap().clone() {
            return Err(error);
        }
        Ok(())
    }

    fn emit(&self, change: AuthChange, session: Option<Session>) {
        let mut subscribers = self.subscribers.write().unwrap();
        subscribers.retain(|tx| tx.send((change, session.clone())).is_ok());
    }

    fn open_session(&self, user: SessionUser) -> Session {
        let session = Session {
            access_token: format!("token-{}", Uuid::new_v4()),
            user,
        };
        *self.session.write().unwrap() = Some(session.clone());
        session
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        self.session_queries.fetch_add(1, Ordering::SeqCst);
        self.check_forced_error()?;
        Ok(self.session.read().unwrap().clone())
    }

    async fn get_user(&self) -> Result<Option<SessionUser>, AuthError> {
        self.check_forced_error()?;
        Ok(self.session.read().unwrap().as_ref().map(|s| s.user.clone()))
    }

    async fn sign_in_with_password(&self, credentials: Credentials) -> Result<Session, AuthError> {
        self.check_forced_error()?;

        let user = {
            let accounts = self.accounts.read().unwrap();
            let account = accounts
                .get(&credentials.email)
                .filter(|a| a.password == *credentials.password.expose_secret())
                .ok_or(AuthError::InvalidCredentials)?;
            account.user.clone()
        };

        let session = self.open_session(user);
        self.emit(AuthChange::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, request: SignUpRequest) -> Result<Session, AuthError> {
        self.check_forced_error()?;

        {
            let accounts = self.accounts.read().unwrap();
            if accounts.contains_key(&request.email) {
                return Err(AuthError::EmailTaken);
            }
        }

        let user = SessionUser {
            id: UserId::new(Uuid::new_v4().to_string())?,
            email: request.email.clone(),
            display_name: request.display_name.clone(),
            avatar_url: None,
        };
        self.accounts.write().unwrap().insert(
            request.email.clone(),
            Account {
                password: request.password.expose_secret().clone(),
                user: user.clone(),
            },
        );

        let session = self.open_session(user);
        self.emit(AuthChange::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_in_with_oauth(&self, request: OAuthRequest) -> Result<Url, AuthError> {
        self.check_forced_error()?;

        let mut url = Url::parse("https://oauth.invalid/authorize")
            .map_err(|e| AuthError::service_unavailable(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("provider", request.provider.as_str())
            .append_pair("redirect_to", &request.redirect_url);
        for (key, value) in &request.query {
            url.query_pairs_mut().append_pair(key, value);
        }
        Ok(url)
    }

    async fn sign_out(&self, scope: SignOutScope) -> Result<(), AuthError> {
        self.check_forced_error()?;

        if scope == SignOutScope::Global && self.fail_global_sign_out.load(Ordering::SeqCst) {
            return Err(AuthError::service_unavailable(
                "global sign-out rejected".to_string(),
            ));
        }

        *self.session.write().unwrap() = None;
        self.emit(AuthChange::SignedOut, None);
        Ok(())
    }

    fn subscribe_changes(&self) -> mpsc::UnboundedReceiver<AuthChangeEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.write().unwrap().push(tx);
        rx
    }
}
