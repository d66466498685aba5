//! Session Lifecycle Manager - the single owner of authentication state.
//!
//! The manager owns the process-wide [`AuthSnapshot`] and publishes it over
//! a `watch` channel; nothing else in the application holds a mutable
//! reference to the identity. Three things write it: `initialize`, the
//! provider-change task, and `sign_out`. Every write funnels through one
//! entry point that performs the epoch check, so a resolution that was
//! overtaken by a sign-out (or a newer sign-in) is dropped instead of
//! resurrecting a cleared identity.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::application::intent_store::{keys, PendingIntentStore};
use crate::application::profile_resolver::ProfileResolver;
use crate::domain::foundation::{
    AuthError, AuthSnapshot, IdentityPatch, ResolvedIdentity, UserRole,
};
use crate::domain::intent::EventCode;
use crate::ports::{
    AuthChange, Credentials, IdentityProvider, OAuthProvider, OAuthRequest, ProfilePatch,
    ProfileStore, ScopedStorage, Session, SignOutScope, SignUpRequest, StorageScope,
};

/// Owns and publishes the authentication state.
///
/// Constructed in `Loading`; `Unauthenticated` is only ever entered on a
/// definitive determination (no session at startup, sign-out, pushed
/// sign-out, or unrecoverable resolution failure).
pub struct SessionManager {
    provider: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileStore>,
    storage: Arc<dyn ScopedStorage>,
    intents: Arc<PendingIntentStore>,
    resolver: ProfileResolver,
    /// Prefix under which the provider namespaces its auth-token keys.
    auth_key_prefix: String,
    snapshot_tx: watch::Sender<AuthSnapshot>,
    /// Bumped whenever a new resolution starts or the state is cleared.
    /// In-flight resolutions carry the epoch they started from and are
    /// dropped when it no longer matches at completion time.
    epoch: AtomicU64,
}

impl SessionManager {
    /// Creates the manager and spawns the provider-change task.
    ///
    /// The returned manager is in `Loading` until [`initialize`] runs.
    ///
    /// [`initialize`]: SessionManager::initialize
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileStore>,
        storage: Arc<dyn ScopedStorage>,
        intents: Arc<PendingIntentStore>,
        auth_key_prefix: impl Into<String>,
    ) -> Arc<Self> {
        let (snapshot_tx, _) = watch::channel(AuthSnapshot::loading());
        let manager = Arc::new(Self {
            resolver: ProfileResolver::new(profiles.clone()),
            provider,
            profiles,
            storage,
            intents,
            auth_key_prefix: auth_key_prefix.into(),
            snapshot_tx,
            epoch: AtomicU64::new(0),
        });
        manager.spawn_change_task();
        manager
    }

    /// Subscribes to snapshot updates.
    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Returns the current snapshot.
    pub fn snapshot(&self) -> AuthSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Establishes the initial state from any existing session.
    ///
    /// A failing session query is a definitive no-session determination,
    /// not a fatal error - startup must never hang in `Loading`.
    #[instrument(skip(self))]
    pub async fn initialize(&self) {
        match self.provider.get_session().await {
            Ok(Some(session)) => {
                info!(user_id = %session.user_id(), "restoring existing session");
                let _ = self.resolve_session(&session, None).await;
            }
            Ok(None) => {
                debug!("no existing session");
                self.clear_to_unauthenticated();
            }
            Err(e) => {
                warn!(error = %e, "session query failed, treating as unauthenticated");
                self.clear_to_unauthenticated();
            }
        }
    }

    /// Signs in with email and password.
    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    pub async fn login(&self, credentials: Credentials) -> Result<ResolvedIdentity, AuthError> {
        self.scrub_for_new_login().await;

        match self.provider.sign_in_with_password(credentials).await {
            Ok(session) => self.resolve_session(&session, None).await,
            Err(e) => {
                self.clear_to_unauthenticated();
                Err(e)
            }
        }
    }

    /// Registers a new account and resolves its identity.
    ///
    /// The chosen role is stashed in the pending-role slot before sign-up so
    /// the trigger-created profile can be corrected even if this flow is
    /// interrupted; the slot is erased once used or when registration
    /// concludes, whichever comes first.
    #[instrument(skip(self, request), fields(email = %request.email, role = %request.role))]
    pub async fn register(&self, request: SignUpRequest) -> Result<ResolvedIdentity, AuthError> {
        self.scrub_for_new_login().await;

        let role = request.role;
        if let Err(e) = self.intents.stash_role(role).await {
            warn!(error = %e, "could not stash pending role");
        }

        let result = match self.provider.sign_up(request).await {
            Ok(session) => self.resolve_session(&session, Some(role)).await,
            Err(e) => {
                self.clear_to_unauthenticated();
                Err(e)
            }
        };

        if let Err(e) = self.intents.clear_role().await {
            warn!(error = %e, "could not clear pending role after registration");
        }
        result
    }

    /// Starts a federated sign-in, returning the URL to navigate to.
    ///
    /// The chosen role goes into the pending-role slot, and `role` /
    /// `eventCode` are mirrored onto the outbound query so they come back
    /// with the redirect as the last-resort intent source.
    #[instrument(skip(self), fields(provider = %oauth_provider.as_str(), role = %role))]
    pub async fn sign_in_with_provider(
        &self,
        oauth_provider: OAuthProvider,
        role: UserRole,
        redirect_url: &str,
        event_code: Option<&EventCode>,
    ) -> Result<Url, AuthError> {
        self.scrub_for_new_login().await;

        if let Err(e) = self.intents.stash_role(role).await {
            warn!(error = %e, "could not stash pending role");
        }

        let mut query = vec![("role".to_string(), role.as_str().to_string())];
        if let Some(code) = event_code {
            query.push(("eventCode".to_string(), code.as_str().to_string()));
        }

        self.provider
            .sign_in_with_oauth(OAuthRequest {
                provider: oauth_provider,
                redirect_url: redirect_url.to_string(),
                query,
            })
            .await
    }

    /// Signs out, in strict order: clear the in-memory identity, scrub the
    /// local caches, then tell the provider.
    ///
    /// The identity clears before any network round trip so dependent UI
    /// never shows a stale identity, and the caches are scrubbed before the
    /// provider call so they end up empty even when it fails. A failed
    /// global sign-out is retried once with local scope.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.clear_to_unauthenticated();
        self.scrub_all_artifacts().await;

        match self.provider.sign_out(SignOutScope::Global).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, "global sign-out failed, retrying with local scope");
                self.provider.sign_out(SignOutScope::Local).await
            }
        }
    }

    /// Applies a patch to the current identity, persisting it when a
    /// profile row backs the identity.
    pub async fn update_identity(
        &self,
        patch: IdentityPatch,
    ) -> Result<ResolvedIdentity, AuthError> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let current = self
            .snapshot_tx
            .borrow()
            .identity
            .clone()
            .ok_or(AuthError::NotAuthenticated)?;

        if patch.is_empty() {
            return Ok(current);
        }

        let updated = current.with_patch(&patch);
        if current.persisted {
            self.profiles
                .update(&current.id, ProfilePatch::from(patch))
                .await
                .map_err(|e| AuthError::service_unavailable(e.to_string()))?;
        }

        self.publish_if_current(epoch, AuthSnapshot::authenticated(updated.clone()));
        Ok(updated)
    }

    /// Resolves `session` to an identity and publishes the outcome.
    ///
    /// This is the only path into `Authenticated`. The resolution is tagged
    /// with a fresh epoch; if a sign-out or newer sign-in lands while the
    /// profile fetch is in flight, the stale result is dropped.
    async fn resolve_session(
        &self,
        session: &Session,
        requested_role: Option<UserRole>,
    ) -> Result<ResolvedIdentity, AuthError> {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.publish_if_current(epoch, AuthSnapshot::loading());

        let requested = match requested_role {
            Some(role) => Some(role),
            None => self.intents.take_role().await.unwrap_or_else(|e| {
                warn!(error = %e, "could not read pending role");
                None
            }),
        };

        match self.resolver.resolve(session, requested).await {
            Ok(identity) => {
                if self.publish_if_current(epoch, AuthSnapshot::authenticated(identity.clone())) {
                    info!(user_id = %identity.id, role = %identity.role, "identity resolved");
                    Ok(identity)
                } else {
                    Err(AuthError::Superseded)
                }
            }
            Err(e) => {
                self.publish_if_current(epoch, AuthSnapshot::unauthenticated());
                Err(e)
            }
        }
    }

    /// The single mutation entry point: publishes `snapshot` only when
    /// `epoch` is still current.
    fn publish_if_current(&self, epoch: u64, snapshot: AuthSnapshot) -> bool {
        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!(epoch, "dropping superseded state transition");
            return false;
        }
        self.snapshot_tx.send_replace(snapshot);
        true
    }

    /// Clears to `Unauthenticated` immediately, invalidating any in-flight
    /// resolution.
    fn clear_to_unauthenticated(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.snapshot_tx.send_replace(AuthSnapshot::unauthenticated());
    }

    /// Scrub before a fresh login/registration: the provider's cached
    /// tokens and any leftover pending-role selection from a previous user.
    /// A join intent captured for the flow now starting is kept.
    async fn scrub_for_new_login(&self) {
        for scope in StorageScope::ALL {
            if let Err(e) = self
                .storage
                .remove_by_prefix(scope, &self.auth_key_prefix)
                .await
            {
                warn!(scope = %scope, error = %e, "auth key scrub failed");
            }
        }
        if let Err(e) = self.intents.clear_role().await {
            warn!(error = %e, "pending role scrub failed");
        }
    }

    /// Full scrub on sign-out: the provider's auth keys plus every
    /// `pending.` key in both scopes.
    async fn scrub_all_artifacts(&self) {
        for scope in StorageScope::ALL {
            for prefix in [self.auth_key_prefix.as_str(), keys::PREFIX] {
                if let Err(e) = self.storage.remove_by_prefix(scope, prefix).await {
                    warn!(scope = %scope, prefix, error = %e, "sign-out scrub failed");
                }
            }
        }
    }

    /// Forwards provider-pushed transitions to the manager.
    ///
    /// Events are consumed on their own task, one scheduling tick removed
    /// from the provider's notification path - the provider forbids network
    /// calls from inside it.
    fn spawn_change_task(self: &Arc<Self>) {
        let mut changes = self.provider.subscribe_changes();
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some((change, session)) = changes.recv().await {
                let Some(manager) = weak.upgrade() else { break };
                tokio::task::yield_now().await;
                manager.on_provider_change(change, session).await;
            }
        });
    }

    async fn on_provider_change(&self, change: AuthChange, session: Option<Session>) {
        match (change, session) {
            (AuthChange::SignedOut, _) => {
                info!("provider pushed sign-out");
                self.clear_to_unauthenticated();
            }
            (_, Some(session)) => {
                let resolved_id = self.snapshot_tx.borrow().identity.as_ref().map(|i| i.id.clone());
                if resolved_id.as_ref() != Some(session.user_id()) {
                    debug!(user_id = %session.user_id(), change = ?change, "provider pushed new session");
                    let _ = self.resolve_session(&session, None).await;
                }
            }
            (_, None) => {
                debug!(change = ?change, "ignoring session-less change event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::adapters::clock::ManualClock;
    use crate::adapters::memory::{
        InMemoryIdentityProvider, InMemoryProfileStore, InMemoryScopedStorage, LookupGate,
    };
    use crate::domain::foundation::{AuthStatus, UserId};
    use crate::ports::{ProfileRow, SessionUser};

    const AUTH_PREFIX: &str = "sb-auth.";

    struct Fixture {
        provider: Arc<InMemoryIdentityProvider>,
        profiles: Arc<InMemoryProfileStore>,
        storage: Arc<InMemoryScopedStorage>,
        manager: Arc<SessionManager>,
    }

    fn fixture(provider: InMemoryIdentityProvider, profiles: InMemoryProfileStore) -> Fixture {
        let provider = Arc::new(provider);
        let profiles = Arc::new(profiles);
        let storage = Arc::new(InMemoryScopedStorage::new());
        let intents = Arc::new(PendingIntentStore::new(
            storage.clone(),
            Arc::new(ManualClock::default()),
            Duration::from_secs(600),
        ));
        let manager = SessionManager::new(
            provider.clone(),
            profiles.clone(),
            storage.clone(),
            intents,
            AUTH_PREFIX,
        );
        Fixture { provider, profiles, storage, manager }
    }

    fn user(id: &str) -> SessionUser {
        SessionUser {
            id: UserId::new(id).unwrap(),
            email: format!("{}@example.com", id),
            display_name: Some(format!("User {}", id)),
            avatar_url: None,
        }
    }

    fn session(id: &str) -> Session {
        Session {
            access_token: format!("token-{}", id),
            user: user(id),
        }
    }

    fn row(id: &str, role: UserRole) -> ProfileRow {
        ProfileRow {
            id: UserId::new(id).unwrap(),
            email: format!("{}@example.com", id),
            display_name: format!("User {}", id),
            role,
            avatar_url: None,
        }
    }

    async fn wait_for_status(manager: &SessionManager, status: AuthStatus) -> AuthSnapshot {
        let mut rx = manager.subscribe();
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if rx.borrow().status == status {
                    return rx.borrow().clone();
                }
                rx.changed().await.expect("manager dropped");
            }
        })
        .await
        .expect("status never reached")
    }

    #[tokio::test]
    async fn starts_in_loading() {
        let f = fixture(InMemoryIdentityProvider::new(), InMemoryProfileStore::new());
        assert_eq!(f.manager.snapshot().status, AuthStatus::Loading);
    }

    #[tokio::test]
    async fn initialize_without_session_is_unauthenticated() {
        let f = fixture(InMemoryIdentityProvider::new(), InMemoryProfileStore::new());

        f.manager.initialize().await;

        assert_eq!(f.manager.snapshot().status, AuthStatus::Unauthenticated);
        assert_eq!(f.profiles.lookup_count(), 0);
    }

    #[tokio::test]
    async fn initialize_failure_is_fail_safe() {
        let f = fixture(
            InMemoryIdentityProvider::new().with_error(AuthError::service_unavailable("down")),
            InMemoryProfileStore::new(),
        );

        f.manager.initialize().await;

        assert_eq!(f.manager.snapshot().status, AuthStatus::Unauthenticated);
    }

    #[tokio::test]
    async fn initialize_restores_existing_session() {
        let f = fixture(
            InMemoryIdentityProvider::new().with_session(session("u1")),
            InMemoryProfileStore::new().with_row(row("u1", UserRole::Host)),
        );

        f.manager.initialize().await;

        let snapshot = f.manager.snapshot();
        assert_eq!(snapshot.status, AuthStatus::Authenticated);
        assert_eq!(snapshot.identity.unwrap().role, UserRole::Host);
    }

    #[tokio::test]
    async fn login_resolves_identity() {
        let f = fixture(
            InMemoryIdentityProvider::new().with_account("a@example.com", "pw", user("u1")),
            InMemoryProfileStore::new().with_row(row("u1", UserRole::Attendee)),
        );

        let identity = f
            .manager
            .login(Credentials::new("a@example.com", "pw"))
            .await
            .unwrap();

        assert_eq!(identity.id.as_str(), "u1");
        assert!(f.manager.snapshot().is_authenticated());
    }

    #[tokio::test]
    async fn failed_login_settles_unauthenticated() {
        let f = fixture(
            InMemoryIdentityProvider::new().with_account("a@example.com", "pw", user("u1")),
            InMemoryProfileStore::new(),
        );

        let result = f.manager.login(Credentials::new("a@example.com", "wrong")).await;

        assert_eq!(result, Err(AuthError::InvalidCredentials));
        assert_eq!(f.manager.snapshot().status, AuthStatus::Unauthenticated);
    }

    #[tokio::test]
    async fn login_scrubs_stale_auth_keys_but_keeps_join_intent() {
        let f = fixture(
            InMemoryIdentityProvider::new().with_account("a@example.com", "pw", user("u1")),
            InMemoryProfileStore::new().with_row(row("u1", UserRole::Attendee)),
        );
        f.storage
            .set(StorageScope::Durable, "sb-auth.token", "stale")
            .await
            .unwrap();
        f.storage
            .set(StorageScope::Durable, keys::ROLE, "host")
            .await
            .unwrap();
        f.storage
            .set(StorageScope::ShortLived, keys::EVENT_CODE, "482913")
            .await
            .unwrap();

        f.manager
            .login(Credentials::new("a@example.com", "pw"))
            .await
            .unwrap();

        assert!(f.storage.value(StorageScope::Durable, "sb-auth.token").is_none());
        assert!(f.storage.value(StorageScope::Durable, keys::ROLE).is_none());
        assert_eq!(
            f.storage.value(StorageScope::ShortLived, keys::EVENT_CODE),
            Some("482913".to_string())
        );
    }

    #[tokio::test]
    async fn register_synthesizes_profile_with_chosen_role() {
        let f = fixture(InMemoryIdentityProvider::new(), InMemoryProfileStore::new());

        let identity = f
            .manager
            .register(SignUpRequest::new(
                "new@example.com",
                "pw",
                Some("Newcomer".to_string()),
                UserRole::Host,
            ))
            .await
            .unwrap();

        assert_eq!(identity.role, UserRole::Host);
        assert!(!identity.profile_complete);
        assert_eq!(f.profiles.row(&identity.id).unwrap().role, UserRole::Host);
        // The pending-role slot must not outlive registration.
        assert!(f.storage.value(StorageScope::Durable, keys::ROLE).is_none());
    }

    #[tokio::test]
    async fn register_corrects_a_trigger_assigned_default_role() {
        // Fresh rows get the attendee default from the trigger; an explicit
        // host registration must win.
        let f = fixture(InMemoryIdentityProvider::new(), InMemoryProfileStore::new());

        let identity = f
            .manager
            .register(SignUpRequest::new(
                "host@example.com",
                "pw",
                None,
                UserRole::Host,
            ))
            .await
            .unwrap();

        assert_eq!(identity.role, UserRole::Host);
    }

    #[tokio::test]
    async fn oauth_sign_in_mirrors_role_and_code_onto_the_url() {
        let f = fixture(InMemoryIdentityProvider::new(), InMemoryProfileStore::new());
        let code = EventCode::new("482913").unwrap();

        let url = f
            .manager
            .sign_in_with_provider(
                OAuthProvider::Google,
                UserRole::Attendee,
                "https://app.example.com/callback",
                Some(&code),
            )
            .await
            .unwrap();

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("role".to_string(), "attendee".to_string())));
        assert!(pairs.contains(&("eventCode".to_string(), "482913".to_string())));
        // The chosen role is also stashed for the redirect return.
        assert_eq!(
            f.storage.value(StorageScope::Durable, keys::ROLE),
            Some("attendee".to_string())
        );
    }

    #[tokio::test]
    async fn sign_out_clears_identity_and_scrubs_before_the_network_call() {
        let f = fixture(
            InMemoryIdentityProvider::new()
                .with_session(session("u1"))
                .with_failing_global_sign_out(),
            InMemoryProfileStore::new().with_row(row("u1", UserRole::Attendee)),
        );
        f.manager.initialize().await;
        f.storage
            .set(StorageScope::Durable, "sb-auth.token", "t")
            .await
            .unwrap();
        f.storage
            .set(StorageScope::Durable, keys::EVENT_CODE, "482913")
            .await
            .unwrap();

        // Global fails, local retry succeeds; the scrub must have happened
        // regardless.
        f.manager.sign_out().await.unwrap();

        assert_eq!(f.manager.snapshot().status, AuthStatus::Unauthenticated);
        assert!(f.storage.is_empty(StorageScope::Durable));
        assert!(f.storage.is_empty(StorageScope::ShortLived));
    }

    #[tokio::test]
    async fn stale_resolution_is_dropped_after_sign_out() {
        let gate = LookupGate::default();
        let f = fixture(
            InMemoryIdentityProvider::new().with_session(session("u1")),
            InMemoryProfileStore::new()
                .with_row(row("u1", UserRole::Attendee))
                .with_lookup_gate(gate.clone()),
        );

        let init = {
            let manager = f.manager.clone();
            tokio::spawn(async move { manager.initialize().await })
        };

        // The profile fetch is suspended mid-flight; sign out underneath it.
        gate.entered.notified().await;
        f.manager.sign_out().await.unwrap();
        gate.release.notify_one();
        init.await.unwrap();

        // The fetch completed under a stale epoch and must not resurrect
        // the identity.
        assert_eq!(f.manager.snapshot().status, AuthStatus::Unauthenticated);
    }

    #[tokio::test]
    async fn provider_pushed_session_triggers_resolution() {
        let f = fixture(
            InMemoryIdentityProvider::new(),
            InMemoryProfileStore::new().with_row(row("u2", UserRole::Host)),
        );
        f.manager.initialize().await;
        assert_eq!(f.manager.snapshot().status, AuthStatus::Unauthenticated);

        f.provider.push_session(session("u2"));

        let snapshot = wait_for_status(&f.manager, AuthStatus::Authenticated).await;
        assert_eq!(snapshot.identity.unwrap().id.as_str(), "u2");
    }

    #[tokio::test]
    async fn token_refresh_for_the_same_user_does_not_re_resolve() {
        let f = fixture(
            InMemoryIdentityProvider::new().with_session(session("u1")),
            InMemoryProfileStore::new().with_row(row("u1", UserRole::Attendee)),
        );
        f.manager.initialize().await;
        let lookups = f.profiles.lookup_count();

        f.provider.push_change(AuthChange::TokenRefreshed, Some(session("u1")));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(f.profiles.lookup_count(), lookups);
        assert!(f.manager.snapshot().is_authenticated());
    }

    #[tokio::test]
    async fn provider_pushed_sign_out_clears_the_identity() {
        let f = fixture(
            InMemoryIdentityProvider::new().with_session(session("u1")),
            InMemoryProfileStore::new().with_row(row("u1", UserRole::Attendee)),
        );
        f.manager.initialize().await;

        f.provider.push_change(AuthChange::SignedOut, None);

        wait_for_status(&f.manager, AuthStatus::Unauthenticated).await;
    }

    #[tokio::test]
    async fn update_identity_persists_and_republishes() {
        let f = fixture(
            InMemoryIdentityProvider::new().with_session(session("u1")),
            InMemoryProfileStore::new().with_row(row("u1", UserRole::Attendee)),
        );
        f.manager.initialize().await;

        let updated = f
            .manager
            .update_identity(IdentityPatch {
                display_name: Some("Renamed".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(updated.display_name, "Renamed");
        assert_eq!(
            f.profiles
                .row(&UserId::new("u1").unwrap())
                .unwrap()
                .display_name,
            "Renamed"
        );
        assert_eq!(
            f.manager.snapshot().identity.unwrap().display_name,
            "Renamed"
        );
    }

    #[tokio::test]
    async fn update_identity_without_session_is_rejected() {
        let f = fixture(InMemoryIdentityProvider::new(), InMemoryProfileStore::new());
        f.manager.initialize().await;

        let result = f
            .manager
            .update_identity(IdentityPatch {
                display_name: Some("x".to_string()),
                ..Default::default()
            })
            .await;

        assert_eq!(result, Err(AuthError::NotAuthenticated));
    }
}
