//! End-to-end session bootstrap scenarios over the in-memory adapters.
//!
//! Each test wires the full pipeline - manager, poller, intent store,
//! router - the way the application composes it, and drives it through one
//! of the flows: cold start, password login, registration with a queued
//! join, and an OAuth redirect return.

use std::sync::Arc;
use std::time::Duration;

use gatherly_auth::adapters::clock::ManualClock;
use gatherly_auth::adapters::memory::{
    InMemoryEventGateway, InMemoryIdentityProvider, InMemoryProfileStore, InMemoryScopedStorage,
};
use gatherly_auth::application::{
    keys, PendingIntentStore, PollOutcome, ProfileResolver, RedirectPoller, RedirectQuery,
    RedirectRouter, SessionManager,
};
use gatherly_auth::config::{BootstrapConfig, RoutesConfig};
use gatherly_auth::domain::foundation::{AuthStatus, UserId, UserRole};
use gatherly_auth::domain::intent::EventCode;
use gatherly_auth::ports::{
    Clock, ProfileRow, ScopedStorage, Session, SessionUser, SignUpRequest, StorageScope,
};

const AUTH_PREFIX: &str = "sb-auth.";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct World {
    provider: Arc<InMemoryIdentityProvider>,
    profiles: Arc<InMemoryProfileStore>,
    storage: Arc<InMemoryScopedStorage>,
    gateway: Arc<InMemoryEventGateway>,
    intents: Arc<PendingIntentStore>,
    manager: Arc<SessionManager>,
    poller: RedirectPoller,
    router: RedirectRouter,
}

fn world(
    provider: InMemoryIdentityProvider,
    profiles: InMemoryProfileStore,
    gateway: InMemoryEventGateway,
) -> World {
    init_tracing();
    let provider = Arc::new(provider);
    let profiles = Arc::new(profiles);
    let storage = Arc::new(InMemoryScopedStorage::new());
    let gateway = Arc::new(gateway);
    let clock = Arc::new(ManualClock::default());
    let config = BootstrapConfig::default();

    let intents = Arc::new(PendingIntentStore::new(
        storage.clone(),
        clock.clone(),
        config.intent_ttl(),
    ));
    let manager = SessionManager::new(
        provider.clone(),
        profiles.clone(),
        storage.clone(),
        intents.clone(),
        AUTH_PREFIX,
    );
    let poller = RedirectPoller::new(
        manager.clone(),
        provider.clone(),
        ProfileResolver::new(profiles.clone()),
        intents.clone(),
        clock,
        config,
    );
    let router = RedirectRouter::new(intents.clone(), gateway.clone(), RoutesConfig::default());

    World { provider, profiles, storage, gateway, intents, manager, poller, router }
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

fn code() -> EventCode {
    EventCode::new("482913").unwrap()
}

#[tokio::test]
async fn cold_start_without_session_settles_immediately() {
    let w = world(
        InMemoryIdentityProvider::new(),
        InMemoryProfileStore::new(),
        InMemoryEventGateway::new(),
    );

    w.manager.initialize().await;

    assert_eq!(w.manager.snapshot().status, AuthStatus::Unauthenticated);
    // No polling, no profile traffic.
    assert_eq!(w.profiles.lookup_count(), 0);
}

#[tokio::test]
async fn resolved_session_never_reaches_the_direct_fallback() {
    let w = world(
        InMemoryIdentityProvider::new().with_session(session("u1")),
        InMemoryProfileStore::new().with_row(row("u1", UserRole::Attendee)),
        InMemoryEventGateway::new(),
    );

    w.manager.initialize().await;
    let outcome = w.poller.await_identity(&RedirectQuery::none()).await;

    match outcome {
        PollOutcome::Resolved { via_fallback, .. } => assert!(!via_fallback),
        other => panic!("unexpected outcome: {:?}", other),
    }
    // get_session was called by initialize only; the fallback would have
    // called it again.
    assert_eq!(w.provider.session_query_count(), 1);
}

#[tokio::test]
async fn missing_row_degrades_to_a_best_effort_identity_exactly_once() {
    // The manager never learns about the session (no initialize), so the
    // poller exhausts its bounds and resolves directly; the row insert
    // fails on top of that, leaving an in-memory identity.
    let w = world(
        InMemoryIdentityProvider::new().with_session(session("ghost")),
        InMemoryProfileStore::new().with_failing_inserts(),
        InMemoryEventGateway::new(),
    );

    let outcome = w.poller.await_identity(&RedirectQuery::none()).await;

    let identity = match outcome {
        PollOutcome::Resolved { identity, via_fallback, .. } => {
            assert!(via_fallback);
            identity
        }
        other => panic!("unexpected outcome: {:?}", other),
    };
    assert_eq!(identity.role, UserRole::Attendee);
    assert!(!identity.persisted);
    assert_eq!(w.profiles.insert_count(), 1);
}

#[tokio::test]
async fn register_as_attendee_replays_the_queued_join() {
    let w = world(
        InMemoryIdentityProvider::new(),
        InMemoryProfileStore::new(),
        InMemoryEventGateway::new().with_event(&code()),
    );
    // The join was queued before authentication, in the short-lived scope.
    w.storage
        .set(StorageScope::ShortLived, keys::EVENT_CODE, "482913")
        .await
        .unwrap();

    w.manager
        .register(SignUpRequest::new(
            "new@example.com",
            "pw",
            Some("Newcomer".to_string()),
            UserRole::Attendee,
        ))
        .await
        .unwrap();

    let outcome = w.poller.await_identity(&RedirectQuery::none()).await;
    let target = w.router.route(&outcome, &RedirectQuery::none()).await;

    assert_eq!(target.to_string(), "route:/attendee?joined=true");
    assert_eq!(w.gateway.joins().len(), 1);
    // The profile row carries the chosen role.
    let identity = outcome.identity().unwrap();
    assert_eq!(w.profiles.row(&identity.id).unwrap().role, UserRole::Attendee);
    // The code is gone from both scopes.
    assert!(w.storage.value(StorageScope::ShortLived, keys::EVENT_CODE).is_none());
    assert!(w.storage.value(StorageScope::Durable, keys::EVENT_CODE).is_none());
}

#[tokio::test]
async fn oauth_host_with_interrupted_purchase_resumes_it() {
    let w = world(
        InMemoryIdentityProvider::new(),
        InMemoryProfileStore::new().with_row(row("host1", UserRole::Host)),
        InMemoryEventGateway::new(),
    );
    w.intents
        .stash_resume_purchase("/buy-tickets/expo42")
        .await
        .unwrap();

    // The provider finishes processing the redirect tokens and pushes the
    // session while the poller is already waiting.
    w.provider.push_session(session("host1"));

    let outcome = w.poller.await_identity(&RedirectQuery::none()).await;
    let target = w.router.route(&outcome, &RedirectQuery::none()).await;

    // Resume-purchase wins regardless of role.
    assert_eq!(target.to_string(), "route:/buy-tickets/expo42");
    assert!(w.storage.is_empty(StorageScope::Durable));
}

#[tokio::test]
async fn oauth_return_with_only_query_params_still_joins() {
    // Every storage scope was dropped along the redirect chain; the
    // mirrored query parameters are all that is left.
    let w = world(
        InMemoryIdentityProvider::new(),
        InMemoryProfileStore::new(),
        InMemoryEventGateway::new().with_event(&code()),
    );
    w.provider.push_session(session("fresh"));

    let query = RedirectQuery {
        role: Some(UserRole::Attendee),
        event_code: Some(code()),
    };
    let outcome = w.poller.await_identity(&query).await;
    let target = w.router.route(&outcome, &query).await;

    assert_eq!(target.to_string(), "route:/attendee?joined=true");
}

#[tokio::test]
async fn pending_intent_is_consumed_exactly_once_across_all_sources() {
    let w = world(
        InMemoryIdentityProvider::new(),
        InMemoryProfileStore::new().with_row(row("u1", UserRole::Attendee)),
        InMemoryEventGateway::new().with_event(&code()),
    );
    w.intents.stash_join_intent(&code()).await.unwrap();
    w.provider.push_session(session("u1"));

    let outcome = w.poller.await_identity(&RedirectQuery::none()).await;
    let first = w.router.route(&outcome, &RedirectQuery::none()).await;
    let second = w.router.route(&outcome, &RedirectQuery::none()).await;

    assert_eq!(first.to_string(), "route:/attendee?joined=true");
    // A later navigation finds no intent anywhere and falls back to the
    // role default.
    assert_eq!(second.to_string(), "route:/attendee");
    assert_eq!(w.gateway.joins().len(), 1);
}

#[tokio::test]
async fn sign_out_mid_resolution_never_resurrects_the_identity() {
    use gatherly_auth::adapters::memory::LookupGate;

    let gate = LookupGate::default();
    let w = world(
        InMemoryIdentityProvider::new().with_session(session("u1")),
        InMemoryProfileStore::new()
            .with_row(row("u1", UserRole::Attendee))
            .with_lookup_gate(gate.clone()),
        InMemoryEventGateway::new(),
    );

    let init = {
        let manager = w.manager.clone();
        tokio::spawn(async move { manager.initialize().await })
    };

    gate.entered.notified().await;
    w.manager.sign_out().await.unwrap();
    gate.release.notify_one();
    init.await.unwrap();

    assert_eq!(w.manager.snapshot().status, AuthStatus::Unauthenticated);

    // And the poller sees the terminal negative, not a hang.
    let outcome = w.poller.await_identity(&RedirectQuery::none()).await;
    assert_eq!(outcome, PollOutcome::Unauthenticated);
    let target = w.router.route(&outcome, &RedirectQuery::none()).await;
    assert_eq!(target.to_string(), "unauthenticated");
}

#[tokio::test]
async fn sign_out_scrubs_every_cached_artifact() {
    let w = world(
        InMemoryIdentityProvider::new().with_session(session("u1")),
        InMemoryProfileStore::new().with_row(row("u1", UserRole::Host)),
        InMemoryEventGateway::new(),
    );
    w.manager.initialize().await;
    w.storage
        .set(StorageScope::Durable, "sb-auth.token", "jwt")
        .await
        .unwrap();
    w.storage
        .set(StorageScope::ShortLived, "sb-auth.token", "jwt")
        .await
        .unwrap();
    w.intents.stash_join_intent(&code()).await.unwrap();
    w.intents.stash_role(UserRole::Host).await.unwrap();

    w.manager.sign_out().await.unwrap();

    assert!(w.storage.is_empty(StorageScope::ShortLived));
    assert!(w.storage.is_empty(StorageScope::Durable));
}

#[tokio::test]
async fn stale_companion_payload_is_ignored_by_the_router() {
    let w = world(
        InMemoryIdentityProvider::new(),
        InMemoryProfileStore::new().with_row(row("u1", UserRole::Attendee)),
        InMemoryEventGateway::new().with_event(&code()),
    );
    // A payload captured 11 minutes ago is all that survived the redirect.
    let captured = ManualClock::default().now().minus(Duration::from_secs(11 * 60));
    let payload = gatherly_auth::domain::intent::EventCodePayload::new(&code(), &captured);
    w.storage
        .set(
            StorageScope::Durable,
            keys::EVENT_PAYLOAD,
            &serde_json::to_string(&payload).unwrap(),
        )
        .await
        .unwrap();

    w.provider.push_session(session("u1"));
    let outcome = w.poller.await_identity(&RedirectQuery::none()).await;
    let target = w.router.route(&outcome, &RedirectQuery::none()).await;

    assert_eq!(target.to_string(), "route:/attendee");
    assert!(w.gateway.joins().is_empty());
}

#[tokio::test]
async fn second_user_on_the_same_device_does_not_inherit_pending_role() {
    let w = world(
        InMemoryIdentityProvider::new().with_account("b@example.com", "pw", user("u2")),
        InMemoryProfileStore::new(),
        InMemoryEventGateway::new(),
    );
    // Leftover from a previous host's unfinished OAuth flow.
    w.intents.stash_role(UserRole::Host).await.unwrap();

    let identity = w
        .manager
        .login(gatherly_auth::ports::Credentials::new("b@example.com", "pw"))
        .await
        .unwrap();

    // The new user's synthesized profile falls back to attendee instead of
    // picking up the stale host selection.
    assert_eq!(identity.role, UserRole::Attendee);
}
