//! Redirect poller - bounded waiting for a just-completed redirect.
//!
//! When the browser returns from an OAuth provider, the session manager may
//! not have observed the new session yet: the provider is still processing
//! redirect tokens and there is no event to subscribe to for "the profile
//! row now exists". The poller re-checks the manager's snapshot on a gentle
//! linear ramp until it resolves, reports a definitive no-session, or both
//! bounds run out - in which case it queries the collaborators directly,
//! once, bypassing the manager.
//!
//! Modeled as an explicit state machine over `(attempt, deadline, delay fn)`
//! so a manual clock can drive it through all of its paths.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::application::intent_store::{PendingIntentStore, RedirectQuery};
use crate::application::profile_resolver::ProfileResolver;
use crate::application::session_manager::SessionManager;
use crate::config::BootstrapConfig;
use crate::domain::foundation::{AuthError, AuthStatus, ResolvedIdentity, Timestamp};
use crate::ports::{Clock, IdentityProvider};

/// One iteration of the bounded loop; drives the bound checks and the
/// tracing fields, nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PollAttempt {
    attempt: u32,
    elapsed: Duration,
}

/// Terminal outcome of a redirect-completion wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// An identity resolved, through the manager or the direct fallback.
    Resolved {
        identity: ResolvedIdentity,
        /// Attempts consumed before resolution.
        attempts: u32,
        /// True when the bounds ran out and the direct query produced this.
        via_fallback: bool,
    },
    /// The definitive no-session answer; not a timeout.
    Unauthenticated,
    /// Neither an identity nor a definitive negative within the bounds.
    Failed(AuthError),
}

impl PollOutcome {
    /// Returns the resolved identity, if any.
    pub fn identity(&self) -> Option<&ResolvedIdentity> {
        match self {
            PollOutcome::Resolved { identity, .. } => Some(identity),
            _ => None,
        }
    }
}

/// Bounded polling wrapper over the session manager.
pub struct RedirectPoller {
    manager: Arc<SessionManager>,
    provider: Arc<dyn IdentityProvider>,
    resolver: ProfileResolver,
    intents: Arc<PendingIntentStore>,
    clock: Arc<dyn Clock>,
    config: BootstrapConfig,
}

impl RedirectPoller {
    pub fn new(
        manager: Arc<SessionManager>,
        provider: Arc<dyn IdentityProvider>,
        resolver: ProfileResolver,
        intents: Arc<PendingIntentStore>,
        clock: Arc<dyn Clock>,
        config: BootstrapConfig,
    ) -> Self {
        Self { manager, provider, resolver, intents, clock, config }
    }

    /// Waits for the manager to reflect the completed redirect.
    ///
    /// Stops immediately on a resolved identity or a definitive
    /// no-session; otherwise keeps checking until `max_poll_attempts` AND
    /// the wall-clock deadline are the only things left, then falls back to
    /// one direct collaborator query. Never hangs: every path out of here
    /// is bounded.
    #[instrument(skip_all)]
    pub async fn await_identity(&self, query: &RedirectQuery) -> PollOutcome {
        let started = self.clock.now();
        let mut attempts = 0;

        loop {
            let state = PollAttempt {
                attempt: attempts,
                elapsed: self.clock.now().duration_since(&started),
            };

            if let Some(outcome) = self.check_manager(state) {
                return outcome;
            }

            if attempts >= self.config.max_poll_attempts
                || state.elapsed >= self.config.poll_deadline()
            {
                debug!(
                    attempt = state.attempt,
                    elapsed_ms = state.elapsed.as_millis() as u64,
                    "poll bounds reached"
                );
                break;
            }

            self.clock.sleep(self.config.poll_delay_for(attempts)).await;
            attempts += 1;
        }

        self.direct_fallback(query, attempts, started).await
    }

    /// One snapshot check; `None` means keep polling.
    fn check_manager(&self, state: PollAttempt) -> Option<PollOutcome> {
        let snapshot = self.manager.snapshot();
        match snapshot.status {
            AuthStatus::Authenticated => {
                let identity = snapshot.identity?;
                info!(
                    attempt = state.attempt,
                    elapsed_ms = state.elapsed.as_millis() as u64,
                    "manager resolved during poll"
                );
                Some(PollOutcome::Resolved {
                    identity,
                    attempts: state.attempt,
                    via_fallback: false,
                })
            }
            AuthStatus::Unauthenticated => {
                debug!(attempt = state.attempt, "manager reports no session");
                Some(PollOutcome::Unauthenticated)
            }
            AuthStatus::Loading => None,
        }
    }

    /// Both bounds exhausted: ask the collaborators directly, once.
    ///
    /// Tolerates profile-row absence the same way the manager's resolution
    /// does, through synthesize-and-insert.
    async fn direct_fallback(
        &self,
        query: &RedirectQuery,
        attempts: u32,
        started: Timestamp,
    ) -> PollOutcome {
        let elapsed_ms = self.clock.now().duration_since(&started).as_millis() as u64;
        warn!(attempts, elapsed_ms, "poll bounds exhausted, querying provider directly");

        let session = match self.provider.get_session().await {
            Ok(Some(session)) => session,
            Ok(None) => return PollOutcome::Unauthenticated,
            Err(e) => return PollOutcome::Failed(e),
        };

        let requested = match self.intents.take_role().await {
            Ok(role) => role.or(query.role),
            Err(e) => {
                warn!(error = %e, "could not read pending role in fallback");
                query.role
            }
        };

        match self.resolver.resolve(&session, requested).await {
            Ok(identity) => PollOutcome::Resolved {
                identity,
                attempts,
                via_fallback: true,
            },
            Err(e) => PollOutcome::Failed(e),
        }
    }
}
