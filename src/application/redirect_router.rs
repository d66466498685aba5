//! Redirect Router - one navigation target out of many competing inputs.
//!
//! Consumes the poll outcome and the pending intent (exactly once) and
//! applies the fixed precedence: resume-purchase beats join-event beats the
//! role default. The one case that leaves the intent untouched is a
//! negative resolution - the user never got to act on it and may retry
//! login.

use std::fmt;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::application::intent_store::{PendingIntentStore, RedirectQuery};
use crate::application::redirect_poller::PollOutcome;
use crate::config::RoutesConfig;
use crate::domain::foundation::{ResolvedIdentity, UserRole};
use crate::domain::intent::IntentAction;
use crate::ports::EventGateway;

/// Where the application should navigate next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectTarget {
    /// To the unauthenticated entry point, optionally tagged with what
    /// went wrong.
    Unauthenticated { error: Option<String> },
    /// To an application route; `joined` is set when a join was attempted
    /// as part of routing.
    Route {
        path: String,
        joined: Option<bool>,
    },
}

impl RedirectTarget {
    fn route(path: impl Into<String>) -> Self {
        RedirectTarget::Route {
            path: path.into(),
            joined: None,
        }
    }
}

impl fmt::Display for RedirectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RedirectTarget::Unauthenticated { error: None } => write!(f, "unauthenticated"),
            RedirectTarget::Unauthenticated { error: Some(tag) } => {
                write!(f, "unauthenticated?error={}", tag)
            }
            RedirectTarget::Route { path, joined: None } => write!(f, "route:{}", path),
            RedirectTarget::Route { path, joined: Some(joined) } => {
                write!(f, "route:{}?joined={}", path, joined)
            }
        }
    }
}

/// Computes exactly one navigation target per resolution.
pub struct RedirectRouter {
    intents: Arc<PendingIntentStore>,
    events: Arc<dyn EventGateway>,
    routes: RoutesConfig,
}

impl RedirectRouter {
    pub fn new(
        intents: Arc<PendingIntentStore>,
        events: Arc<dyn EventGateway>,
        routes: RoutesConfig,
    ) -> Self {
        Self { intents, events, routes }
    }

    /// Routes a completed resolution.
    ///
    /// Precedence, highest first: resume-purchase path (any role), join
    /// intent (attendees only), role default. A negative resolution routes
    /// to the unauthenticated entry point and deliberately leaves the
    /// intent un-consumed.
    #[instrument(skip_all)]
    pub async fn route(&self, outcome: &PollOutcome, query: &RedirectQuery) -> RedirectTarget {
        let identity = match outcome {
            PollOutcome::Resolved { identity, .. } => identity,
            PollOutcome::Unauthenticated => {
                return RedirectTarget::Unauthenticated { error: None };
            }
            PollOutcome::Failed(e) => {
                warn!(error = %e, "resolution failed, routing to sign-in");
                // A failure that just means "sign in again" needs no error
                // tag; anything else is surfaced so the entry point can
                // explain itself.
                let error = if e.requires_reauthentication() {
                    None
                } else {
                    Some("resolution_failed".to_string())
                };
                return RedirectTarget::Unauthenticated { error };
            }
        };

        let intent = match self.intents.take(query).await {
            Ok(intent) => intent,
            Err(e) => {
                // Storage trouble degrades to the role default; it must not
                // block a signed-in user from landing anywhere.
                warn!(error = %e, "pending intent read failed");
                None
            }
        };

        let target = match intent {
            Some(intent) => match intent.action {
                IntentAction::ResumePurchase { path } => {
                    info!(source = %intent.source, "resuming interrupted purchase");
                    RedirectTarget::route(path)
                }
                IntentAction::JoinEvent { code } if identity.role == UserRole::Attendee => {
                    let joined = match self.events.join_by_code(&identity.id, &code).await {
                        Ok(()) => true,
                        Err(e) => {
                            // Recoverable: the user can retry the join from
                            // the app; identity resolution already succeeded.
                            warn!(code = %code, error = %e, "deferred join failed");
                            false
                        }
                    };
                    RedirectTarget::Route {
                        path: self.routes.attendee_home.clone(),
                        joined: Some(joined),
                    }
                }
                // A host with a leftover join intent: not valid for the
                // role, treated as no intent. It is already erased.
                IntentAction::JoinEvent { code } => {
                    info!(code = %code, "discarding join intent for host identity");
                    self.default_for(identity)
                }
            },
            None => self.default_for(identity),
        };

        info!(target = %target, "redirect computed");
        target
    }

    fn default_for(&self, identity: &ResolvedIdentity) -> RedirectTarget {
        match identity.role {
            UserRole::Host => RedirectTarget::route(self.routes.admin_home.clone()),
            UserRole::Attendee => RedirectTarget::route(self.routes.attendee_home.clone()),
        }
    }
}
