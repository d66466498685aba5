//! Profile resolution - turning a raw session into a resolved identity.
//!
//! The profile row is created by a backend trigger with unknown delay, so a
//! lookup right after sign-up races it. This resolver is the single-shot
//! half of the story: look the row up once, synthesize-and-insert when it is
//! missing, and degrade to an in-memory identity when even the insert fails.
//! The bounded retrying for the redirect race lives in the poller, not here.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::foundation::{AuthError, ResolvedIdentity, UserRole};
use crate::ports::{ProfilePatch, ProfileRow, ProfileStore, ProfileStoreError, Session};

/// Resolves sessions to identities against the profile store.
pub struct ProfileResolver {
    profiles: Arc<dyn ProfileStore>,
}

impl ProfileResolver {
    pub fn new(profiles: Arc<dyn ProfileStore>) -> Self {
        Self { profiles }
    }

    /// Resolves the session's user to a [`ResolvedIdentity`].
    ///
    /// `requested_role` is the role the user chose before the redirect,
    /// taken from the pending-role slot by the caller. When the trigger
    /// already created a row with a different role, the row is corrected to
    /// the requested one.
    ///
    /// # Errors
    ///
    /// Only a transient lookup failure is an error; a missing row is the
    /// expected race and resolves through synthesize-and-insert.
    pub async fn resolve(
        &self,
        session: &Session,
        requested_role: Option<UserRole>,
    ) -> Result<ResolvedIdentity, AuthError> {
        let user = &session.user;

        match self.profiles.get_by_id(&user.id).await {
            Ok(Some(row)) => Ok(self.from_row(row, requested_role).await),
            Ok(None) => Ok(self.synthesize_and_insert(session, requested_role).await),
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "profile lookup failed");
                Err(AuthError::service_unavailable(e.to_string()))
            }
        }
    }

    /// Maps an existing row, correcting its role when the user asked for a
    /// different one than the creation trigger assigned.
    async fn from_row(&self, row: ProfileRow, requested_role: Option<UserRole>) -> ResolvedIdentity {
        let role = match requested_role {
            Some(requested) if requested != row.role => {
                match self
                    .profiles
                    .update(&row.id, ProfilePatch::role(requested))
                    .await
                {
                    Ok(()) => {
                        info!(user_id = %row.id, role = %requested, "corrected trigger-assigned role");
                    }
                    Err(e) => {
                        warn!(user_id = %row.id, error = %e, "role correction failed");
                    }
                }
                // The requested role wins either way; the patch retries on
                // the next resolution if it did not land.
                requested
            }
            _ => row.role,
        };

        ResolvedIdentity {
            id: row.id,
            display_name: row.display_name,
            email: row.email,
            role,
            profile_complete: true,
            persisted: true,
        }
    }

    /// First-time user: build a row from session metadata and insert it.
    ///
    /// Insert failure is non-fatal - the caller still gets a usable
    /// identity, flagged unpersisted.
    async fn synthesize_and_insert(
        &self,
        session: &Session,
        requested_role: Option<UserRole>,
    ) -> ResolvedIdentity {
        let role = requested_role.unwrap_or(UserRole::Attendee);
        let row = ProfileRow::synthesized(&session.user, role);

        let persisted = match self.profiles.insert(&row).await {
            Ok(()) => {
                debug!(user_id = %row.id, role = %role, "synthesized profile row");
                true
            }
            Err(ProfileStoreError::AlreadyExists(_)) => {
                // The creation trigger landed between lookup and insert;
                // its row is authoritative now.
                if let Ok(Some(existing)) = self.profiles.get_by_id(&row.id).await {
                    return self.from_row(existing, requested_role).await;
                }
                true
            }
            Err(e) => {
                warn!(user_id = %row.id, error = %e, "profile insert failed, resolving in memory");
                false
            }
        };

        ResolvedIdentity {
            id: row.id,
            display_name: row.display_name,
            email: row.email,
            role,
            profile_complete: false,
            persisted,
        }
    }
}
