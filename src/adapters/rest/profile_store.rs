//! REST profile store adapter.
//!
//! Reads and writes the `profiles` table through a PostgREST-style API:
//! filtered GETs, POST inserts, PATCH updates, all authenticated with the
//! project's anonymous key. Row-level security on the backend decides what
//! the key may touch; this adapter only maps shapes and statuses.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::domain::foundation::UserId;
use crate::ports::{ProfilePatch, ProfileRow, ProfileStore, ProfileStoreError};

const TABLE: &str = "profiles";

/// Profile store over a PostgREST-style API.
pub struct RestProfileStore {
    config: ProviderConfig,
    client: Client,
}

impl RestProfileStore {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    fn table_url(&self) -> String {
        format!(
            "{}/rest/v1/{}",
            self.config.api_url.trim_end_matches('/'),
            TABLE
        )
    }

    fn anon_key(&self) -> &str {
        self.config.anon_key.expose_secret()
    }

    fn id_filter(id: &UserId) -> String {
        format!("eq.{}", id)
    }

    async fn failure(response: reqwest::Response) -> ProfileStoreError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        ProfileStoreError::Unavailable(format!("{}: {}", status, body))
    }
}

#[async_trait]
impl ProfileStore for RestProfileStore {
    async fn get_by_id(&self, id: &UserId) -> Result<Option<ProfileRow>, ProfileStoreError> {
        let response = self
            .client
            .get(self.table_url())
            .query(&[
                ("id", Self::id_filter(id).as_str()),
                ("select", "*"),
                ("limit", "1"),
            ])
            .header("apikey", self.anon_key())
            .bearer_auth(self.anon_key())
            .send()
            .await
            .map_err(|e| ProfileStoreError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }

        let mut rows = response
            .json::<Vec<ProfileRow>>()
            .await
            .map_err(|e| ProfileStoreError::Malformed(e.to_string()))?;

        debug!(user_id = %id, found = !rows.is_empty(), "profile lookup");
        Ok(rows.pop())
    }

    async fn insert(&self, row: &ProfileRow) -> Result<(), ProfileStoreError> {
        let response = self
            .client
            .post(self.table_url())
            .header("apikey", self.anon_key())
            .bearer_auth(self.anon_key())
            .header("Prefer", "return=minimal")
            .json(row)
            .send()
            .await
            .map_err(|e| ProfileStoreError::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::CONFLICT => Err(ProfileStoreError::AlreadyExists(row.id.clone())),
            status if status.is_success() => Ok(()),
            _ => Err(Self::failure(response).await),
        }
    }

    async fn update(&self, id: &UserId, patch: ProfilePatch) -> Result<(), ProfileStoreError> {
        let response = self
            .client
            .patch(self.table_url())
            .query(&[("id", Self::id_filter(id).as_str())])
            .header("apikey", self.anon_key())
            .bearer_auth(self.anon_key())
            // Representation tells us whether the filter matched anything.
            .header("Prefer", "return=representation")
            .json(&patch)
            .send()
            .await
            .map_err(|e| ProfileStoreError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }

        let rows = response
            .json::<Vec<ProfileRow>>()
            .await
            .map_err(|e| ProfileStoreError::Malformed(e.to_string()))?;

        if rows.is_empty() {
            return Err(ProfileStoreError::NotFound(id.clone()));
        }
        Ok(())
    }
}
