//! REST identity provider adapter.
//!
//! Talks to a GoTrue-style auth API: password grant and signup under
//! `/auth/v1`, an authorize URL for federated flows, and token-bearing
//! logout. The REST surface has no push channel, so change events are
//! emitted for the transitions this client itself performs; a deployment
//! that needs cross-tab pushes wires a different adapter.

use std::sync::RwLock;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::debug;
use url::Url;

use crate::config::ProviderConfig;
use crate::domain::foundation::{AuthError, UserId};
use crate::ports::{
    AuthChange, AuthChangeEvent, Credentials, IdentityProvider, OAuthRequest, Session,
    SessionUser, SignOutScope, SignUpRequest,
};

/// Identity provider over a GoTrue-style REST API.
pub struct RestIdentityProvider {
    config: ProviderConfig,
    client: Client,
    session: RwLock<Option<Session>>,
    subscribers: RwLock<Vec<mpsc::UnboundedSender<AuthChangeEvent>>>,
}

/// Token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    user: UserDto,
}

#[derive(Debug, Deserialize)]
struct UserDto {
    id: String,
    email: String,
    #[serde(default)]
    user_metadata: UserMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct UserMetadata {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
}

/// Error payload the auth API returns alongside non-2xx statuses.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
}

impl ErrorBody {
    fn message(&self) -> String {
        self.error_description
            .clone()
            .or_else(|| self.msg.clone())
            .unwrap_or_else(|| "unknown provider error".to_string())
    }
}

impl TokenResponse {
    fn into_session(self) -> Result<Session, AuthError> {
        let user = self.user.into_session_user()?;
        Ok(Session {
            access_token: self.access_token,
            user,
        })
    }
}

impl UserDto {
    fn into_session_user(self) -> Result<SessionUser, AuthError> {
        Ok(SessionUser {
            id: UserId::new(self.id)?,
            email: self.email,
            display_name: self
                .user_metadata
                .display_name
                .or(self.user_metadata.full_name),
            avatar_url: self.user_metadata.avatar_url,
        })
    }
}

impl RestIdentityProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            client: Client::new(),
            session: RwLock::new(None),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    fn auth_url(&self, path: &str) -> String {
        format!(
            "{}/auth/v1/{}",
            self.config.api_url.trim_end_matches('/'),
            path
        )
    }

    fn anon_key(&self) -> &str {
        self.config.anon_key.expose_secret()
    }

    fn emit(&self, change: AuthChange, session: Option<Session>) {
        let mut subscribers = self.subscribers.write().unwrap();
        subscribers.retain(|tx| tx.send((change, session.clone())).is_ok());
    }

    fn store_session(&self, session: Session) -> Session {
        *self.session.write().unwrap() = Some(session.clone());
        self.emit(AuthChange::SignedIn, Some(session.clone()));
        session
    }

    fn current_token(&self) -> Option<String> {
        self.session
            .read()
            .unwrap()
            .as_ref()
            .map(|s| s.access_token.clone())
    }

    async fn read_error(response: reqwest::Response) -> (StatusCode, ErrorBody) {
        let status = response.status();
        let body = response.json::<ErrorBody>().await.unwrap_or_default();
        (status, body)
    }

    fn map_failure(status: StatusCode, body: &ErrorBody) -> AuthError {
        if status.is_server_error() {
            AuthError::service_unavailable(body.message())
        } else {
            AuthError::ProviderRejected(body.message())
        }
    }
}

#[async_trait]
impl IdentityProvider for RestIdentityProvider {
    async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        Ok(self.session.read().unwrap().clone())
    }

    async fn get_user(&self) -> Result<Option<SessionUser>, AuthError> {
        let Some(token) = self.current_token() else {
            return Ok(None);
        };

        let response = self
            .client
            .get(self.auth_url("user"))
            .header("apikey", self.anon_key())
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| AuthError::service_unavailable(e.to_string()))?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Ok(None);
        }
        if !response.status().is_success() {
            let (status, body) = Self::read_error(response).await;
            return Err(Self::map_failure(status, &body));
        }

        let dto = response
            .json::<UserDto>()
            .await
            .map_err(|e| AuthError::service_unavailable(e.to_string()))?;
        Ok(Some(dto.into_session_user()?))
    }

    async fn sign_in_with_password(&self, credentials: Credentials) -> Result<Session, AuthError> {
        let response = self
            .client
            .post(self.auth_url("token"))
            .query(&[("grant_type", "password")])
            .header("apikey", self.anon_key())
            .json(&serde_json::json!({
                "email": credentials.email,
                "password": credentials.password.expose_secret(),
            }))
            .send()
            .await
            .map_err(|e| AuthError::service_unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let (status, body) = Self::read_error(response).await;
            // The password grant answers 400 for a bad pair.
            if status == StatusCode::BAD_REQUEST {
                return Err(AuthError::InvalidCredentials);
            }
            return Err(Self::map_failure(status, &body));
        }

        let token = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| AuthError::service_unavailable(e.to_string()))?;
        Ok(self.store_session(token.into_session()?))
    }

    async fn sign_up(&self, request: SignUpRequest) -> Result<Session, AuthError> {
        let response = self
            .client
            .post(self.auth_url("signup"))
            .header("apikey", self.anon_key())
            .json(&serde_json::json!({
                "email": request.email,
                "password": request.password.expose_secret(),
                "data": {
                    "display_name": request.display_name,
                    "role": request.role.as_str(),
                },
            }))
            .send()
            .await
            .map_err(|e| AuthError::service_unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let (status, body) = Self::read_error(response).await;
            if status == StatusCode::UNPROCESSABLE_ENTITY
                || body.message().to_lowercase().contains("already registered")
            {
                return Err(AuthError::EmailTaken);
            }
            return Err(Self::map_failure(status, &body));
        }

        let token = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| AuthError::service_unavailable(e.to_string()))?;
        Ok(self.store_session(token.into_session()?))
    }

    async fn sign_in_with_oauth(&self, request: OAuthRequest) -> Result<Url, AuthError> {
        let mut url = Url::parse(&self.auth_url("authorize"))
            .map_err(|e| AuthError::service_unavailable(e.to_string()))?;

        // The extra pairs ride on the redirect target so they survive the
        // round trip through the federated provider.
        let mut redirect = Url::parse(&request.redirect_url)
            .map_err(|e| AuthError::ProviderRejected(format!("bad redirect url: {}", e)))?;
        for (key, value) in &request.query {
            redirect.query_pairs_mut().append_pair(key, value);
        }

        url.query_pairs_mut()
            .append_pair("provider", request.provider.as_str())
            .append_pair("redirect_to", redirect.as_str());

        debug!(provider = request.provider.as_str(), "built authorize url");
        Ok(url)
    }

    async fn sign_out(&self, scope: SignOutScope) -> Result<(), AuthError> {
        let Some(token) = self.current_token() else {
            // Nothing to revoke; local state is already clear.
            return Ok(());
        };

        let response = self
            .client
            .post(self.auth_url("logout"))
            .query(&[("scope", scope.as_str())])
            .header("apikey", self.anon_key())
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| AuthError::service_unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let (status, body) = Self::read_error(response).await;
            return Err(Self::map_failure(status, &body));
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
