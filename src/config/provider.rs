//! Identity provider configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;
use super::Environment;

/// Identity provider configuration (REST adapters)
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of the provider project (e.g., `https://xyz.provider.co`)
    pub api_url: String,

    /// Publishable anonymous API key
    pub anon_key: SecretString,

    /// Prefix under which the provider namespaces its auth-token keys in
    /// client storage. Scrubbed wholesale on sign-out.
    #[serde(default = "default_auth_key_prefix")]
    pub auth_key_prefix: String,
}

impl ProviderConfig {
    /// Validate provider configuration
    ///
    /// In production, requires HTTPS for the API URL.
    /// In development, allows localhost with HTTP/HTTPS.
    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        if self.api_url.is_empty() {
            return Err(ValidationError::MissingRequired("PROVIDER_API_URL"));
        }
        if url::Url::parse(&self.api_url).is_err() {
            return Err(ValidationError::InvalidApiUrl);
        }
        if self.anon_key.expose_secret().is_empty() {
            return Err(ValidationError::MissingRequired("PROVIDER_ANON_KEY"));
        }
        if self.auth_key_prefix.is_empty() {
            return Err(ValidationError::MissingRequired("PROVIDER_AUTH_KEY_PREFIX"));
        }

        if *environment == Environment::Production && !self.api_url.starts_with("https://") {
            return Err(ValidationError::ApiUrlMustBeHttps);
        }

        Ok(())
    }
}

fn default_auth_key_prefix() -> String {
    "sb-auth.".to_string()
}
