//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Provider API URL must use HTTPS in production")]
    ApiUrlMustBeHttps,

    #[error("Provider API URL is not a valid URL")]
    InvalidApiUrl,

    #[error("Poll attempt count must be at least 1")]
    InvalidPollAttempts,

    #[error("Poll deadline must cover at least one base delay")]
    InvalidPollDeadline,

    #[error("Poll delay cap must not be below the base delay")]
    InvalidDelayRamp,

    #[error("Pending intent TTL must be at least 1 second")]
    InvalidIntentTtl,

    #[error("Route '{0}' must be an absolute path")]
    RouteNotAbsolute(&'static str),
}
