//! Navigation target configuration

use serde::Deserialize;

use super::error::ValidationError;

/// Routes the redirect router can resolve to
#[derive(Debug, Clone, Deserialize)]
pub struct RoutesConfig {
    /// Landing page for hosts
    #[serde(default = "default_admin_home")]
    pub admin_home: String,

    /// Landing page for attendees
    #[serde(default = "default_attendee_home")]
    pub attendee_home: String,

    /// Unauthenticated entry point
    #[serde(default = "default_sign_in")]
    pub sign_in: String,
}

impl RoutesConfig {
    /// Validate route configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.admin_home.starts_with('/') {
            return Err(ValidationError::RouteNotAbsolute("admin_home"));
        }
        if !self.attendee_home.starts_with('/') {
            return Err(ValidationError::RouteNotAbsolute("attendee_home"));
        }
        if !self.sign_in.starts_with('/') {
            return Err(ValidationError::RouteNotAbsolute("sign_in"));
        }
        Ok(())
    }
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            admin_home: default_admin_home(),
            attendee_home: default_attendee_home(),
            sign_in: default_sign_in(),
        }
    }
}

fn default_admin_home() -> String {
    "/admin".to_string()
}

fn default_attendee_home() -> String {
    "/attendee".to_string()
}

fn default_sign_in() -> String {
    "/login".to_string()
}
