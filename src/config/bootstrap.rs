//! Session bootstrap configuration
//!
//! Bounds for the redirect-completion polling loop and the pending-intent
//! staleness window. The defaults are the observed production values; they
//! are configuration rather than constants so deployments can tune them.

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Polling and staleness bounds for session bootstrap
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapConfig {
    /// Maximum number of poll attempts before the direct fallback
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,

    /// Absolute wall-clock ceiling for the polling loop, in milliseconds
    #[serde(default = "default_poll_deadline_ms")]
    pub poll_deadline_ms: u64,

    /// Base per-attempt delay in milliseconds
    #[serde(default = "default_poll_base_delay_ms")]
    pub poll_base_delay_ms: u64,

    /// Per-attempt delay increment in milliseconds
    #[serde(default = "default_poll_delay_step_ms")]
    pub poll_delay_step_ms: u64,

    /// Upper bound on the per-attempt delay, in milliseconds
    #[serde(default = "default_poll_delay_cap_ms")]
    pub poll_delay_cap_ms: u64,

    /// How long a captured pending intent stays valid, in seconds
    #[serde(default = "default_intent_ttl_secs")]
    pub intent_ttl_secs: u64,
}

impl BootstrapConfig {
    /// Delay before the next attempt, given the 0-based attempt index.
    ///
    /// A gentle linear ramp: `base + attempt * step`, capped. Expected
    /// resolution time is sub-second; the ramp only matters for the
    /// pathological tail, so exponential growth would be overkill.
    pub fn poll_delay_for(&self, attempt: u32) -> Duration {
        let ms = self
            .poll_base_delay_ms
            .saturating_add(u64::from(attempt).saturating_mul(self.poll_delay_step_ms))
            .min(self.poll_delay_cap_ms);
        Duration::from_millis(ms)
    }

    /// Wall-clock ceiling as a Duration.
    pub fn poll_deadline(&self) -> Duration {
        Duration::from_millis(self.poll_deadline_ms)
    }

    /// Intent staleness window as a Duration.
    pub fn intent_ttl(&self) -> Duration {
        Duration::from_secs(self.intent_ttl_secs)
    }

    /// Validate bootstrap configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_poll_attempts == 0 {
            return Err(ValidationError::InvalidPollAttempts);
        }
        if self.poll_deadline_ms < self.poll_base_delay_ms {
            return Err(ValidationError::InvalidPollDeadline);
        }
        if self.poll_delay_cap_ms < self.poll_base_delay_ms {
            return Err(ValidationError::InvalidDelayRamp);
        }
        if self.intent_ttl_secs == 0 {
            return Err(ValidationError::InvalidIntentTtl);
        }
        Ok(())
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            max_poll_attempts: default_max_poll_attempts(),
            poll_deadline_ms: default_poll_deadline_ms(),
            poll_base_delay_ms: default_poll_base_delay_ms(),
            poll_delay_step_ms: default_poll_delay_step_ms(),
            poll_delay_cap_ms: default_poll_delay_cap_ms(),
            intent_ttl_secs: default_intent_ttl_secs(),
        }
    }
}

fn default_max_poll_attempts() -> u32 {
    50
}

fn default_poll_deadline_ms() -> u64 {
    10_000
}

fn default_poll_base_delay_ms() -> u64 {
    100
}

fn default_poll_delay_step_ms() -> u64 {
    10
}

fn default_poll_delay_cap_ms() -> u64 {
    500
}

fn default_intent_ttl_secs() -> u64 {
    600
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn defaults_match_observed_production_values() {
        let config = BootstrapConfig::default();
        assert_eq!(config.max_poll_attempts, 50);
        assert_eq!(config.poll_deadline(), Duration::from_secs(10));
        assert_eq!(config.intent_ttl(), Duration::from_secs(600));
    }

    #[test]
    fn delay_ramp_starts_at_base_and_caps() {
        let config = BootstrapConfig::default();
        assert_eq!(config.poll_delay_for(0), Duration::from_millis(100));
        assert_eq!(config.poll_delay_for(1), Duration::from_millis(110));
        assert_eq!(config.poll_delay_for(40), Duration::from_millis(500));
        assert_eq!(config.poll_delay_for(49), Duration::from_millis(500));
    }

    #[test]
    fn validation_rejects_zero_attempts() {
        let config = BootstrapConfig {
            max_poll_attempts: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidPollAttempts));
    }

    #[test]
    fn validation_rejects_cap_below_base() {
        let config = BootstrapConfig {
            poll_delay_cap_ms: 50,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidDelayRamp));
    }

    #[test]
    fn validation_rejects_zero_ttl() {
        let config = BootstrapConfig {
            intent_ttl_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidIntentTtl));
    }

    proptest! {
        #[test]
        fn delay_is_monotonically_nondecreasing(a in 0u32..200, b in 0u32..200) {
            let config = BootstrapConfig::default();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(config.poll_delay_for(lo) <= config.poll_delay_for(hi));
        }

        #[test]
        fn delay_never_exceeds_the_cap(attempt in 0u32..10_000) {
            let config = BootstrapConfig::default();
            prop_assert!(
                config.poll_delay_for(attempt)
                    <= Duration::from_millis(config.poll_delay_cap_ms)
            );
        }
    }
}
