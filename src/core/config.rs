use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Consecutive failures tolerated before the circuit opens, unless overridden.
pub const DEFAULT_FAILURE_THRESHOLD: u64 = 5;
/// Cooldown before an open circuit admits a trial call, unless overridden.
pub const DEFAULT_RESET_TIMEOUT_MS: u64 = 60_000;

// default log settings
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// `GuardConfig` encompasses the tunable fields of a circuit guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// `failure_threshold` is the consecutive-failure count at which the guard
    /// transforms from closed to open. Must be positive.
    pub failure_threshold: u64,
    /// `reset_timeout_ms` represents recovery timeout (in milliseconds) after the
    /// circuit guard opens. During the open period, no calls are permitted until
    /// the timeout has elapsed. After that, the guard will transform to half-open
    /// state for a single "trial" call.
    pub reset_timeout_ms: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        GuardConfig {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            reset_timeout_ms: DEFAULT_RESET_TIMEOUT_MS,
        }
    }
}

impl GuardConfig {
    pub fn is_valid(&self) -> crate::Result<()> {
        if self.failure_threshold == 0 {
            return Err(Error::msg("invalid failure_threshold"));
        }
        if self.reset_timeout_ms == 0 {
            return Err(Error::msg("invalid reset_timeout_ms"));
        }
        Ok(())
    }
}

impl fmt::Display for GuardConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmtted = serde_json::to_string_pretty(self).unwrap();
        write!(f, "{}", fmtted)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_config() {
        let config = GuardConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.reset_timeout_ms, 60_000);
        assert!(config.is_valid().is_ok());
    }

    #[test]
    fn invalid_threshold() {
        let config = GuardConfig {
            failure_threshold: 0,
            ..Default::default()
        };
        assert!(config.is_valid().is_err());
    }

    #[test]
    fn invalid_timeout() {
        let config = GuardConfig {
            reset_timeout_ms: 0,
            ..Default::default()
        };
        assert!(config.is_valid().is_err());
    }

    #[test]
    fn serde_defaults() {
        let config: GuardConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, GuardConfig::default());

        let config: GuardConfig =
            serde_json::from_str(r#"{"failure_threshold":3,"reset_timeout_ms":10000}"#).unwrap();
        assert_eq!(config.failure_threshold, 3);
        assert_eq!(config.reset_timeout_ms, 10_000);
    }

    #[test]
    fn display_json() {
        let config = GuardConfig::default();
        let parsed: GuardConfig = serde_json::from_str(&config.to_string()).unwrap();
        assert_eq!(parsed, config);
    }
}
