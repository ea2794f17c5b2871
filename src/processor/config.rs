use std::time::Duration;

use crate::env::{parse_or, ConfigError};
use crate::relay::RelayPolicy;

const DEFAULT_DOWNSTREAM_TIMEOUT_MS: u64 = 2000;
const DEFAULT_RELAY_TIMEOUT_MS: u64 = 3000;

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Must stay well under the Lambda timeout.
    pub downstream_timeout: Duration,
    pub relay_timeout: Duration,
    pub relay_policy: RelayPolicy,
}

impl ProcessorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = RelayPolicy::default();

        let max_attempts = parse_or(&lookup, "RELAY_MAX_ATTEMPTS", defaults.max_attempts)?;
        // At least one retry.
        if max_attempts < 2 {
            return Err(ConfigError::Invalid {
                key: "RELAY_MAX_ATTEMPTS",
                value: max_attempts.to_string(),
            });
        }

        Ok(Self {
            downstream_timeout: Duration::from_millis(parse_or(
                &lookup,
                "DOWNSTREAM_TIMEOUT_MS",
                DEFAULT_DOWNSTREAM_TIMEOUT_MS,
            )?),
            relay_timeout: Duration::from_millis(parse_or(
                &lookup,
                "RELAY_TIMEOUT_MS",
                DEFAULT_RELAY_TIMEOUT_MS,
            )?),
            relay_policy: RelayPolicy {
                max_attempts,
                initial_backoff: Duration::from_millis(parse_or(
                    &lookup,
                    "RELAY_INITIAL_BACKOFF_MS",
                    defaults.initial_backoff.as_millis() as u64,
                )?),
                max_backoff: Duration::from_millis(parse_or(
                    &lookup,
                    "RELAY_MAX_BACKOFF_MS",
                    defaults.max_backoff.as_millis() as u64,
                )?),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProcessorConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.downstream_timeout, Duration::from_secs(2));
        assert_eq!(config.relay_timeout, Duration::from_secs(3));
        assert_eq!(config.relay_policy, RelayPolicy::default());
    }

    #[test]
    fn test_overrides() {
        let config = ProcessorConfig::from_lookup(|key| match key {
            "DOWNSTREAM_TIMEOUT_MS" => Some("1500".to_string()),
            "RELAY_MAX_ATTEMPTS" => Some("5".to_string()),
            "RELAY_MAX_BACKOFF_MS" => Some("10000".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.downstream_timeout, Duration::from_millis(1500));
        assert_eq!(config.relay_policy.max_attempts, 5);
        assert_eq!(config.relay_policy.max_backoff, Duration::from_secs(10));
    }

    #[test]
    fn test_relay_needs_a_retry() {
        let err = ProcessorConfig::from_lookup(|key| {
            (key == "RELAY_MAX_ATTEMPTS").then(|| "1".to_string())
        })
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "RELAY_MAX_ATTEMPTS",
                value: "1".to_string()
            }
        );
    }

    #[test]
    fn test_invalid_timeout() {
        let err = ProcessorConfig::from_lookup(|key| {
            (key == "DOWNSTREAM_TIMEOUT_MS").then(|| "2s".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "DOWNSTREAM_TIMEOUT_MS", .. }));
    }
}
