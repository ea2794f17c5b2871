use std::time::Duration;

use crate::env::{parse_or, required, ConfigError};
use crate::registry::RegistrySource;

const DEFAULT_SIGNATURE_MAX_AGE_SECS: u64 = 60 * 5;

#[derive(Clone)]
pub struct ReceiverConfig {
    pub signing_secret: String,
    pub queue_url: String,
    pub registry_source: RegistrySource,
    pub signature_max_age: Duration,
}

impl std::fmt::Debug for ReceiverConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiverConfig")
            .field("signing_secret", &"<redacted>")
            .field("queue_url", &self.queue_url)
            .field("registry_source", &self.registry_source)
            .field("signature_max_age", &self.signature_max_age)
            .finish()
    }
}

impl ReceiverConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            signing_secret: required(&lookup, "SLACK_SIGNING_SECRET")?,
            queue_url: required(&lookup, "SQS_QUEUE_URL")?,
            registry_source: RegistrySource::from_location(lookup("COMMAND_REGISTRY").as_deref()),
            signature_max_age: Duration::from_secs(parse_or(
                &lookup,
                "SIGNATURE_MAX_AGE_SECS",
                DEFAULT_SIGNATURE_MAX_AGE_SECS,
            )?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ReceiverConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ReceiverConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[
            ("SLACK_SIGNING_SECRET", "shh"),
            ("SQS_QUEUE_URL", "https://sqs.us-east-1.amazonaws.com/123/jobs"),
        ])
        .unwrap();
        assert_eq!(config.signing_secret, "shh");
        assert_eq!(config.registry_source, RegistrySource::Embedded);
        assert_eq!(config.signature_max_age, Duration::from_secs(300));
    }

    #[test]
    fn test_missing_secret_fails_closed() {
        assert_eq!(
            config(&[("SQS_QUEUE_URL", "q")]).unwrap_err(),
            ConfigError::Missing("SLACK_SIGNING_SECRET")
        );
        assert_eq!(
            config(&[("SLACK_SIGNING_SECRET", "  "), ("SQS_QUEUE_URL", "q")]).unwrap_err(),
            ConfigError::Missing("SLACK_SIGNING_SECRET")
        );
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("SLACK_SIGNING_SECRET", "shh"),
            ("SQS_QUEUE_URL", "q"),
            ("COMMAND_REGISTRY", "https://example.com/registry.json"),
            ("SIGNATURE_MAX_AGE_SECS", "60"),
        ])
        .unwrap();
        assert_eq!(
            config.registry_source,
            RegistrySource::Url("https://example.com/registry.json".to_string())
        );
        assert_eq!(config.signature_max_age, Duration::from_secs(60));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = config(&[("SLACK_SIGNING_SECRET", "shh"), ("SQS_QUEUE_URL", "q")]).unwrap();
        assert!(!format!("{config:?}").contains("shh"));
    }

    #[test]
    fn test_invalid_max_age() {
        let err = config(&[
            ("SLACK_SIGNING_SECRET", "shh"),
            ("SQS_QUEUE_URL", "q"),
            ("SIGNATURE_MAX_AGE_SECS", "five minutes"),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "SIGNATURE_MAX_AGE_SECS",
                value: "five minutes".to_string()
            }
        );
    }
}
