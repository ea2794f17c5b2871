//! Slack request signing (`v0` scheme).

use chrono::Utc;
use hmac::{digest::InvalidLength, Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Slack-Signature";
pub const TIMESTAMP_HEADER: &str = "X-Slack-Request-Timestamp";

const VERSION: &str = "v0";
const SIGNATURE_PREFIX: &str = "v0=";

/// Outcome of checking a structurally valid request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Authentic,
    NotAuthentic,
    /// Correctly signed, but the timestamp is outside the accepted window.
    Expired { skew_secs: u64 },
}

/// The request did not carry what the signing scheme needs. Says nothing
/// about authenticity.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error(
        "signature headers incomplete (signature present: {signature_present}, \
         signature empty: {signature_empty}, timestamp present: {timestamp_present}, \
         timestamp empty: {timestamp_empty})"
    )]
    MissingHeaders {
        signature_present: bool,
        signature_empty: bool,
        timestamp_present: bool,
        timestamp_empty: bool,
    },
    #[error("unsupported signature version `{0}`")]
    UnsupportedVersion(String),
    #[error("timestamp `{0}` is not a whole number of seconds")]
    InvalidTimestamp(String),
}

#[derive(Clone)]
pub struct SignatureVerifier {
    secret: String,
    max_age: Duration,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secret", &"<redacted>")
            .field("max_age", &self.max_age)
            .finish()
    }
}

impl SignatureVerifier {
    pub fn new(secret: impl Into<String>, max_age: Duration) -> Self {
        Self {
            secret: secret.into(),
            max_age,
        }
    }

    pub fn verify(
        &self,
        signature: Option<&str>,
        timestamp: Option<&str>,
        body: &str,
    ) -> Result<Verification, ValidationError> {
        self.verify_at(signature, timestamp, body, Utc::now().timestamp())
    }

    /// Same as [`verify`](Self::verify) with an explicit clock, in unix seconds.
    pub fn verify_at(
        &self,
        signature: Option<&str>,
        timestamp: Option<&str>,
        body: &str,
        now: i64,
    ) -> Result<Verification, ValidationError> {
        let (signature, timestamp) = match (signature, timestamp) {
            (Some(sig), Some(ts)) if !sig.is_empty() && !ts.is_empty() => (sig, ts),
            _ => {
                return Err(ValidationError::MissingHeaders {
                    signature_present: signature.is_some(),
                    signature_empty: signature.map_or(true, str::is_empty),
                    timestamp_present: timestamp.is_some(),
                    timestamp_empty: timestamp.map_or(true, str::is_empty),
                })
            }
        };

        let supplied = strip_version(signature)?;
        let sent_at: i64 = timestamp
            .parse()
            .map_err(|_| ValidationError::InvalidTimestamp(timestamp.to_string()))?;

        if self.secret.is_empty() {
            warn!("signing secret is empty, refusing to authenticate");
            return Ok(Verification::NotAuthentic);
        }

        let expected = match sign(&self.secret, timestamp, body) {
            Ok(expected) => expected,
            Err(e) => {
                warn!(error = %e, "failed to create HMAC");
                return Ok(Verification::NotAuthentic);
            }
        };
        if !constant_time_eq(expected.as_bytes(), supplied.as_bytes()) {
            return Ok(Verification::NotAuthentic);
        }

        let skew_secs = now.abs_diff(sent_at);
        if skew_secs > self.max_age.as_secs() {
            return Ok(Verification::Expired { skew_secs });
        }

        Ok(Verification::Authentic)
    }
}

/// Lowercase hex HMAC-SHA256 of `v0:{timestamp}:{body}`.
pub fn sign(secret: &str, timestamp: &str, body: &str) -> Result<String, InvalidLength> {
    let base_string = format!("{VERSION}:{timestamp}:{body}");
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(base_string.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// `v0=<hex>` and bare `<hex>` are both accepted; any other `tag=` is not.
fn strip_version(signature: &str) -> Result<&str, ValidationError> {
    if let Some(hex) = signature.strip_prefix(SIGNATURE_PREFIX) {
        return Ok(hex);
    }
    match signature.split_once('=') {
        Some((tag, _)) => Err(ValidationError::UnsupportedVersion(tag.to_string())),
        None => Ok(signature),
    }
}

/// Runs over every byte regardless of where the first difference is.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
