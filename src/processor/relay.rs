//! Delivery of results to a slash command's `response_url` with retry.

use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::dispatch::DownstreamOutcome;
use crate::types::SlackResponse;

/// Retry schedule for one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RelayPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_millis(4000),
        }
    }
}

impl RelayPolicy {
    /// Delay before the attempt following `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Body posted to `response_url`.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayPayload {
    /// A downstream JSON body, passed through as is.
    Verbatim { body: String, content_type: String },
    Message(SlackResponse),
}

impl RelayPayload {
    /// JSON answers are already Slack messages; anything else becomes the
    /// text of one, posted back into the originating channel.
    pub fn from_outcome(outcome: DownstreamOutcome, channel_id: &str) -> Self {
        if is_json(&outcome.content_type) {
            Self::Verbatim {
                body: outcome.body,
                content_type: outcome.content_type,
            }
        } else {
            Self::Message(SlackResponse::in_channel(channel_id, outcome.body))
        }
    }
}

fn is_json(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
}

#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("response_url answered HTTP {0}")]
    Status(u16),
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: AttemptError,
    },
}

pub struct Relay {
    client: Client,
    policy: RelayPolicy,
}

impl Relay {
    pub fn new(client: Client, policy: RelayPolicy) -> Self {
        Self { client, policy }
    }

    /// Returns how many attempts the delivery took.
    pub async fn deliver(
        &self,
        response_url: &str,
        payload: &RelayPayload,
    ) -> Result<u32, RelayError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self.try_deliver(response_url, payload).await {
                Ok(()) => return Ok(attempt),
                Err(e) => {
                    if attempt >= max_attempts {
                        return Err(RelayError::Exhausted {
                            attempts: attempt,
                            last: e,
                        });
                    }

                    let delay = self.policy.backoff(attempt);
                    warn!(
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "relay failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn try_deliver(
        &self,
        response_url: &str,
        payload: &RelayPayload,
    ) -> Result<(), AttemptError> {
        let request = match payload {
            RelayPayload::Verbatim { body, content_type } => self
                .client
                .post(response_url)
                .header(CONTENT_TYPE, content_type.as_str())
                .body(body.clone()),
            RelayPayload::Message(message) => self.client.post(response_url).json(message),
        };

        let response = request.send().await?;
        let status = response.status();
        debug!(status = status.as_u16(), "response_url answered");

        if !status.is_success() {
            return Err(AttemptError::Status(status.as_u16()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResponseType;
    use wiremock::matchers::{body_json, body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_policy(max_attempts: u32) -> RelayPolicy {
        RelayPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let policy = RelayPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff(3), Duration::from_millis(2000));
        assert_eq!(policy.backoff(4), Duration::from_millis(4000));
        assert_eq!(policy.backoff(5), Duration::from_millis(4000));
        assert_eq!(policy.backoff(60), Duration::from_millis(4000));
    }

    #[test]
    fn test_json_outcome_is_verbatim() {
        let outcome = DownstreamOutcome {
            status: 200,
            body: r#"{"response_type":"in_channel","blocks":[]}"#.to_string(),
            content_type: "application/json; charset=utf-8".to_string(),
        };
        assert_eq!(
            RelayPayload::from_outcome(outcome.clone(), "C123"),
            RelayPayload::Verbatim {
                body: outcome.body,
                content_type: outcome.content_type,
            }
        );
    }

    #[test]
    fn test_text_outcome_is_wrapped() {
        let outcome = DownstreamOutcome {
            status: 200,
            body: "It is a period of civil war.".to_string(),
            content_type: "text/plain".to_string(),
        };
        match RelayPayload::from_outcome(outcome, "C123") {
            RelayPayload::Message(message) => {
                assert_eq!(message.response_type, ResponseType::InChannel);
                assert_eq!(message.channel.as_deref(), Some("C123"));
                assert_eq!(message.text, "It is a period of civil war.");
            }
            other => panic!("expected a message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_deliver_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/commands/1234"))
            .and(header("content-type", "application/json"))
            .and(body_string(r#"{"text":"hi"}"#))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let relay = Relay::new(Client::new(), fast_policy(3));
        let payload = RelayPayload::Verbatim {
            body: r#"{"text":"hi"}"#.to_string(),
            content_type: "application/json".to_string(),
        };
        let attempts = relay
            .deliver(&format!("{}/commands/1234", server.uri()), &payload)
            .await
            .unwrap();
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn test_deliver_retries_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_json(serde_json::json!({
                "response_type": "ephemeral",
                "text": "done"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let relay = Relay::new(Client::new(), fast_policy(3));
        let payload = RelayPayload::Message(SlackResponse::ephemeral("done"));
        let attempts = relay.deliver(&server.uri(), &payload).await.unwrap();
        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn test_deliver_gives_up_after_max_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let relay = Relay::new(Client::new(), fast_policy(3));
        let payload = RelayPayload::Message(SlackResponse::ephemeral("done"));
        let err = relay.deliver(&server.uri(), &payload).await.unwrap_err();

        let RelayError::Exhausted { attempts, last } = err;
        assert_eq!(attempts, 3);
        assert!(matches!(last, AttemptError::Status(503)));
    }
}
