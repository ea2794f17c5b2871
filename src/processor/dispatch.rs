use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::types::DispatchJob;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// What a downstream function answered, untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownstreamOutcome {
    pub status: u16,
    pub body: String,
    pub content_type: String,
}

#[derive(Debug, Error)]
pub enum DownstreamError {
    #[error("downstream call to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },
    #[error("downstream call to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("downstream {url} answered HTTP {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
}

pub struct Dispatcher {
    client: Client,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// POSTs the original slash-command body to the function's request URL.
    pub async fn forward(&self, job: &DispatchJob) -> Result<DownstreamOutcome, DownstreamError> {
        let url = &job.route.request_url;
        debug!(url = %url, function = %job.route.name, "forwarding to downstream function");

        let call = async {
            let response = self
                .client
                .post(url)
                .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
                .header("X-Slack-Signature", &job.signature)
                .header("X-Slack-Request-Timestamp", &job.timestamp)
                .body(job.body.clone())
                .send()
                .await?;

            let status = response.status();
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or(DEFAULT_CONTENT_TYPE)
                .to_string();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, content_type, body))
        };

        let (status, content_type, body) = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| DownstreamError::Timeout {
                url: url.clone(),
                timeout: self.timeout,
            })?
            .map_err(|source| DownstreamError::Http {
                url: url.clone(),
                source,
            })?;

        if !status.is_success() {
            return Err(DownstreamError::Status {
                url: url.clone(),
                status: status.as_u16(),
                body,
            });
        }

        Ok(DownstreamOutcome {
            status: status.as_u16(),
            body,
            content_type,
        })
    }
}
