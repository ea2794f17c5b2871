use std::future::Future;

use aws_sdk_sqs::error::DisplayErrorContext;
use thiserror::Error;

use crate::types::DispatchJob;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("failed to encode dispatch job: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to send dispatch job: {0}")]
    Send(String),
}

/// Hand-off point between the receiver and whatever relays the result.
pub trait JobQueue {
    fn enqueue(&self, job: &DispatchJob) -> impl Future<Output = Result<(), QueueError>> + Send;
}

/// Jobs go to SQS; the processor Lambda picks them up.
pub struct SqsQueue {
    client: aws_sdk_sqs::Client,
    queue_url: String,
}

impl SqsQueue {
    pub fn new(client: aws_sdk_sqs::Client, queue_url: String) -> Self {
        Self { client, queue_url }
    }
}

impl JobQueue for SqsQueue {
    async fn enqueue(&self, job: &DispatchJob) -> Result<(), QueueError> {
        let message_body = serde_json::to_string(job)?;

        self.client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(message_body)
            .send()
            .await
            .map_err(|e| QueueError::Send(DisplayErrorContext(&e).to_string()))?;

        Ok(())
    }
}
