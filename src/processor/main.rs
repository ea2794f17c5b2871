#[allow(dead_code)]
#[path = "../env.rs"]
mod env;
#[path = "../types.rs"]
mod types;
mod config;
mod dispatch;
mod relay;

use aws_lambda_events::event::sqs::SqsEvent;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use tracing::{error, info, warn};

use config::ProcessorConfig;
use dispatch::Dispatcher;
use relay::{Relay, RelayPayload};
use types::{DispatchJob, SlackResponse};

/// Terminal state of one queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    RelayedOk,
    RelayFailed,
}

pub struct Processor {
    dispatcher: Dispatcher,
    relay: Relay,
}

impl Processor {
    /// Calls the downstream function and relays whatever happened to the
    /// job's `response_url`. A failed call still produces a notice.
    pub async fn process(&self, job: &DispatchJob) -> Delivery {
        let label = job.label();
        let waited_ms = (chrono::Utc::now() - job.queued_at).num_milliseconds();

        let payload = match self.dispatcher.forward(job).await {
            Ok(outcome) => {
                info!(
                    job = %label,
                    status = outcome.status,
                    content_type = %outcome.content_type,
                    waited_ms,
                    "downstream function answered"
                );
                RelayPayload::from_outcome(outcome, &job.command.channel_id)
            }
            Err(e) => {
                error!(job = %label, error = %e, waited_ms, "downstream call failed");
                RelayPayload::Message(SlackResponse::ephemeral(failure_notice(job)))
            }
        };

        match self.relay.deliver(&job.route.response_url, &payload).await {
            Ok(attempts) => {
                info!(outcome = "relayed_ok", job = %label, attempts, "result relayed");
                Delivery::RelayedOk
            }
            Err(e) => {
                error!(outcome = "relay_failed", job = %label, error = %e, "could not relay result");
                Delivery::RelayFailed
            }
        }
    }
}

/// Never mentions where the function lives or why it failed.
fn failure_notice(job: &DispatchJob) -> String {
    format!(
        "Sorry...we uh...messed up. `{}` didn't finish, please try again in a bit.",
        job.label()
    )
}

async fn function_handler(app: &Processor, event: LambdaEvent<SqsEvent>) -> Result<(), Error> {
    // Process each SQS message
    for record in event.payload.records {
        let message_id = record.message_id.unwrap_or_default();
        let Some(body) = record.body else {
            warn!(message_id = %message_id, "SQS record without body");
            continue;
        };

        let job: DispatchJob = match serde_json::from_str(&body) {
            Ok(job) => job,
            Err(e) => {
                error!(message_id = %message_id, error = %e, "undecodable dispatch job dropped");
                continue;
            }
        };

        app.process(&job).await;
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .without_time()
        .init();

    let config = ProcessorConfig::from_env()?;
    let relay_client = reqwest::Client::builder()
        .timeout(config.relay_timeout)
        .build()?;

    let app = Processor {
        dispatcher: Dispatcher::new(reqwest::Client::new(), config.downstream_timeout),
        relay: Relay::new(relay_client, config.relay_policy),
    };
    let app = &app;

    run(service_fn(move |event| async move {
        function_handler(app, event).await
    }))
    .await
}
