use chrono::Utc;
use lambda_http::{run, service_fn, Body, Error, Request, Response};
use tracing::{error, info, warn};

// Import shared types and local modules
#[path = "../env.rs"]
mod env;
#[allow(dead_code)]
#[path = "../types.rs"]
mod types;
mod config;
mod queue;
mod registry;
mod request;
mod signature;

use config::ReceiverConfig;
use queue::{JobQueue, SqsQueue};
use registry::{CommandRegistry, Resolution, RouteError};
use request::InboundRequest;
use signature::{SignatureVerifier, Verification, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use types::{DispatchJob, SlackResponse};

const INTERNAL_ERROR_TEXT: &str = "Sorry...we uh...messed up. Please try again in a bit.";

/// Everything the handler needs, built once per cold start.
pub struct Receiver<Q> {
    verifier: SignatureVerifier,
    registry: CommandRegistry,
    queue: Q,
}

async fn function_handler<Q: JobQueue + Sync>(
    app: &Receiver<Q>,
    event: Request,
) -> Result<Response<Body>, Error> {
    let Ok(body) = std::str::from_utf8(event.body()) else {
        warn!(outcome = "rejected_malformed", "request body is not UTF-8");
        return bad_request();
    };

    let signature = header(&event, SIGNATURE_HEADER);
    let timestamp = header(&event, TIMESTAMP_HEADER);

    match app.verifier.verify(signature, timestamp, body) {
        Ok(Verification::Authentic) => {}
        Ok(Verification::NotAuthentic) => {
            warn!(outcome = "rejected_forbidden", "signature mismatch");
            return forbidden(body);
        }
        Ok(Verification::Expired { skew_secs }) => {
            warn!(
                outcome = "rejected_forbidden",
                skew_secs, "stale request timestamp, possible replay"
            );
            return forbidden(body);
        }
        Err(e) => {
            warn!(outcome = "rejected_malformed", error = %e, "request failed validation");
            return bad_request();
        }
    }

    let request = match InboundRequest::parse(body) {
        Ok(request) => request,
        Err(e) => {
            warn!(outcome = "rejected_malformed", error = %e, "unparseable form body");
            return bad_request();
        }
    };

    info!(
        team_id = %request.fields.team_id,
        user_id = %request.fields.user_id,
        command = %request.fields.command,
        text = %request.fields.text,
        "slash command authenticated"
    );

    let route = match app.registry.resolve(&request) {
        Ok(Resolution::Route(route)) => route,
        Ok(Resolution::Usage(command)) => {
            return reply(&SlackResponse::ephemeral(command.usage_text()));
        }
        Ok(Resolution::Manual {
            command,
            function,
            spec,
        }) => {
            return reply(&SlackResponse::ephemeral(command.manual_text(function, spec)));
        }
        Err(e) => {
            info!(outcome = "rejected_not_found", error = %e, "command did not resolve");
            return reply(&SlackResponse::ephemeral(e.user_message()));
        }
    };

    let job = DispatchJob {
        route,
        command: request.fields,
        body: body.to_string(),
        signature: signature.unwrap_or_default().to_string(),
        timestamp: timestamp.unwrap_or_default().to_string(),
        queued_at: Utc::now(),
    };

    if let Err(e) = app.queue.enqueue(&job).await {
        error!(outcome = "dispatch_failed", job = %job.label(), error = %e, "failed to queue job");
        return reply(&SlackResponse::ephemeral(INTERNAL_ERROR_TEXT));
    }

    info!(outcome = "dispatched", job = %job.label(), "job queued");

    // Return immediate response to Slack
    reply(&SlackResponse::ephemeral(format!("Working on `{}`... ⏳", job.label())))
}

fn header<'a>(event: &'a Request, name: &str) -> Option<&'a str> {
    event
        .headers()
        .get(name)
        .map(|v| v.to_str().unwrap_or(""))
}

/// Indistinguishable from an unknown command so a failed signature reveals
/// nothing about which commands exist.
fn forbidden(body: &str) -> Result<Response<Body>, Error> {
    let claimed = InboundRequest::parse(body)
        .ok()
        .and_then(|request| {
            request
                .command_token()
                .ok()
                .map(|token| token.trim_start_matches('/').to_string())
        })
        .unwrap_or_default();
    reply(&SlackResponse::ephemeral(
        RouteError::UnknownCommand(claimed).user_message(),
    ))
}

fn reply(message: &SlackResponse) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(200)
        .header("Content-Type", "application/json")
        .body(Body::from(serde_json::to_string(message)?))?)
}

fn bad_request() -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(400)
        .header("Content-Type", "text/plain")
        .body(Body::from("Bad Request"))?)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .without_time()
        .init();

    let config = ReceiverConfig::from_env()?;
    let registry = CommandRegistry::load(&config.registry_source, &reqwest::Client::new()).await?;

    let aws_config = aws_config::load_from_env().await;
    let queue = SqsQueue::new(aws_sdk_sqs::Client::new(&aws_config), config.queue_url);

    let app = Receiver {
        verifier: SignatureVerifier::new(config.signing_secret, config.signature_max_age),
        registry,
        queue,
    };
    let app = &app;

    run(service_fn(move |event| async move {
        function_handler(app, event).await
    }))
    .await
}
