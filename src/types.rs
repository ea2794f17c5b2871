use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Form fields Slack posts for a slash command. Everything except `command`,
/// `text` and `response_url` is opaque pass-through data for the downstream
/// function.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct SlackCommand {
    pub token: String,
    pub team_id: String,
    pub team_domain: String,
    pub channel_id: String,
    pub channel_name: String,
    pub user_id: String,
    pub user_name: String,
    pub command: String,
    pub text: String,
    pub response_url: String,
    pub trigger_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    Ephemeral,
    InChannel,
}

/// Message body accepted both as a synchronous reply and by `response_url`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SlackResponse {
    pub response_type: ResponseType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocks: Option<serde_json::Value>,
}

impl SlackResponse {
    pub fn ephemeral(text: impl Into<String>) -> Self {
        Self {
            response_type: ResponseType::Ephemeral,
            channel: None,
            text: text.into(),
            blocks: None,
        }
    }

    pub fn in_channel(channel: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            response_type: ResponseType::InChannel,
            channel: Some(channel.into()),
            text: text.into(),
            blocks: None,
        }
    }
}

/// A resolved downstream function. `request_url` and `response_url` are
/// computed for a single dispatch and are never written back to the registry.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FunctionRoute {
    pub name: String,
    pub usage: String,
    pub description: String,
    pub manual: String,
    pub request_url: String,
    pub response_url: String,
}

/// Queue message handed from the receiver to the processor.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DispatchJob {
    pub route: FunctionRoute,
    pub command: SlackCommand,
    /// Original form-encoded body, forwarded byte for byte.
    pub body: String,
    pub signature: String,
    pub timestamp: String,
    pub queued_at: DateTime<Utc>,
}

impl DispatchJob {
    /// `/struggle randxkcd` style label used in logs and user-facing text.
    pub fn label(&self) -> String {
        format!("{} {}", self.command.command, self.route.name)
    }
}
