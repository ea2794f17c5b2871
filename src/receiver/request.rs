use std::str::SplitWhitespace;

use crate::registry::RouteError;
use crate::types::SlackCommand;

/// The form body of a slash-command webhook.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub fields: SlackCommand,
    commands: Vec<String>,
}

impl InboundRequest {
    pub fn parse(body: &str) -> Result<Self, serde_urlencoded::de::Error> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(body)?;

        let mut fields = SlackCommand::default();
        let mut commands = Vec::new();
        for (key, value) in pairs {
            let slot = match key.as_str() {
                "token" => &mut fields.token,
                "team_id" => &mut fields.team_id,
                "team_domain" => &mut fields.team_domain,
                "channel_id" => &mut fields.channel_id,
                "channel_name" => &mut fields.channel_name,
                "user_id" => &mut fields.user_id,
                "user_name" => &mut fields.user_name,
                "text" => &mut fields.text,
                "response_url" => &mut fields.response_url,
                "trigger_id" => &mut fields.trigger_id,
                "command" => {
                    commands.push(value);
                    continue;
                }
                _ => continue,
            };
            // First occurrence wins.
            if slot.is_empty() {
                *slot = value;
            }
        }
        fields.command = commands.first().cloned().unwrap_or_default();

        Ok(Self { fields, commands })
    }

    /// The single `command` field, e.g. `/struggle`.
    pub fn command_token(&self) -> Result<&str, RouteError> {
        match self.commands.as_slice() {
            [command] if !command.trim().is_empty() => Ok(command.trim()),
            [] | [_] => Err(RouteError::MissingCommand),
            many => Err(RouteError::AmbiguousCommand(many.len())),
        }
    }

    pub fn arguments(&self) -> SplitWhitespace<'_> {
        self.fields.text.split_whitespace()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_slash_command_form() {
        let body = "token=gIkuvaNzQIHg97ATvDxqgjtO&team_id=T0001&team_domain=example\
                    &channel_id=C2147483705&channel_name=test&user_id=U2147483697&user_name=Steve\
                    &command=%2Fstruggle&text=randxkcd+now\
                    &response_url=https%3A%2F%2Fhooks.slack.com%2Fcommands%2F1234%2F5678\
                    &trigger_id=13345224609.738474920.8088930838d88f008e0";
        let request = InboundRequest::parse(body).unwrap();

        assert_eq!(request.fields.command, "/struggle");
        assert_eq!(request.fields.channel_id, "C2147483705");
        assert_eq!(request.fields.user_name, "Steve");
        assert_eq!(request.fields.response_url, "https://hooks.slack.com/commands/1234/5678");
        assert_eq!(request.command_token().unwrap(), "/struggle");
        assert_eq!(request.arguments().collect::<Vec<_>>(), vec!["randxkcd", "now"]);
    }

    #[test]
    fn test_missing_command() {
        let request = InboundRequest::parse("text=randxkcd").unwrap();
        assert!(matches!(request.command_token(), Err(RouteError::MissingCommand)));

        let request = InboundRequest::parse("command=&text=randxkcd").unwrap();
        assert!(matches!(request.command_token(), Err(RouteError::MissingCommand)));
    }

    #[test]
    fn test_repeated_command_is_ambiguous() {
        let request = InboundRequest::parse("command=%2Fstruggle&command=%2Fother").unwrap();
        assert!(matches!(request.command_token(), Err(RouteError::AmbiguousCommand(2))));
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let request = InboundRequest::parse("command=%2Fstruggle&api_app_id=A123&is_enterprise_install=false").unwrap();
        assert_eq!(request.fields.command, "/struggle");
        assert_eq!(request.arguments().count(), 0);
    }
}
