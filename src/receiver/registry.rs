//! Two-level command registry: slash command -> function -> downstream route.
//!
//! Loaded once at cold start and only read afterwards.

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::marker::PhantomData;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

use crate::request::InboundRequest;
use crate::types::FunctionRoute;

const EMBEDDED_REGISTRY: &str = include_str!("registry.json");

/// Persisted metadata of one downstream function.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct FunctionSpec {
    pub usage: String,
    pub description: String,
    pub manual: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    #[serde(skip)]
    pub name: String,
    #[serde(default)]
    pub request_url_root: String,
    #[serde(default = "default_help_keyword")]
    pub help_keyword: String,
    #[serde(deserialize_with = "unique_keys")]
    pub functions: BTreeMap<String, FunctionSpec>,
}

fn default_help_keyword() -> String {
    "help".to_string()
}

impl Command {
    pub fn usage_text(&self) -> String {
        let mut text = format!("*/{}* can do the following:", self.name);
        for (name, spec) in &self.functions {
            text.push_str(&format!("\n• `{name}`"));
            if !spec.description.is_empty() {
                text.push_str(&format!(": {}", spec.description));
            }
        }
        text.push_str(&format!(
            "\nTry `/{} {} <function>` for details.",
            self.name, self.help_keyword
        ));
        text
    }

    pub fn manual_text(&self, function: &str, spec: &FunctionSpec) -> String {
        let usage = if spec.usage.is_empty() {
            format!("/{} {}", self.name, function)
        } else {
            spec.usage.clone()
        };
        let mut text = format!("*{function}*\nUsage: `{usage}`");
        if !spec.description.is_empty() {
            text.push_str(&format!("\n{}", spec.description));
        }
        if !spec.manual.is_empty() {
            text.push_str(&format!("\n{}", spec.manual));
        }
        text
    }

    fn unknown_function(&self, function: &str) -> RouteError {
        RouteError::UnknownFunction {
            command: self.name.clone(),
            function: function.to_string(),
            available: self.functions.keys().cloned().collect(),
        }
    }
}

/// What a request resolved to.
#[derive(Debug)]
pub enum Resolution<'a> {
    Route(FunctionRoute),
    /// No function named, or the help keyword alone.
    Usage(&'a Command),
    /// `help <function>`.
    Manual {
        command: &'a Command,
        function: &'a str,
        spec: &'a FunctionSpec,
    },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("request has no command")]
    MissingCommand,
    #[error("request has {0} command fields")]
    AmbiguousCommand(usize),
    #[error("unrecognized command `/{0}`")]
    UnknownCommand(String),
    #[error("command `/{0}` has no functions")]
    NoFunctions(String),
    #[error("command `/{command}` has no function `{function}`")]
    UnknownFunction {
        command: String,
        function: String,
        available: Vec<String>,
    },
    #[error("command `/{0}` has no request URL root")]
    RouteNotConfigured(String),
    #[error("request has no response_url")]
    MissingResponseUrl,
}

impl RouteError {
    /// Text safe to show the person who ran the command.
    pub fn user_message(&self) -> String {
        match self {
            Self::MissingCommand | Self::AmbiguousCommand(_) => {
                "Sorry, I couldn't tell which command you meant.".to_string()
            }
            Self::UnknownCommand(name) => {
                format!("uh uh uh... `/{name}` isn't a command I know.")
            }
            Self::NoFunctions(command) => {
                format!("`/{command}` doesn't have any functions yet.")
            }
            Self::UnknownFunction {
                command,
                function,
                available,
            } => {
                let options = available
                    .iter()
                    .map(|name| format!("`{name}`"))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("`/{command}` doesn't know `{function}`. Try one of: {options}")
            }
            Self::RouteNotConfigured(command) => {
                format!("`/{command}` isn't available right now.")
            }
            Self::MissingResponseUrl => {
                "Sorry, there's nowhere to send the answer to this request.".to_string()
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryLoadError {
    #[error("failed to read command registry {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to fetch command registry {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("command registry {url} answered HTTP {status}")]
    FetchStatus { url: String, status: u16 },
    #[error("malformed command registry: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid command name `{0}`")]
    InvalidCommandName(String),
}

/// Where the registry document comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrySource {
    File(PathBuf),
    Url(String),
    Embedded,
}

impl RegistrySource {
    pub fn from_location(location: Option<&str>) -> Self {
        match location.map(str::trim) {
            None | Some("") => Self::Embedded,
            Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
                Self::Url(url.to_string())
            }
            Some(path) => Self::File(PathBuf::from(path)),
        }
    }
}

impl fmt::Display for RegistrySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "file {}", path.display()),
            Self::Url(url) => write!(f, "url {url}"),
            Self::Embedded => f.write_str("embedded default"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandRegistry {
    commands: HashMap<String, Command>,
}

impl CommandRegistry {
    pub async fn load(
        source: &RegistrySource,
        client: &reqwest::Client,
    ) -> Result<Self, RegistryLoadError> {
        let document = match source {
            RegistrySource::Embedded => EMBEDDED_REGISTRY.to_string(),
            RegistrySource::File(path) => {
                std::fs::read_to_string(path).map_err(|source| RegistryLoadError::Read {
                    path: path.clone(),
                    source,
                })?
            }
            RegistrySource::Url(url) => {
                let fetch_error = |source| RegistryLoadError::Fetch {
                    url: url.clone(),
                    source,
                };
                let response = client.get(url).send().await.map_err(fetch_error)?;
                if !response.status().is_success() {
                    return Err(RegistryLoadError::FetchStatus {
                        url: url.clone(),
                        status: response.status().as_u16(),
                    });
                }
                response.text().await.map_err(fetch_error)?
            }
        };

        let registry = Self::from_json(&document)?;
        info!(
            source = %source,
            commands = registry.commands.len(),
            "command registry loaded"
        );
        Ok(registry)
    }

    pub fn from_json(document: &str) -> Result<Self, RegistryLoadError> {
        let mut deserializer = serde_json::Deserializer::from_str(document);
        let commands: BTreeMap<String, Command> = unique_keys(&mut deserializer)?;
        deserializer.end()?;

        let mut registry = HashMap::with_capacity(commands.len());
        for (name, mut command) in commands {
            if name.is_empty() || name.starts_with('/') || name.contains(char::is_whitespace) {
                return Err(RegistryLoadError::InvalidCommandName(name));
            }
            command.name = name.clone();
            registry.insert(name, command);
        }
        Ok(Self { commands: registry })
    }

    pub fn get(&self, name: &str) -> Option<&Command> {
        self.commands.get(name)
    }

    pub fn resolve(&self, request: &InboundRequest) -> Result<Resolution<'_>, RouteError> {
        let token = request.command_token()?;
        let name = token.strip_prefix('/').unwrap_or(token);
        let command = self
            .get(name)
            .ok_or_else(|| RouteError::UnknownCommand(name.to_string()))?;

        if command.functions.is_empty() {
            return Err(RouteError::NoFunctions(command.name.clone()));
        }

        let mut arguments = request.arguments();
        let Some(function) = arguments.next() else {
            return Ok(Resolution::Usage(command));
        };

        if function == command.help_keyword {
            return match arguments.next() {
                None => Ok(Resolution::Usage(command)),
                Some(target) => match command.functions.get_key_value(target) {
                    Some((function, spec)) => Ok(Resolution::Manual {
                        command,
                        function,
                        spec,
                    }),
                    None => Err(command.unknown_function(target)),
                },
            };
        }

        let spec = command
            .functions
            .get(function)
            .ok_or_else(|| command.unknown_function(function))?;

        let root = command.request_url_root.trim();
        if root.is_empty() {
            return Err(RouteError::RouteNotConfigured(command.name.clone()));
        }

        let response_url = request.fields.response_url.trim();
        if response_url.is_empty() {
            return Err(RouteError::MissingResponseUrl);
        }

        Ok(Resolution::Route(FunctionRoute {
            name: function.to_string(),
            usage: spec.usage.clone(),
            description: spec.description.clone(),
            manual: spec.manual.clone(),
            request_url: format!("{}/{}", root.trim_end_matches('/'), function),
            response_url: response_url.to_string(),
        }))
    }
}

/// Deserializes a JSON object into a map, rejecting repeated keys instead of
/// letting the last one win.
fn unique_keys<'de, D, V>(deserializer: D) -> Result<BTreeMap<String, V>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    struct UniqueKeys<V>(PhantomData<V>);

    impl<'de, V: Deserialize<'de>> Visitor<'de> for UniqueKeys<V> {
        type Value = BTreeMap<String, V>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an object with unique keys")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut entries = BTreeMap::new();
            while let Some((key, value)) = map.next_entry::<String, V>()? {
                if entries.contains_key(&key) {
                    return Err(de::Error::custom(format_args!("duplicate key `{key}`")));
                }
                entries.insert(key, value);
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(UniqueKeys(PhantomData))
}
