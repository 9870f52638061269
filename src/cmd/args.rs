/*!
`args.rs`

Command-line surface and the resolver that turns it into a validated [`Config`].

Flags:
  -c / --command   COMMAND     command line to run (required)
  -t / --topic     TOPIC       base topic (required)
  -u / --userid    USER        broker username
  -P / --password  PASS        broker password
  -s / --stdtopic              append /stdout or /stderr to the topic
  -e / --env       NAME=VALUE  extra child environment (repeatable)
  --clientid       ID          MQTT client id (default log2mqtt)
  --tokenizer      shell|naive how COMMAND is split into arguments
  --keep-empty                 publish empty lines too
  BROKER_URL                   mqtt://host[:port] or mqtts://host[:port] (required)

Resolution is a pure function of the parsed flags: no network, no filesystem,
no process environment.
*/

use clap::Args;
use thiserror::Error;

use super::EXIT_USAGE;
use crate::process::Tokenizer;

pub const DEFAULT_CLIENT_ID: &str = "log2mqtt";

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ForwardArgs {
    /// Command to run, e.g. "tail -f /var/log/mylog"
    #[arg(short = 'c', long = "command", value_name = "COMMAND")]
    pub command: Option<String>,

    /// Topic to publish stdout and stderr lines on
    #[arg(short = 't', long = "topic", value_name = "TOPIC")]
    pub topic: Option<String>,

    /// Username for the MQTT server
    #[arg(short = 'u', long = "userid", value_name = "USERID")]
    pub userid: Option<String>,

    /// Password for the MQTT server
    #[arg(short = 'P', long = "password", value_name = "PASSWORD")]
    pub password: Option<String>,

    /// Append /stdout or /stderr to the topic
    #[arg(short = 's', long = "stdtopic")]
    pub stdtopic: bool,

    /// Extra environment variable for the command (repeatable NAME=VALUE)
    #[arg(short = 'e', long = "env", value_name = "NAME=VALUE")]
    pub env: Vec<String>,

    /// MQTT client id
    #[arg(long = "clientid", value_name = "ID", default_value = DEFAULT_CLIENT_ID)]
    pub client_id: String,

    /// How the command string is split into program and arguments
    #[arg(long, value_enum, default_value_t = Tokenizer::Shell)]
    pub tokenizer: Tokenizer,

    /// Publish empty lines instead of skipping them
    #[arg(long)]
    pub keep_empty: bool,

    /// MQTT server URL, e.g. mqtt://somewhere or mqtts://somewhere_with_tls
    #[arg(value_name = "BROKER_URL")]
    pub broker_url: Option<String>,
}

/// Validated, immutable run configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub command: String,
    pub topic: String,
    pub broker_url: String,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub split_streams: bool,
    /// Child-only overrides in command-line order; a later entry for a name wins.
    pub extra_env: Vec<(String, String)>,
    pub tokenizer: Tokenizer,
    pub keep_empty: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Command string to run is required")]
    MissingCommand,

    #[error("MQTT topic is required")]
    MissingTopic,

    #[error("MQTT server URL is required")]
    MissingBrokerUrl,

    #[error("invalid -e entry '{0}': variable name is empty")]
    EmptyEnvName(String),

    #[error("invalid client id '{0}': must be non-empty and not start with a space")]
    InvalidClientId(String),
}

impl ResolveError {
    pub fn exit_code(&self) -> i32 {
        EXIT_USAGE
    }
}

fn required(value: &Option<String>, missing: ResolveError) -> Result<String, ResolveError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.clone()),
        _ => Err(missing),
    }
}

/// Split `NAME=VALUE` on the first `=`. A bare `NAME` sets an empty value.
pub fn parse_env_entry(entry: &str) -> Result<(String, String), ResolveError> {
    let (name, value) = entry.split_once('=').unwrap_or((entry, ""));
    if name.is_empty() {
        return Err(ResolveError::EmptyEnvName(entry.to_string()));
    }
    Ok((name.to_string(), value.to_string()))
}

impl Config {
    pub fn resolve(args: &ForwardArgs) -> Result<Self, ResolveError> {
        let command = required(&args.command, ResolveError::MissingCommand)?;
        let topic = required(&args.topic, ResolveError::MissingTopic)?;
        let broker_url = required(&args.broker_url, ResolveError::MissingBrokerUrl)?;

        if args.client_id.is_empty() || args.client_id.starts_with(' ') {
            return Err(ResolveError::InvalidClientId(args.client_id.clone()));
        }

        let extra_env = args
            .env
            .iter()
            .map(|e| parse_env_entry(e))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Config {
            command,
            topic,
            broker_url,
            client_id: args.client_id.clone(),
            username: args.userid.clone(),
            password: args.password.clone(),
            split_streams: args.stdtopic,
            extra_env,
            tokenizer: args.tokenizer,
            keep_empty: args.keep_empty,
        })
    }
}
