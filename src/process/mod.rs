//! Command line handling for the forwarded child process.
//!
//! parse_command -> CommandSpec { program, args }
//! spawn -> tokio Child with piped stdout/stderr and an explicit environment.
//!
use shell_words::split as shell_split;
use std::fmt;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::{Child, Command};

/// How a `--command` string is turned into an argument vector.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Tokenizer {
    /// POSIX shell-style words: quotes and backslash escapes are honoured
    #[default]
    Shell,
    /// Trim, then split on every single space (no quoting)
    Naive,
}

impl fmt::Display for Tokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Tokenizer::Shell => "shell",
            Tokenizer::Naive => "naive",
        })
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("command string is empty")]
    Empty,

    #[error("empty program name in command '{0}'")]
    EmptyProgram(String),

    #[error("failed to parse command '{command}': {source}")]
    Parse {
        command: String,
        #[source]
        source: shell_words::ParseError,
    },

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// A tokenized command ready to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args.is_empty() {
            write!(f, "{}", self.program)
        } else {
            write!(f, "{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Split a raw command line into program + arguments.
///
/// The naive tokenizer keeps empty tokens produced by runs of spaces
/// (`"ls  -l"` -> `["ls", "", "-l"]`), so the child sees exactly what a
/// literal split would give it.
pub fn parse_command(raw: &str, tokenizer: Tokenizer) -> Result<CommandSpec, CommandError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CommandError::Empty);
    }

    let mut parts: Vec<String> = match tokenizer {
        Tokenizer::Shell => shell_split(trimmed).map_err(|source| CommandError::Parse {
            command: raw.to_string(),
            source,
        })?,
        Tokenizer::Naive => trimmed.split(' ').map(str::to_string).collect(),
    };
    if parts.is_empty() {
        return Err(CommandError::Empty);
    }

    let program = parts.remove(0);
    if program.is_empty() {
        return Err(CommandError::EmptyProgram(raw.to_string()));
    }
    Ok(CommandSpec {
        program,
        args: parts,
    })
}

/// Build the tokio command: inherited environment plus `extra_env` overrides,
/// applied to this child only.
pub fn build_command(spec: &CommandSpec, extra_env: &[(String, String)]) -> Command {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .envs(extra_env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// Spawn the child with both output streams piped.
pub fn spawn(spec: &CommandSpec, extra_env: &[(String, String)]) -> Result<Child, CommandError> {
    for (name, value) in extra_env {
        tracing::info!("Setting environment variable {name} to {value}");
    }
    build_command(spec, extra_env)
        .spawn()
        .map_err(|source| CommandError::Spawn {
            program: spec.program.clone(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_simple() {
        let spec = parse_command("tail -f /var/log/syslog", Tokenizer::Shell).unwrap();
        assert_eq!(spec.program, "tail");
        assert_eq!(spec.args, vec!["-f", "/var/log/syslog"]);
    }

    #[test]
    fn shell_quoted() {
        let spec = parse_command(r#"my-server --path "/tmp/my dir""#, Tokenizer::Shell).unwrap();
        assert_eq!(spec.args, vec!["--path", "/tmp/my dir"]);
    }

    #[test]
    fn shell_unbalanced_quote_rejected() {
        let err = parse_command(r#"echo "oops"#, Tokenizer::Shell).unwrap_err();
        assert!(matches!(err, CommandError::Parse { .. }));
    }

    #[test]
    fn naive_splits_on_each_space() {
        let spec = parse_command("  ls  -l  ", Tokenizer::Naive).unwrap();
        assert_eq!(spec.program, "ls");
        assert_eq!(spec.args, vec!["", "-l"]);
    }

    #[test]
    fn naive_does_not_understand_quotes() {
        let spec = parse_command(r#"echo "a b""#, Tokenizer::Naive).unwrap();
        assert_eq!(spec.args, vec!["\"a", "b\""]);
    }

    #[test]
    fn blank_command_rejected() {
        assert!(matches!(
            parse_command("   ", Tokenizer::Shell),
            Err(CommandError::Empty)
        ));
        assert!(matches!(
            parse_command("", Tokenizer::Naive),
            Err(CommandError::Empty)
        ));
    }

    #[test]
    fn empty_program_rejected() {
        let err = parse_command(r#""" -x"#, Tokenizer::Shell).unwrap_err();
        assert!(matches!(err, CommandError::EmptyProgram(_)));
    }

    #[test]
    fn display_joins_args() {
        let spec = parse_command("echo hi there", Tokenizer::Shell).unwrap();
        assert_eq!(spec.to_string(), "echo hi there");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn extra_env_reaches_child_only() {
        use tokio::io::AsyncReadExt;

        let spec = parse_command(r#"sh -c 'echo "$LOG2MQTT_TEST_FOO:$PATH"'"#, Tokenizer::Shell)
            .unwrap();
        let env = vec![("LOG2MQTT_TEST_FOO".to_string(), "bar".to_string())];
        let mut child = spawn(&spec, &env).unwrap();

        let mut out = String::new();
        child
            .stdout
            .take()
            .unwrap()
            .read_to_string(&mut out)
            .await
            .unwrap();
        child.wait().await.unwrap();

        let (foo, path) = out.trim_end().split_once(':').unwrap();
        assert_eq!(foo, "bar");
        // inherited environment still present
        assert!(!path.is_empty());
        assert!(std::env::var_os("LOG2MQTT_TEST_FOO").is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let spec = parse_command("log2mqtt-definitely-not-a-program", Tokenizer::Shell).unwrap();
        let err = spawn(&spec, &[]).unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }
}
