use std::ffi::OsString;

use clap::{CommandFactory, Parser, error::ErrorKind};
use tracing::{error, info};

mod cmd;
mod forward;
mod mqtt;
mod process;
mod utils;

use cmd::{Config, EXIT_FAILURE, EXIT_OK, EXIT_USAGE, ForwardArgs, ResolveError};
use utils::logging::LogLevel;

/// log2mqtt - run a command and publish its output lines to an MQTT topic
///
///   log2mqtt -c <command> -t <topic> [-u <userid>] [-P <password>] [-s] [-e NAME=VALUE]... <mqtt server url>
///
/// Every line the command writes to stdout or stderr becomes one message on
/// <topic>, or on <topic>/stdout and <topic>/stderr with -s.
///
/// Examples:
///   log2mqtt -c "tail -F /var/log/syslog" -t home/server/syslog mqtt://broker.local
///   log2mqtt -c "journalctl -f" -t logs -s -u me -P secret mqtts://broker.example
#[derive(Parser, Debug)]
#[command(
    name = "log2mqtt",
    version,
    about = "Run a command and publish its stdout/stderr lines to an MQTT topic"
)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Silence all non-error output
    #[arg(short, long)]
    quiet: bool,

    #[command(flatten)]
    args: ForwardArgs,
}

fn usage_text() -> String {
    Cli::command().render_help().to_string()
}

/// What to do with the raw argument vector, decided before anything is logged.
#[derive(Debug)]
enum Startup {
    /// Help or version text for stdout.
    Print { text: String, code: i32 },
    /// The parser rejected the arguments; `error` is its rendered message.
    BadArgs { error: String },
    /// Flags parsed but a required value is missing or invalid.
    Fatal { level: LogLevel, error: ResolveError },
    Run { level: LogLevel, config: Config },
}

impl Startup {
    /// Exit status for outcomes that end the process before forwarding starts.
    fn exit_code(&self) -> Option<i32> {
        match self {
            Startup::Print { code, .. } => Some(*code),
            Startup::BadArgs { .. } => Some(EXIT_USAGE),
            Startup::Fatal { error, .. } => Some(error.exit_code()),
            Startup::Run { .. } => None,
        }
    }
}

/// `-h` / `--help` anywhere wins, even next to arguments the parser rejects.
fn wants_help(argv: &[OsString]) -> bool {
    argv.iter()
        .skip(1)
        .take_while(|a| a.as_os_str() != "--")
        .any(|a| a.as_os_str() == "-h" || a.as_os_str() == "--help")
}

fn decide<I, T>(argv: I) -> Startup
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let argv: Vec<OsString> = argv.into_iter().map(Into::into).collect();

    let cli = match Cli::try_parse_from(&argv) {
        Ok(cli) => cli,
        Err(e) => {
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => Startup::Print {
                    text: e.render().to_string(),
                    code: EXIT_OK,
                },
                _ if wants_help(&argv) => Startup::Print {
                    text: usage_text(),
                    code: EXIT_OK,
                },
                _ => Startup::BadArgs {
                    error: e.render().to_string(),
                },
            };
        }
    };

    let level = utils::derive_level(cli.verbose, cli.quiet);
    match Config::resolve(&cli.args) {
        Ok(config) => Startup::Run { level, config },
        Err(error) => Startup::Fatal { level, error },
    }
}

fn run_exit_code(result: &anyhow::Result<()>) -> i32 {
    match result {
        Ok(()) => EXIT_OK,
        Err(_) => EXIT_FAILURE,
    }
}

fn main() {
    match decide(std::env::args_os()) {
        Startup::Print { text, code } => {
            print!("{text}");
            std::process::exit(code);
        }
        Startup::BadArgs { error } => {
            eprint!("{error}");
            std::process::exit(EXIT_USAGE);
        }
        Startup::Fatal { level, error } => {
            utils::init_logging(level);
            error!("fatal: {error}");
            // usage goes to stdout, as with --help
            println!("{}", usage_text());
            std::process::exit(error.exit_code());
        }
        Startup::Run { level, config } => {
            utils::init_logging(level);
            info!("Starting...");
            let result = cmd::execute_run(config);
            if let Err(e) = &result {
                error!("{e:#}");
            }
            std::process::exit(run_exit_code(&result));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        std::iter::once("log2mqtt")
            .chain(args.iter().copied())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn help_short_circuits_validation() {
        for args in [
            &["-h"][..],
            &["-s", "-h"],
            &["-c", "ls", "-h", "mqtt://b"],
            &["--help"],
            // arguments the parser rejects before reaching -h
            &["--bogus", "-h"],
            &["-c", "-h"],
            &["mqtt://a", "mqtt://b", "-h"],
            &["-t", "t", "--tokenizer", "weird", "--help"],
        ] {
            let startup = decide(argv(args));
            assert!(
                matches!(startup, Startup::Print { .. }),
                "{args:?} gave {startup:?}"
            );
            assert_eq!(startup.exit_code(), Some(0), "{args:?}");
        }
    }

    #[test]
    fn help_after_double_dash_is_not_a_flag() {
        let startup = decide(argv(&["--bogus", "--", "-h"]));
        assert!(matches!(startup, Startup::BadArgs { .. }));
    }

    #[test]
    fn help_text_lists_flags() {
        match decide(argv(&["--bogus", "-h"])) {
            Startup::Print { text, .. } => {
                assert!(text.contains("--command"));
                assert!(text.contains("--stdtopic"));
            }
            other => panic!("expected help, got {other:?}"),
        }
    }

    #[test]
    fn parser_errors_exit_usage() {
        for args in [&["--bogus"][..], &["-c"], &["mqtt://a", "mqtt://b"]] {
            let startup = decide(argv(args));
            assert!(matches!(startup, Startup::BadArgs { .. }), "{args:?}");
            assert_eq!(startup.exit_code(), Some(4));
        }
    }

    #[test]
    fn missing_required_fields_exit_usage() {
        for (args, expected) in [
            (&["-t", "t", "mqtt://b"][..], ResolveError::MissingCommand),
            (&["-c", "ls", "mqtt://b"], ResolveError::MissingTopic),
            (&["-c", "ls", "-t", "t"], ResolveError::MissingBrokerUrl),
        ] {
            let startup = decide(argv(args));
            assert_eq!(startup.exit_code(), Some(4), "{args:?}");
            match startup {
                Startup::Fatal { error, .. } => assert_eq!(error, expected),
                other => panic!("expected fatal, got {other:?}"),
            }
        }
    }

    #[test]
    fn valid_args_run() {
        let startup = decide(argv(&["-vv", "-c", "ls", "-t", "t", "mqtt://b"]));
        assert_eq!(startup.exit_code(), None);
        match startup {
            Startup::Run { level, config } => {
                assert_eq!(level, LogLevel::Trace);
                assert_eq!(config.command, "ls");
                assert_eq!(config.topic, "t");
                assert_eq!(config.broker_url, "mqtt://b");
            }
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn version_exits_zero() {
        let startup = decide(argv(&["-V"]));
        assert!(matches!(startup, Startup::Print { .. }));
        assert_eq!(startup.exit_code(), Some(0));
    }

    #[test]
    fn main_flow_outcome_sets_status() {
        assert_eq!(run_exit_code(&Ok(())), 0);
        assert_eq!(run_exit_code(&Err(anyhow::anyhow!("spawn failed"))), 1);
    }

    #[test]
    fn usage_mentions_required_flags() {
        let usage = usage_text();
        assert!(usage.contains("--command"));
        assert!(usage.contains("--topic"));
        assert!(usage.contains("BROKER_URL"));
    }
}
