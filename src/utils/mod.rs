//! Utilities: logging setup (verbosity flags -> tracing filter).
//!
//! Key items:
//!   init_logging / derive_level

/// Logging helpers.
pub mod logging {
    use tracing_subscriber::EnvFilter;

    #[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
    pub enum LogLevel {
        Error = 0,
        Info = 1,
        Debug = 2,
        Trace = 3,
    }

    impl LogLevel {
        pub fn as_str(&self) -> &'static str {
            match self {
                LogLevel::Error => "error",
                LogLevel::Info => "info",
                LogLevel::Debug => "debug",
                LogLevel::Trace => "trace",
            }
        }
    }

    pub fn derive_level(verbose: u8, quiet: bool) -> LogLevel {
        if quiet {
            return LogLevel::Error;
        }
        match verbose {
            0 => LogLevel::Info,
            1 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    /// Filter directives for a level. The MQTT client stays at warn unless tracing
    /// everything, otherwise its per-packet chatter drowns the forwarded lines.
    pub fn filter_directives(level: LogLevel) -> String {
        match level {
            LogLevel::Trace => "trace".to_string(),
            other => format!("{},rumqttc=warn", other.as_str()),
        }
    }

    /// Install the global subscriber. `RUST_LOG` wins over the flag-derived level.
    ///
    /// Output goes to stderr so usage text on stdout is never interleaved with log lines.
    pub fn init_logging(level: LogLevel) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(filter_directives(level)));

        // A second init (tests) is harmless; keep the first subscriber.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    }
}

pub use logging::{derive_level, init_logging};
