//! Log output setup for the binary
//!
//! Library code only emits `tracing` events; this installs the subscriber.
//! `RUST_LOG`, when set, wins over the command-line level.

use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// Verbosity selectable on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// How logs should be written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogConfig {
    pub level: LogLevel,
    /// One JSON object per line instead of text
    pub json: bool,
    /// Suppress all log output
    pub quiet: bool,
}

impl LogConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub fn directive(&self) -> &'static str {
        if self.quiet {
            "off"
        } else {
            self.level.as_str()
        }
    }
}

/// Installs the global subscriber, writing to stderr
///
/// Does nothing if a subscriber is already installed.
pub fn init(config: &LogConfig) {
    let filter = if config.quiet {
        EnvFilter::new("off")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.directive()))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let _ = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
