//! Command-line interface parsing for sunmoon
//!
//! This module handles parsing of CLI arguments using clap and turns them into
//! the cache and logging settings the rest of the program runs with.

use std::path::PathBuf;

use chrono::Duration;
use clap::{Args, Parser, Subcommand};
use thiserror::Error;

use crate::config::CacheConfig;
use crate::logging::{LogConfig, LogLevel};
use crate::prepare::Mode;

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    /// TTL must be at least one day
    #[error("Invalid --ttl-days: {0}. The cache TTL must be at least 1 day")]
    InvalidTtl(u32),
}

/// sunmoon - resolve cities to coordinates and timezones, with a local cache
#[derive(Parser, Debug)]
#[command(name = "sunmoon")]
#[command(about = "Resolve city names to coordinates and timezones, cached locally")]
#[command(version)]
pub struct Cli {
    /// Cache file to use instead of ~/.sunmoon-cache.json
    #[arg(long, global = true, value_name = "PATH")]
    pub cache_path: Option<PathBuf>,

    /// Days before a cached city is considered stale (default 100)
    #[arg(long, global = true, value_name = "DAYS")]
    pub ttl_days: Option<u32>,

    /// Log level: debug, info, warn or error
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Write logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Disable log output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Resolve a city, from the cache when possible
    ///
    /// Examples:
    ///   sunmoon resolve Beijing
    ///   sunmoon resolve New York --offline
    Resolve(ResolveArgs),

    /// Inspect or clear the local cache
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum CacheCommand {
    /// List cached cities
    List,
    /// Delete the cache file
    Clear {
        /// Do not ask for confirmation
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

#[derive(Args, Debug, PartialEq, Eq)]
pub struct ResolveArgs {
    /// City name; several words are joined with spaces
    #[arg(required = true, num_args = 1..)]
    pub city: Vec<String>,

    /// Only use the local cache, never the network
    #[arg(long)]
    pub offline: bool,
}

impl ResolveArgs {
    /// The city words as one name
    pub fn city(&self) -> String {
        self.city.join(" ")
    }

    pub fn mode(&self) -> Mode {
        if self.offline {
            Mode::Offline
        } else {
            Mode::Online
        }
    }
}

/// Settings derived from CLI arguments for program startup
#[derive(Debug, Clone)]
pub struct StartupConfig {
    pub cache: CacheConfig,
    pub log: LogConfig,
}

impl StartupConfig {
    /// Creates a StartupConfig from parsed CLI arguments.
    ///
    /// # Returns
    /// * `Ok(StartupConfig)` with defaults overridden by any given flags
    /// * `Err(CliError)` if a flag value is out of range
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let mut cache = match &cli.cache_path {
            Some(path) => CacheConfig::with_path(path.clone()),
            None => CacheConfig::default(),
        };

        if let Some(days) = cli.ttl_days {
            if days == 0 {
                return Err(CliError::InvalidTtl(days));
            }
            cache = cache.ttl(Duration::days(i64::from(days)));
        }

        Ok(StartupConfig {
            cache,
            log: LogConfig {
                level: cli.log_level,
                json: cli.log_json,
                quiet: cli.quiet,
            },
        })
    }
}
