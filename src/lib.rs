//! sunmoon library
//!
//! Resolves city names to coordinates and timezones and keeps the results in
//! a crash-safe cache file shared by every process that runs the tool.

pub mod cache;
pub mod cli;
pub mod commands;
pub mod config;
pub mod data;
pub mod logging;
pub mod prepare;

pub use cache::{CacheDocument, CacheEntry, CacheError, CacheStore};
pub use config::CacheConfig;
pub use prepare::{CityContext, CityResolver, Mode, PrepareError};
