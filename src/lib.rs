//! Tourney-Harvest: a resilient concurrent record harvester
//!
//! This crate fetches per-entity records (tournament details) from a
//! rate-limited remote source. It drives a bounded worker pool through an
//! adaptive token-bucket rate limiter, retries transient failures in
//! successive passes, and checkpoints accumulated results while it runs.

pub mod config;
pub mod crawler;
pub mod input;
pub mod output;
pub mod state;

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Tourney-Harvest operations
///
/// Per-item fetch failures are not represented here; they are recorded as
/// [`state::Outcome`]s. Only run-aborting conditions surface as a
/// `HarvestError`.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to read work list {path}: {source}")]
    Input {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("No work items found in {path}")]
    EmptyInput { path: PathBuf },

    #[error("No work items to process")]
    NoWork,

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Failed to write output {path}: {source}")]
    Output {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("No input selected: specify an input path or a year and month")]
    MissingInput,
}

/// Result type alias for Tourney-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Fetcher, Harvester, HttpFetcher};
pub use state::{ErrorClass, FetchError, Outcome, WorkItem};
