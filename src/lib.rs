//! Catalog-Harvest: an incremental, polite parts-catalog harvester
//!
//! This crate crawls a paginated parts catalog through a single rate-limited
//! fetcher, ingests the parsed pages into a normalized SQLite store
//! (groups, subgroups, diagrams, parts), and repairs the duplication the
//! source site introduces with idempotent consolidation passes.

pub mod catalog;
pub mod config;
pub mod consolidate;
pub mod crawler;
pub mod output;
pub mod state;
pub mod storage;
pub mod tags;
pub mod url;

use thiserror::Error;

/// Main error type for Catalog-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

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
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("URL is outside the catalog root: {0}")]
    OutsideCatalog(String),

    #[error("Unexpected path depth for {url}: expected {expected} segments, got {actual}")]
    Depth {
        url: String,
        expected: usize,
        actual: usize,
    },
}

/// Result type alias for Catalog-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{AdaptiveFetcher, FetchResult, Harvester};
pub use state::{CrawlStatus, DelayController, SessionState};
pub use storage::{SqliteStorage, Storage};
