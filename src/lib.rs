//! Wikisnap: a point-in-time wiki snapshotter
//!
//! This crate crawls a Wikidot-style wiki, persisting every page's HTML,
//! revision history, votes, discussion thread, and tags into a SQLite
//! snapshot, then exposes a read-only page facade over the snapshot.

pub mod config;
pub mod connector;
pub mod crawl;
pub mod page;
pub mod store;

use thiserror::Error;

/// Main error type for Wikisnap operations
#[derive(Debug, Error)]
pub enum WikisnapError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("Malformed module response from {module}: {message}")]
    Module { module: String, message: String },

    #[error("Store error: {0}")]
    Store(#[from] store::StoreError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Page not in snapshot: {0}")]
    PageNotInSnapshot(String),

    #[error("Malformed page {url}: {message}")]
    MalformedPage { url: String, message: String },

    #[error("No title index entry for {0}")]
    TitleNotIndexed(String),

    #[error("Page index enumeration failed: {0}")]
    Enumeration(String),

    #[error("Crawl error: {0}")]
    Crawl(String),
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

/// Result type alias for Wikisnap operations
pub type Result<T> = std::result::Result<T, WikisnapError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use connector::WikidotConnector;
pub use crawl::{take_snapshot, CrawlReport};
pub use page::{Page, Snapshot};
pub use store::SnapshotStore;
