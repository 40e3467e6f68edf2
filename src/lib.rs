//! Trellis-Crawl: a declarative multi-stage crawl pipeline scheduler
//!
//! This crate defines named crawl pipelines as directed graphs of processing
//! stages loaded from YAML, and schedules their execution through a shared job
//! queue. Stage handlers and aggregators are resolved by name from an explicit
//! registry; all run state lives in external stores and is re-read on every
//! query.

pub mod config;
pub mod crawler;
pub mod ops;
pub mod registry;
pub mod settings;
pub mod storage;
pub mod task;
pub mod worker;

use thiserror::Error;

/// Main error type for Trellis-Crawl operations
#[derive(Debug, Error)]
pub enum TrellisError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] storage::StoreError),

    #[error("Crawler [{0}] not found")]
    CrawlerNotFound(String),

    #[error("Stage [{stage}] not found in crawler [{crawler}]")]
    StageNotFound { crawler: String, stage: String },

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("Handler [{handler}] failed: {message}")]
    Handler { handler: String, message: String },

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Payload serialization error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
///
/// These are fatal and surface at the earliest possible point: parse and
/// stage-graph errors at crawler construction, aggregator lookup errors at the
/// first `aggregate` invocation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Failed to parse settings TOML: {0}")]
    Settings(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Stage [{referenced_by}] routes to undefined stage [{stage}]")]
    UnknownStage { stage: String, referenced_by: String },

    #[error("Stage [{stage}] names unregistered handler [{handler}]")]
    UnknownHandler { stage: String, handler: String },

    #[error("Aggregator method [{0}] is not registered")]
    UnknownAggregator(String),

    #[error("Duplicate crawler name [{0}]")]
    DuplicateCrawler(String),
}

/// Result type alias for Trellis-Crawl operations
pub type Result<T> = std::result::Result<T, TrellisError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::{PipelineConfig, Schedule, StageConfig};
pub use crawler::{Crawler, CrawlerStage, Manager};
pub use registry::Registry;
pub use settings::Settings;
pub use task::{TaskContext, TaskOutput};
