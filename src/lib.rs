//! pdf-audit: accessibility auditing for the PDF documents a website publishes
//!
//! This crate crawls a website for PDF links, downloads each distinct document,
//! runs an external accessibility validator against it and folds the verdicts
//! into a per-job report. One audit run is owned end to end by a job
//! controller; the [`facade::AuditService`] is the entry point a front-end talks to.

pub mod config;
pub mod crawler;
pub mod download;
pub mod facade;
pub mod job;
pub mod report;
pub mod robots;
pub mod state;
pub mod storage;
pub mod url;
pub mod validator;

use thiserror::Error;

/// Main error type for audit operations
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Start URL {url} is unreachable: {reason}")]
    StartUnreachable { url: String, reason: String },

    #[error("Storage error: {0}")]
    StorageError(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid job state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::JobState,
        to: state::JobState,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal invariant violated: {0}")]
    Invariant(String),
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

    #[error("Invalid host pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for audit operations
pub type Result<T> = std::result::Result<T, AuditError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::{AuditOptions, Config};
pub use facade::{AuditService, FacadeError};
pub use report::{AuditReport, ValidationResult, ValidationStatus};
pub use state::{AuditJob, JobState};
pub use url::{normalize_url, CrawlScope};
