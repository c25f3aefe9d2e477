//! Configuration module for pdf-audit
//!
//! This module handles loading, parsing, and validating TOML configuration files,
//! and validating the per-job [`AuditOptions`].
//!
//! # Example
//!
//! ```no_run
//! use pdf_audit::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("audit.toml")).unwrap();
//! println!("Default max depth: {}", config.audit.max_depth);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    AuditDefaults, AuditOptions, Config, CrawlerConfig, StorageConfig, SupervisorConfig,
    UserAgentConfig, ValidatorConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::{validate_job_options, validate_options};
