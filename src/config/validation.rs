use crate::config::types::{
    AuditDefaults, AuditOptions, Config, CrawlerConfig, StorageConfig, SupervisorConfig,
    UserAgentConfig, ValidatorConfig,
};
use crate::{ConfigError, ConfigResult};
use std::time::Duration;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_audit_defaults(&config.audit)?;
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_validator_config(&config.validator)?;
    validate_storage_config(&config.storage)?;
    validate_supervisor_config(&config.supervisor)?;
    validate_job_options(&config.default_options(), config)?;
    Ok(())
}

/// Checks per-job options against the service configuration
///
/// A single file may go without a heartbeat for its download timeout plus
/// `per_file_timeout`; that must stay below the stall threshold or the
/// supervisor would cancel a healthy job.
pub fn validate_job_options(options: &AuditOptions, config: &Config) -> ConfigResult<()> {
    validate_options(options)?;

    let per_file = options
        .per_file_timeout
        .saturating_add(Duration::from_secs(config.crawler.download_timeout_secs));
    if per_file.as_secs() >= config.supervisor.stall_threshold_secs {
        return Err(ConfigError::Validation(format!(
            "per_file_timeout ({}s) plus download_timeout_secs ({}s) must be below stall_threshold_secs ({}s)",
            options.per_file_timeout.as_secs(),
            config.crawler.download_timeout_secs,
            config.supervisor.stall_threshold_secs
        )));
    }

    Ok(())
}

/// Validates the options of a single audit run
///
/// `max_depth >= 0` always holds for `u32`; everything else must be non-zero.
pub fn validate_options(options: &AuditOptions) -> ConfigResult<()> {
    if options.max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max_pages must be > 0, got {}",
            options.max_pages
        )));
    }

    if options.per_file_timeout.is_zero() {
        return Err(ConfigError::Validation(
            "per_file_timeout must be > 0".to_string(),
        ));
    }

    if options.max_file_size < 1 {
        return Err(ConfigError::Validation(format!(
            "max_file_size must be > 0, got {}",
            options.max_file_size
        )));
    }

    Ok(())
}

fn validate_audit_defaults(defaults: &AuditDefaults) -> ConfigResult<()> {
    validate_options(&defaults.clone().into())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> ConfigResult<()> {
    if config.max_concurrent_fetches < 1 || config.max_concurrent_fetches > 100 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_fetches must be between 1 and 100, got {}",
            config.max_concurrent_fetches
        )));
    }

    if config.max_concurrent_validations < 1 || config.max_concurrent_validations > 64 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_validations must be between 1 and 64, got {}",
            config.max_concurrent_validations
        )));
    }

    if config.page_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "page_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.download_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "download_timeout_secs must be >= 1".to_string(),
        ));
    }

    for pattern in &config.allowed_hosts {
        validate_host_pattern(pattern)?;
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> ConfigResult<()> {
    // Crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_validator_config(config: &ValidatorConfig) -> ConfigResult<()> {
    if config.command.trim().is_empty() {
        return Err(ConfigError::Validation(
            "validator command cannot be empty".to_string(),
        ));
    }

    if config.max_output_bytes < 1024 {
        return Err(ConfigError::Validation(format!(
            "max_output_bytes must be >= 1024, got {}",
            config.max_output_bytes
        )));
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> ConfigResult<()> {
    if config.work_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "work_dir cannot be empty".to_string(),
        ));
    }

    if config.database_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_supervisor_config(config: &SupervisorConfig) -> ConfigResult<()> {
    if config.heartbeat_every < 1 {
        return Err(ConfigError::Validation(
            "heartbeat_every must be >= 1".to_string(),
        ));
    }

    if config.stall_threshold_secs < 1 || config.check_interval_secs < 1 {
        return Err(ConfigError::Validation(
            "stall_threshold_secs and check_interval_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates a host pattern (supports a leading "*." wildcard)
fn validate_host_pattern(pattern: &str) -> ConfigResult<()> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Host pattern cannot be empty".to_string(),
        ));
    }

    let host = pattern.strip_prefix("*.").unwrap_or(pattern);
    validate_host_string(host)
}

/// Validates a host string (without wildcard prefix)
fn validate_host_string(host: &str) -> ConfigResult<()> {
    if host.is_empty() {
        return Err(ConfigError::InvalidPattern("Host cannot be empty".to_string()));
    }

    if !host
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Host '{}' contains invalid characters",
            host
        )));
    }

    if host.starts_with('.') || host.ends_with('.') || host.starts_with('-') || host.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Host '{}' cannot start or end with '.' or '-'",
            host
        )));
    }

    if host.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Host '{}' cannot contain consecutive dots",
            host
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> ConfigResult<()> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
