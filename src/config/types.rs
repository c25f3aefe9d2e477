use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for pdf-audit
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Defaults applied to every audit unless overridden per job
    #[serde(default)]
    pub audit: AuditDefaults,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub validator: ValidatorConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
}

impl Config {
    /// Builds the per-job options from the configured defaults
    pub fn default_options(&self) -> AuditOptions {
        AuditOptions {
            max_depth: self.audit.max_depth,
            max_pages: self.audit.max_pages,
            per_file_timeout: Duration::from_secs(self.audit.per_file_timeout_secs),
            max_file_size: self.audit.max_file_size,
            same_origin_only: self.audit.same_origin_only,
        }
    }
}

/// Default per-job audit options
#[derive(Debug, Clone, Deserialize)]
pub struct AuditDefaults {
    /// Maximum link depth from the start page
    #[serde(rename = "max-depth", default = "default_max_depth")]
    pub max_depth: u32,

    /// Maximum number of pages fetched per job
    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: u32,

    /// Wall-clock limit for one validator run (seconds)
    #[serde(rename = "per-file-timeout-secs", default = "default_per_file_timeout")]
    pub per_file_timeout_secs: u64,

    /// Largest PDF that is downloaded (bytes)
    #[serde(rename = "max-file-size", default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Only follow links on the start URL's host
    #[serde(rename = "same-origin-only", default = "default_true")]
    pub same_origin_only: bool,
}

impl Default for AuditDefaults {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_pages: default_max_pages(),
            per_file_timeout_secs: default_per_file_timeout(),
            max_file_size: default_max_file_size(),
            same_origin_only: true,
        }
    }
}

/// Crawler and pipeline behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum number of concurrent page fetches and downloads
    #[serde(rename = "max-concurrent-fetches", default = "default_fetches")]
    pub max_concurrent_fetches: u32,

    /// Maximum number of validator processes alive at once
    #[serde(rename = "max-concurrent-validations", default = "default_validations")]
    pub max_concurrent_validations: u32,

    /// Timeout for one page fetch (seconds)
    #[serde(rename = "page-timeout-secs", default = "default_page_timeout")]
    pub page_timeout_secs: u64,

    /// Timeout for one PDF download (seconds)
    #[serde(rename = "download-timeout-secs", default = "default_download_timeout")]
    pub download_timeout_secs: u64,

    /// Minimum delay between two page fetch dispatches (milliseconds)
    #[serde(rename = "politeness-delay-ms", default = "default_politeness_delay")]
    pub politeness_delay_ms: u64,

    /// Skip pages disallowed by the site's robots.txt
    #[serde(rename = "respect-robots-txt", default = "default_true")]
    pub respect_robots_txt: bool,

    /// Seed PDFs from sitemap.xml / sitemap_index.xml
    #[serde(rename = "use-sitemap", default = "default_true")]
    pub use_sitemap: bool,

    /// Extra host patterns (e.g. "*.example.org") followed even in same-origin mode
    #[serde(rename = "allowed-hosts", default)]
    pub allowed_hosts: Vec<String>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: default_fetches(),
            max_concurrent_validations: default_validations(),
            page_timeout_secs: default_page_timeout(),
            download_timeout_secs: default_download_timeout(),
            politeness_delay_ms: default_politeness_delay(),
            respect_robots_txt: true,
            use_sitemap: true,
            allowed_hosts: Vec::new(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Product token matched against robots.txt `User-agent` lines
    pub fn robots_token(&self) -> &str {
        &self.crawler_name
    }

    /// Format: CrawlerName/Version (+ContactURL; ContactEmail)
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// External validator invocation
#[derive(Debug, Clone, Deserialize)]
pub struct ValidatorConfig {
    /// Executable to run; the PDF path is appended as the last argument
    pub command: String,

    /// Arguments placed before the file path
    #[serde(default)]
    pub args: Vec<String>,

    /// Arguments used to query the tool's version
    #[serde(rename = "version-args", default = "default_version_args")]
    pub version_args: Vec<String>,

    /// Cap on captured stdout/stderr per invocation (bytes)
    #[serde(rename = "max-output-bytes", default = "default_max_output")]
    pub max_output_bytes: usize,
}

/// Working directory and job store locations
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root of the per-job download directories
    #[serde(rename = "work-dir", default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Path to the SQLite job store
    #[serde(rename = "database-path", default = "default_database_path")]
    pub database_path: PathBuf,

    /// Job directories older than this are removed at startup
    #[serde(rename = "retention-days", default = "default_retention_days")]
    pub retention_days: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            database_path: default_database_path(),
            retention_days: default_retention_days(),
        }
    }
}

/// Heartbeat and stall detection
#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorConfig {
    /// Refresh the heartbeat every N processed items
    #[serde(rename = "heartbeat-every", default = "default_heartbeat_every")]
    pub heartbeat_every: u64,

    /// A job whose heartbeat is older than this is considered stalled (seconds)
    #[serde(rename = "stall-threshold-secs", default = "default_stall_threshold")]
    pub stall_threshold_secs: u64,

    /// How often the supervisor looks for stalled jobs (seconds)
    #[serde(rename = "check-interval-secs", default = "default_check_interval")]
    pub check_interval_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            heartbeat_every: default_heartbeat_every(),
            stall_threshold_secs: default_stall_threshold(),
            check_interval_secs: default_check_interval(),
        }
    }
}

/// Options for a single audit run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditOptions {
    pub max_depth: u32,
    pub max_pages: u32,
    pub per_file_timeout: Duration,
    pub max_file_size: u64,
    pub same_origin_only: bool,
}

impl Default for AuditOptions {
    fn default() -> Self {
        AuditDefaults::default().into()
    }
}

impl From<AuditDefaults> for AuditOptions {
    fn from(defaults: AuditDefaults) -> Self {
        Self {
            max_depth: defaults.max_depth,
            max_pages: defaults.max_pages,
            per_file_timeout: Duration::from_secs(defaults.per_file_timeout_secs),
            max_file_size: defaults.max_file_size,
            same_origin_only: defaults.same_origin_only,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_depth() -> u32 {
    1
}

fn default_max_pages() -> u32 {
    50
}

fn default_per_file_timeout() -> u64 {
    120
}

fn default_max_file_size() -> u64 {
    50 * 1024 * 1024
}

fn default_fetches() -> u32 {
    4
}

fn default_validations() -> u32 {
    2
}

fn default_page_timeout() -> u64 {
    10
}

fn default_download_timeout() -> u64 {
    60
}

fn default_politeness_delay() -> u64 {
    200
}

fn default_version_args() -> Vec<String> {
    vec!["--version".to_string()]
}

fn default_max_output() -> usize {
    4 * 1024 * 1024
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("./audit-data")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./audit-data/jobs.db")
}

fn default_retention_days() -> u32 {
    14
}

fn default_heartbeat_every() -> u64 {
    5
}

fn default_stall_threshold() -> u64 {
    600
}

fn default_check_interval() -> u64 {
    30
}
