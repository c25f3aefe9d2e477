//! Result and report types consumed by the external renderer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use uuid::Uuid;

/// Verdict of one validated resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    /// The validator judged the document compliant
    Pass,
    /// The validator judged the document non-compliant
    Fail,
    /// The document could not be tested (download, tool or output problem)
    Error,
    /// The validator exceeded its wall-clock limit and was killed
    Timeout,
}

impl ValidationStatus {
    /// Returns true if the verdict came from the validator itself
    pub fn is_verdict(&self) -> bool {
        matches!(self, Self::Pass | Self::Fail)
    }

    /// Sort key used for display: PASS, FAIL, then everything else
    pub fn display_rank(&self) -> u8 {
        match self {
            Self::Pass => 0,
            Self::Fail => 1,
            Self::Error | Self::Timeout => 2,
        }
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Error => "ERROR",
            Self::Timeout => "TIMEOUT",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of a single rule check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingOutcome {
    Passed,
    Failed,
}

/// One rule-level finding reported by the validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleFinding {
    pub rule_id: String,
    pub outcome: FindingOutcome,
    pub message: String,
}

/// Result of validating one resource. Never modified after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Identity of the validated resource: `sha256:<hex>` once downloaded,
    /// the normalized URL when the download never completed
    pub resource_ref: String,

    /// URL the resource was first fetched from
    pub source_url: String,

    pub status: ValidationStatus,

    /// Findings in the order the validator reported them
    pub rule_findings: Vec<RuleFinding>,

    /// Captured validator stdout (empty if the validator never ran)
    pub raw_output: String,

    /// Validation profile named by the validator, if any
    pub profile: Option<String>,

    pub byte_size: Option<u64>,

    /// Time spent in the validator (0 if it never ran)
    pub duration_ms: u64,

    /// Diagnostic for ERROR and TIMEOUT results
    pub message: Option<String>,
}

impl ValidationResult {
    /// Builds an ERROR result for a resource that was never validated
    pub fn error(
        resource_ref: impl Into<String>,
        source_url: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            resource_ref: resource_ref.into(),
            source_url: source_url.into(),
            status: ValidationStatus::Error,
            rule_findings: Vec::new(),
            raw_output: String::new(),
            profile: None,
            byte_size: None,
            duration_ms: 0,
            message: Some(message.into()),
        }
    }

    /// Number of findings with a failed outcome
    pub fn failed_rules(&self) -> usize {
        self.rule_findings
            .iter()
            .filter(|f| f.outcome == FindingOutcome::Failed)
            .count()
    }
}

/// Passed/failed counts of one rule across all validated files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleTally {
    pub passed: u64,
    pub failed: u64,
}

/// Running counts of a report
///
/// `pass_count + fail_count + error_count == total_files` always holds;
/// `timeout_count` is the share of `error_count` caused by timeouts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_files: u64,
    pub pass_count: u64,
    pub fail_count: u64,
    pub error_count: u64,
    pub timeout_count: u64,
}

impl ReportSummary {
    /// Checks the counting invariant
    pub fn is_consistent(&self) -> bool {
        self.pass_count + self.fail_count + self.error_count == self.total_files
            && self.timeout_count <= self.error_count
    }

    /// Percentage of files that passed
    pub fn pass_rate(&self) -> f64 {
        if self.total_files == 0 {
            0.0
        } else {
            (self.pass_count as f64 / self.total_files as f64) * 100.0
        }
    }
}

/// Final, immutable report of a COMPLETE job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub job_id: Uuid,
    pub target_url: String,
    pub validator_version: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub total_files: u64,
    pub pass_count: u64,
    pub fail_count: u64,
    pub error_count: u64,
    pub timeout_count: u64,

    /// rule_id -> passed/failed counts
    pub rule_breakdown: BTreeMap<String, RuleTally>,

    /// resource_ref -> further URLs that served identical content
    pub aliases: BTreeMap<String, Vec<String>>,

    /// Results in completion order
    pub results: Vec<ValidationResult>,
}

impl AuditReport {
    /// The report's counts as a summary
    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            total_files: self.total_files,
            pass_count: self.pass_count,
            fail_count: self.fail_count,
            error_count: self.error_count,
            timeout_count: self.timeout_count,
        }
    }

    /// Results ordered PASS, FAIL, then ERROR/TIMEOUT; completion order within a group
    pub fn sorted_for_display(&self) -> Vec<&ValidationResult> {
        let mut sorted: Vec<&ValidationResult> = self.results.iter().collect();
        sorted.sort_by_key(|r| r.status.display_rank());
        sorted
    }

    /// Aliases recorded for a resource
    pub fn aliases_of(&self, resource_ref: &str) -> &[String] {
        self.aliases
            .get(resource_ref)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Writes the report as pretty-printed JSON for the renderer
    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
    }
}
