//! Folds validation results into a report

use super::types::{
    AuditReport, FindingOutcome, ReportSummary, RuleTally, ValidationResult, ValidationStatus,
};
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

/// Accumulates results of one job
///
/// Adding a result whose `resource_ref` was already folded is a no-op, so
/// replays after a retry never double count.
#[derive(Debug)]
pub struct Aggregator {
    job_id: Uuid,
    seen: HashSet<String>,
    results: Vec<ValidationResult>,
    summary: ReportSummary,
    rules: BTreeMap<String, RuleTally>,
}

impl Aggregator {
    pub fn new(job_id: Uuid) -> Self {
        Self {
            job_id,
            seen: HashSet::new(),
            results: Vec::new(),
            summary: ReportSummary::default(),
            rules: BTreeMap::new(),
        }
    }

    /// Folds one result and returns the updated summary
    pub fn add(&mut self, result: ValidationResult) -> ReportSummary {
        if !self.seen.insert(result.resource_ref.clone()) {
            tracing::debug!(resource = %result.resource_ref, "ignoring duplicate result");
            return self.summary;
        }

        self.summary.total_files += 1;
        match result.status {
            ValidationStatus::Pass => self.summary.pass_count += 1,
            ValidationStatus::Fail => self.summary.fail_count += 1,
            ValidationStatus::Error => self.summary.error_count += 1,
            ValidationStatus::Timeout => {
                self.summary.error_count += 1;
                self.summary.timeout_count += 1;
            }
        }

        if result.status.is_verdict() {
            for finding in &result.rule_findings {
                let tally = self.rules.entry(finding.rule_id.clone()).or_default();
                match finding.outcome {
                    FindingOutcome::Passed => tally.passed += 1,
                    FindingOutcome::Failed => tally.failed += 1,
                }
            }
        }

        self.results.push(result);
        self.summary
    }

    pub fn summary(&self) -> ReportSummary {
        self.summary
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Produces the final report
    pub fn finish(
        self,
        target_url: impl Into<String>,
        validator_version: Option<String>,
        aliases: BTreeMap<String, Vec<String>>,
    ) -> AuditReport {
        // only keep aliases of resources that made it into the report
        let aliases = aliases
            .into_iter()
            .filter(|(key, urls)| self.seen.contains(key) && !urls.is_empty())
            .collect();

        AuditReport {
            job_id: self.job_id,
            target_url: target_url.into(),
            validator_version,
            generated_at: Utc::now(),
            total_files: self.summary.total_files,
            pass_count: self.summary.pass_count,
            fail_count: self.summary.fail_count,
            error_count: self.summary.error_count,
            timeout_count: self.summary.timeout_count,
            rule_breakdown: self.rules,
            aliases,
            results: self.results,
        }
    }
}
