//! The audit job record: identity, options, coarse state and progress

use crate::config::AuditOptions;
use crate::report::AuditReport;
use crate::state::JobState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Live progress counters of one job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    /// Pages fetched successfully
    pub pages_crawled: u64,

    /// Pages that were attempted but skipped (network error, robots, non-HTML)
    pub pages_skipped: u64,

    /// Distinct PDF URLs discovered
    pub files_found: u64,

    /// Discovered PDF URLs that have been fully processed
    pub files_validated: u64,
}

/// One audit run from a start URL to a final report
///
/// Owned by its job controller; callers only ever see snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditJob {
    pub id: Uuid,
    pub target_url: String,
    pub options: AuditOptions,
    pub state: JobState,
    pub progress: JobProgress,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Liveness timestamp; refreshed on transitions and every N processed items
    pub heartbeat_at: DateTime<Utc>,

    /// Human-readable reason, set when the job FAILED or was CANCELLED
    pub failure_reason: Option<String>,

    /// Present only once the job is COMPLETE
    pub report: Option<AuditReport>,
}

impl AuditJob {
    /// Creates a new PENDING job
    pub fn new(target_url: impl Into<String>, options: AuditOptions) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            target_url: target_url.into(),
            options,
            state: JobState::Pending,
            progress: JobProgress::default(),
            created_at: now,
            updated_at: now,
            heartbeat_at: now,
            failure_reason: None,
            report: None,
        }
    }

    /// Age of the heartbeat relative to `now`
    pub fn heartbeat_age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.heartbeat_at
    }
}
