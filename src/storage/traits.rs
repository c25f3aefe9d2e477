//! Storage traits and error types
//!
//! This module defines the trait interface for job store backends and
//! associated error types.

use crate::report::AuditReport;
use crate::state::AuditJob;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for job store implementations
///
/// Implementations must be shareable between the facade and running jobs.
pub trait JobStore: Send + Sync {
    /// Inserts or updates a job's header (state, progress, timestamps)
    ///
    /// The embedded report, if any, is ignored; see [`JobStore::save_report`].
    fn save_job(&self, job: &AuditJob) -> StorageResult<()>;

    /// Loads a job, including its report once COMPLETE
    fn load_job(&self, id: Uuid) -> StorageResult<Option<AuditJob>>;

    /// Lists all jobs, newest first, without reports
    fn list_jobs(&self) -> StorageResult<Vec<AuditJob>>;

    /// Persists a final report atomically
    ///
    /// The job row must exist.
    fn save_report(&self, report: &AuditReport) -> StorageResult<()>;

    /// Loads a job's report
    fn load_report(&self, job_id: Uuid) -> StorageResult<Option<AuditReport>>;

    /// Marks every non-terminal job CANCELLED with `reason`
    ///
    /// Returns the number of jobs changed.
    fn mark_interrupted(&self, reason: &str) -> StorageResult<usize>;

    /// Deletes a job and everything stored for it
    fn delete_job(&self, id: Uuid) -> StorageResult<bool>;
}
