//! Storage module for persisting audit jobs
//!
//! This module handles everything that outlives a process:
//! - SQLite job store initialization and schema management
//! - Job and report persistence
//! - Restart recovery of interrupted jobs
//! - Retention cleanup of per-job working directories

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteJobStore;
pub use traits::{JobStore, StorageError, StorageResult};

use std::path::Path;
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// Removes job working directories under `work_dir` older than `max_age`
///
/// Only directories named after a job id are considered; anything else in
/// `work_dir` (such as the job database) is left alone. A missing
/// `work_dir` is not an error.
///
/// Returns the number of directories removed.
pub fn remove_stale_job_dirs(work_dir: &Path, max_age: Duration) -> std::io::Result<usize> {
    let entries = match std::fs::read_dir(work_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let now = SystemTime::now();
    let mut removed = 0;

    for entry in entries {
        let entry = entry?;
        let is_job_dir = entry.file_type()?.is_dir()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| Uuid::parse_str(name).is_ok());
        if !is_job_dir {
            continue;
        }

        let modified = entry.metadata()?.modified()?;
        let age = now.duration_since(modified).unwrap_or_default();
        if age >= max_age {
            std::fs::remove_dir_all(entry.path())?;
            tracing::info!(dir = %entry.path().display(), "removed expired job directory");
            removed += 1;
        }
    }

    Ok(removed)
}
