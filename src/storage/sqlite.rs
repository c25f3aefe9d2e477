//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the JobStore trait.

use crate::config::AuditOptions;
use crate::report::{AuditReport, ValidationResult, ValidationStatus};
use crate::state::{AuditJob, JobProgress, JobState};
use crate::storage::schema::{get_schema_version, initialize_schema, SCHEMA_VERSION};
use crate::storage::traits::{JobStore, StorageError, StorageResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

const JOB_COLUMNS: &str = "id, target_url, state, options, progress, created_at, updated_at, \
                           heartbeat_at, failure_reason";

/// SQLite job store
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    /// Opens (or creates) the store at `path`
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        let found = get_schema_version(&conn)?;
        if found > SCHEMA_VERSION {
            return Err(StorageError::Corrupt(format!(
                "database schema version {} is newer than supported version {}",
                found, SCHEMA_VERSION
            )));
        }
        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory store (tests, dry runs)
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Raw `jobs` row before decoding
struct JobRow {
    id: String,
    target_url: String,
    state: String,
    options: String,
    progress: String,
    created_at: String,
    updated_at: String,
    heartbeat_at: String,
    failure_reason: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            target_url: row.get(1)?,
            state: row.get(2)?,
            options: row.get(3)?,
            progress: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
            heartbeat_at: row.get(7)?,
            failure_reason: row.get(8)?,
        })
    }

    fn into_job(self) -> StorageResult<AuditJob> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| StorageError::Corrupt(format!("job id {}: {}", self.id, e)))?;
        let state = JobState::from_db_string(&self.state)
            .ok_or_else(|| StorageError::Corrupt(format!("job state {}", self.state)))?;
        let options: AuditOptions = serde_json::from_str(&self.options)?;
        let progress: JobProgress = serde_json::from_str(&self.progress)?;

        Ok(AuditJob {
            id,
            target_url: self.target_url,
            options,
            state,
            progress,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            heartbeat_at: parse_timestamp(&self.heartbeat_at)?,
            failure_reason: self.failure_reason,
            report: None,
        })
    }
}

fn parse_timestamp(s: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt(format!("timestamp {}: {}", s, e)))
}

fn parse_status(s: &str) -> StorageResult<ValidationStatus> {
    match s {
        "PASS" => Ok(ValidationStatus::Pass),
        "FAIL" => Ok(ValidationStatus::Fail),
        "ERROR" => Ok(ValidationStatus::Error),
        "TIMEOUT" => Ok(ValidationStatus::Timeout),
        other => Err(StorageError::Corrupt(format!("result status {}", other))),
    }
}

impl JobStore for SqliteJobStore {
    fn save_job(&self, job: &AuditJob) -> StorageResult<()> {
        let options = serde_json::to_string(&job.options)?;
        let progress = serde_json::to_string(&job.progress)?;

        self.conn().execute(
            "INSERT INTO jobs (id, target_url, state, options, progress, created_at, updated_at,
                               heartbeat_at, failure_reason)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                state = excluded.state,
                progress = excluded.progress,
                updated_at = excluded.updated_at,
                heartbeat_at = excluded.heartbeat_at,
                failure_reason = excluded.failure_reason",
            params![
                job.id.to_string(),
                job.target_url,
                job.state.to_db_string(),
                options,
                progress,
                job.created_at.to_rfc3339(),
                job.updated_at.to_rfc3339(),
                job.heartbeat_at.to_rfc3339(),
                job.failure_reason,
            ],
        )?;
        Ok(())
    }

    fn load_job(&self, id: Uuid) -> StorageResult<Option<AuditJob>> {
        let row = {
            let conn = self.conn();
            let mut stmt =
                conn.prepare(&format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS))?;
            let row = stmt
                .query_row(params![id.to_string()], JobRow::from_row)
                .optional()?;
            row
        };

        let Some(row) = row else {
            return Ok(None);
        };

        let mut job = row.into_job()?;
        if job.state == JobState::Complete {
            job.report = self.load_report(id)?;
        }
        Ok(Some(job))
    }

    fn list_jobs(&self) -> StorageResult<Vec<AuditJob>> {
        let rows = {
            let conn = self.conn();
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM jobs ORDER BY created_at DESC",
                JOB_COLUMNS
            ))?;
            let rows = stmt
                .query_map([], JobRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        rows.into_iter().map(JobRow::into_job).collect()
    }

    fn save_report(&self, report: &AuditReport) -> StorageResult<()> {
        let job_id = report.job_id.to_string();
        let rule_breakdown = serde_json::to_string(&report.rule_breakdown)?;
        let aliases = serde_json::to_string(&report.aliases)?;

        let mut conn = self.conn();
        let exists: bool = conn
            .query_row("SELECT 1 FROM jobs WHERE id = ?1", params![job_id], |_| {
                Ok(true)
            })
            .optional()?
            .unwrap_or(false);
        if !exists {
            return Err(StorageError::JobNotFound(report.job_id));
        }

        let tx = conn.transaction()?;

        tx.execute(
            "INSERT OR REPLACE INTO reports (job_id, target_url, validator_version, generated_at,
                total_files, pass_count, fail_count, error_count, timeout_count,
                rule_breakdown, aliases)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                job_id,
                report.target_url,
                report.validator_version,
                report.generated_at.to_rfc3339(),
                report.total_files as i64,
                report.pass_count as i64,
                report.fail_count as i64,
                report.error_count as i64,
                report.timeout_count as i64,
                rule_breakdown,
                aliases,
            ],
        )?;

        tx.execute("DELETE FROM results WHERE job_id = ?1", params![job_id])?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO results (job_id, seq, resource_ref, source_url, status, rule_findings,
                    raw_output, profile, byte_size, duration_ms, message)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;

            for (seq, result) in report.results.iter().enumerate() {
                stmt.execute(params![
                    job_id,
                    seq as i64,
                    result.resource_ref,
                    result.source_url,
                    result.status.to_string(),
                    serde_json::to_string(&result.rule_findings)?,
                    result.raw_output,
                    result.profile,
                    result.byte_size.map(|b| b as i64),
                    result.duration_ms as i64,
                    result.message,
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn load_report(&self, job_id: Uuid) -> StorageResult<Option<AuditReport>> {
        let conn = self.conn();
        let id = job_id.to_string();

        let header = conn
            .query_row(
                "SELECT target_url, validator_version, generated_at, total_files, pass_count,
                        fail_count, error_count, timeout_count, rule_breakdown, aliases
                 FROM reports WHERE job_id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                        [
                            row.get::<_, i64>(3)?,
                            row.get::<_, i64>(4)?,
                            row.get::<_, i64>(5)?,
                            row.get::<_, i64>(6)?,
                            row.get::<_, i64>(7)?,
                        ],
                        row.get::<_, String>(8)?,
                        row.get::<_, String>(9)?,
                    ))
                },
            )
            .optional()?;

        let Some((target_url, validator_version, generated_at, counts, rules, aliases)) = header
        else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT resource_ref, source_url, status, rule_findings, raw_output, profile,
                    byte_size, duration_ms, message
             FROM results WHERE job_id = ?1 ORDER BY seq",
        )?;

        let raw = stmt
            .query_map(params![id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<i64>>(6)?,
                    row.get::<_, i64>(7)?,
                    row.get::<_, Option<String>>(8)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut results = Vec::with_capacity(raw.len());
        for (resource_ref, source_url, status, findings, raw_output, profile, size, ms, message) in
            raw
        {
            results.push(ValidationResult {
                resource_ref,
                source_url,
                status: parse_status(&status)?,
                rule_findings: serde_json::from_str(&findings)?,
                raw_output,
                profile,
                byte_size: size.map(|b| b as u64),
                duration_ms: ms as u64,
                message,
            });
        }

        Ok(Some(AuditReport {
            job_id,
            target_url,
            validator_version,
            generated_at: parse_timestamp(&generated_at)?,
            total_files: counts[0] as u64,
            pass_count: counts[1] as u64,
            fail_count: counts[2] as u64,
            error_count: counts[3] as u64,
            timeout_count: counts[4] as u64,
            rule_breakdown: serde_json::from_str(&rules)?,
            aliases: serde_json::from_str(&aliases)?,
            results,
        }))
    }

    fn mark_interrupted(&self, reason: &str) -> StorageResult<usize> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn().execute(
            "UPDATE jobs SET state = ?1, failure_reason = ?2, updated_at = ?3
             WHERE state NOT IN ('complete', 'failed', 'cancelled')",
            params![JobState::Cancelled.to_db_string(), reason, now],
        )?;
        Ok(changed)
    }

    fn delete_job(&self, id: Uuid) -> StorageResult<bool> {
        let changed = self
            .conn()
            .execute("DELETE FROM jobs WHERE id = ?1", params![id.to_string()])?;
        Ok(changed > 0)
    }
}
