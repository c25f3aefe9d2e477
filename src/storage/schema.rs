//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the job store.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per audit job; nested values are JSON
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    target_url TEXT NOT NULL,
    state TEXT NOT NULL,
    options TEXT NOT NULL,
    progress TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    heartbeat_at TEXT NOT NULL,
    failure_reason TEXT
);

CREATE INDEX IF NOT EXISTS idx_jobs_state ON jobs(state);

-- Report header of COMPLETE jobs
CREATE TABLE IF NOT EXISTS reports (
    job_id TEXT PRIMARY KEY REFERENCES jobs(id) ON DELETE CASCADE,
    target_url TEXT NOT NULL,
    validator_version TEXT,
    generated_at TEXT NOT NULL,
    total_files INTEGER NOT NULL,
    pass_count INTEGER NOT NULL,
    fail_count INTEGER NOT NULL,
    error_count INTEGER NOT NULL,
    timeout_count INTEGER NOT NULL,
    rule_breakdown TEXT NOT NULL,
    aliases TEXT NOT NULL
);

-- Per-file results in completion order
CREATE TABLE IF NOT EXISTS results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id TEXT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
    seq INTEGER NOT NULL,
    resource_ref TEXT NOT NULL,
    source_url TEXT NOT NULL,
    status TEXT NOT NULL,
    rule_findings TEXT NOT NULL,
    raw_output TEXT NOT NULL,
    profile TEXT,
    byte_size INTEGER,
    duration_ms INTEGER NOT NULL,
    message TEXT,
    UNIQUE(job_id, resource_ref)
);

CREATE INDEX IF NOT EXISTS idx_results_job ON results(job_id, seq);
"#;

/// Version stamped into `PRAGMA user_version`
pub const SCHEMA_VERSION: u32 = 1;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}

/// Reads the schema version recorded in the database
pub fn get_schema_version(conn: &rusqlite::Connection) -> Result<u32, rusqlite::Error> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
}
