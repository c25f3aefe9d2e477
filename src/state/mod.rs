//! State module for tracking audit jobs
//!
//! # Components
//!
//! - `JobState`: the coarse lifecycle state of a job and its legal transitions
//! - `AuditJob`: the job record (options, state, progress, timestamps, report)
//! - `JobProgress`: live counters updated as pipeline steps complete

mod job;
mod job_state;

// Re-export main types
pub use job::{AuditJob, JobProgress};
pub use job_state::JobState;
