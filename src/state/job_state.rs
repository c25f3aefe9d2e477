/// Job state definitions for tracking audit progress
///
/// This module defines every state an audit job can be in and the legal
/// transitions between them.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the current coarse state of an audit job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    // ===== Active States =====
    /// Job is registered but its worker has not started
    Pending,

    /// The crawler is still discovering pages (validations may already run)
    Crawling,

    /// Crawling has finished; outstanding downloads/validations are draining
    Validating,

    /// All results are in; the report is being assembled and persisted
    Aggregating,

    // ===== Terminal States =====
    /// Report is available
    Complete,

    /// Unrecoverable error; no report is produced
    Failed,

    /// Cancelled by request or by the stall supervisor
    Cancelled,
}

impl JobState {
    /// Returns true if this is a terminal state (no further transitions)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Cancelled)
    }

    /// Returns true if the job is still doing work
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Position in the forward pipeline; transitions never move backwards
    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Crawling => 1,
            Self::Validating => 2,
            Self::Aggregating => 3,
            Self::Complete | Self::Failed | Self::Cancelled => 4,
        }
    }

    /// Returns true if moving from `self` to `next` is a legal transition
    ///
    /// - forward along PENDING → CRAWLING → VALIDATING → AGGREGATING → COMPLETE
    ///   (phases may be skipped, never revisited)
    /// - FAILED from CRAWLING, VALIDATING or AGGREGATING
    /// - CANCELLED from any non-terminal state
    pub fn can_transition_to(&self, next: JobState) -> bool {
        if self.is_terminal() {
            return false;
        }

        match next {
            Self::Cancelled => true,
            Self::Failed => matches!(self, Self::Crawling | Self::Validating | Self::Aggregating),
            Self::Pending => false,
            _ => next.rank() > self.rank(),
        }
    }

    /// Converts the job state to a database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Crawling => "crawling",
            Self::Validating => "validating",
            Self::Aggregating => "aggregating",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses a job state from a database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "crawling" => Some(Self::Crawling),
            "validating" => Some(Self::Validating),
            "aggregating" => Some(Self::Aggregating),
            "complete" => Some(Self::Complete),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Returns all possible job states
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Pending,
            Self::Crawling,
            Self::Validating,
            Self::Aggregating,
            Self::Complete,
            Self::Failed,
            Self::Cancelled,
        ]
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
