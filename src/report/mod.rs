//! Validation results and the report built from them

mod aggregator;
mod types;

pub use aggregator::Aggregator;
pub use types::{
    AuditReport, FindingOutcome, ReportSummary, RuleFinding, RuleTally, ValidationResult,
    ValidationStatus,
};
