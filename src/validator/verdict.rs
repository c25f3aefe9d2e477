//! Validator output schema
//!
//! The validator prints one JSON document on stdout:
//!
//! ```json
//! {"verdict": "FAIL", "profile": "PDF/UA-1",
//!  "findings": [{"rule_id": "7.1-3", "outcome": "failed", "message": "..."}]}
//! ```
//!
//! Anything else (unknown fields, trailing garbage, a verdict that
//! contradicts its findings) is rejected so that it surfaces as ERROR
//! instead of being misread as PASS or FAIL.

use crate::report::{FindingOutcome, RuleFinding, ValidationStatus};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
enum Verdict {
    Pass,
    Fail,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ValidatorOutput {
    verdict: Verdict,
    #[serde(default)]
    profile: Option<String>,
    #[serde(default)]
    findings: Vec<RuleFinding>,
}

/// A well-formed validator verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedVerdict {
    /// PASS or FAIL
    pub status: ValidationStatus,
    pub profile: Option<String>,
    /// Findings in reported order
    pub findings: Vec<RuleFinding>,
}

#[derive(Debug, Error)]
pub enum VerdictError {
    #[error("validator produced no output")]
    Empty,

    #[error("unparseable validator output: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("verdict {verdict} contradicts its findings ({failed} failed rules)")]
    Inconsistent {
        verdict: ValidationStatus,
        failed: usize,
    },
}

/// Parses validator stdout into a verdict
pub fn parse_verdict(stdout: &str) -> Result<ParsedVerdict, VerdictError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Err(VerdictError::Empty);
    }

    let output: ValidatorOutput = serde_json::from_str(trimmed)?;

    let failed = output
        .findings
        .iter()
        .filter(|f| f.outcome == FindingOutcome::Failed)
        .count();

    let status = match output.verdict {
        Verdict::Pass => ValidationStatus::Pass,
        Verdict::Fail => ValidationStatus::Fail,
    };

    let consistent = match output.verdict {
        Verdict::Pass => failed == 0,
        Verdict::Fail => output.findings.is_empty() || failed > 0,
    };
    if !consistent {
        return Err(VerdictError::Inconsistent {
            verdict: status,
            failed,
        });
    }

    Ok(ParsedVerdict {
        status,
        profile: output.profile,
        findings: output.findings,
    })
}
