//! External validator integration
//!
//! [`ValidatorInvoker`] runs the tool under a timeout; [`parse_verdict`]
//! is the single strict adapter from its stdout to a structured verdict.

mod invoker;
mod verdict;

pub use invoker::ValidatorInvoker;
pub use verdict::{parse_verdict, ParsedVerdict, VerdictError};
