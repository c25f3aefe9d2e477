//! Job execution
//!
//! A [`JobController`] owns the state of one audit; [`run_job`] drives it
//! through the pipeline on its own task.

mod controller;
mod pipeline;

pub use controller::JobController;
pub use pipeline::{run_job, PipelineContext};
