//! Core domain model types for agentflow.
//!
//! This module contains the fundamental types used throughout the pipeline:
//! - Step name and status enums
//! - The step result record

mod output;
mod status;

pub use output::StepResult;
pub use status::{StepName, StepStatus};
