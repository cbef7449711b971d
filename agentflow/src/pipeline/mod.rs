//! Pipeline building and execution.
//!
//! This module provides:
//! - The pipeline builder
//! - The fixed-order executor with per-step spans and checkpoints
//! - The `run_agent` entry point

mod builder;
mod executor;
mod orchestrator;

pub use builder::PipelineBuilder;
pub use executor::Pipeline;
pub use orchestrator::{extract_result, run_agent, RunOptions, DEFAULT_THREAD_ID};
