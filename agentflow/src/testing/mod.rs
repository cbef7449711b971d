//! Testing utilities for agentflow pipelines.
//!
//! This module provides:
//! - Fixed, recording and panicking steps
//! - An in-memory tracing backend and a failing checkpoint store
//! - Assertions over step results

mod assertions;
mod mocks;

pub use assertions::{assert_result_keys, assert_step_failed, assert_step_succeeded};
pub use mocks::{
    CallLog, FailingCheckpointStore, FixedStep, PanickingStep, RecordingStep,
    RecordingTraceBackend,
};
