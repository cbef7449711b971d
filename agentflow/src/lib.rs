//! # Agentflow
//!
//! A fixed, linear agent pipeline over five remote services: a
//! language-model completion endpoint, a long-term memory store (mem0), a
//! vector database (Milvus), a tool endpoint (MCP) and a tracing backend
//! (Langfuse).
//!
//! Every run executes `llm → mem0 → milvus → mcp → final` over one shared
//! state:
//!
//! - **Isolated failures**: a failing step records `{status: "failed", error}`
//!   and the run continues
//! - **Per-step spans**: each step runs inside its own span of a run trace
//! - **Pluggable steps**: any step can be replaced by name
//! - **Checkpoints**: state is persisted after each step, keyed by thread id
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use agentflow::prelude::*;
//!
//! let config = AppConfig::from_env()?;
//! let mut initial = serde_json::Map::new();
//! initial.insert("prompt".into(), "ping".into());
//!
//! let result = run_agent(initial, &config, RunOptions::new().thread_id("t1")).await?;
//! println!("{}", serde_json::to_string_pretty(&result)?);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod checkpoint;
pub mod clients;
pub mod config;
pub mod core;
pub mod errors;
pub mod observability;
pub mod pipeline;
pub mod state;
pub mod steps;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::checkpoint::{
        build_checkpointer, Checkpoint, CheckpointBackendKind, CheckpointStore,
        MemoryCheckpointStore,
    };
    pub use crate::config::AppConfig;
    pub use crate::core::{StepName, StepResult, StepStatus};
    pub use crate::errors::{AgentflowError, ConfigError};
    pub use crate::observability::{
        send_test_trace, LangfuseBackend, LoggingTraceBackend, TraceBackend, TraceContext,
    };
    pub use crate::pipeline::{extract_result, run_agent, Pipeline, PipelineBuilder, RunOptions};
    pub use crate::state::{AgentState, StateUpdate};
    pub use crate::steps::{FnStep, Step, StepOverrides};
}
