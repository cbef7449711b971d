//! Step name and status enums.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::ConfigError;

/// The fixed set of pipeline steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    /// Language-model completion.
    Llm,
    /// Long-term memory add + search.
    Mem0,
    /// Vector insert + search.
    Milvus,
    /// Tool invocation.
    Mcp,
    /// Terminal aggregation; performs no I/O.
    Final,
}

impl StepName {
    /// All steps in execution order.
    pub const ALL: [Self; 5] = [Self::Llm, Self::Mem0, Self::Milvus, Self::Mcp, Self::Final];

    /// The steps whose outputs are aggregated into `result`.
    pub const DOMAIN: [Self; 4] = [Self::Llm, Self::Mem0, Self::Milvus, Self::Mcp];

    /// Returns the step name as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Llm => "llm",
            Self::Mem0 => "mem0",
            Self::Milvus => "milvus",
            Self::Mcp => "mcp",
            Self::Final => "final",
        }
    }

    /// Returns the state key this step writes.
    #[must_use]
    pub const fn output_key(self) -> &'static str {
        match self {
            Self::Final => "result",
            other => other.as_str(),
        }
    }

    /// Returns true for the step that ends a run.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Final)
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepName {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownStep(s.to_string()))
    }
}

/// The outcome of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Step completed successfully.
    Success,
    /// Step failed; the pipeline still continues.
    Failed,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl StepStatus {
    /// Returns true if the status indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}
