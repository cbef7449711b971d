//! Error types for the agentflow pipeline.
//!
//! Errors fall into two tiers. Structural errors (`AgentflowError`) are raised
//! while a pipeline is being assembled and abort the run before any step
//! executes. Step-execution errors (`ClientError`) never leave a step: the
//! step converts them into a failed [`StepResult`](crate::core::StepResult).
//! Tracing failures (`TraceError`) are logged and swallowed.

use thiserror::Error;

/// The main error type for agentflow operations.
#[derive(Debug, Error)]
pub enum AgentflowError {
    /// Invalid or incomplete configuration.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A capability was requested that is not compiled into this build.
    #[error("{capability} is unavailable: {hint}")]
    CapabilityUnavailable {
        /// The missing capability.
        capability: String,
        /// How to enable it.
        hint: String,
    },

    /// A checkpoint backend failed.
    #[error("{0}")]
    Checkpoint(#[from] CheckpointError),

    /// A default step client could not be constructed.
    #[error("{0}")]
    Client(#[from] ClientError),
}

impl AgentflowError {
    /// Creates a capability unavailable error.
    #[must_use]
    pub fn capability_unavailable(capability: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::CapabilityUnavailable {
            capability: capability.into(),
            hint: hint.into(),
        }
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if this reports a capability missing from the build.
    #[must_use]
    pub fn is_capability_unavailable(&self) -> bool {
        matches!(self, Self::CapabilityUnavailable { .. })
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Checkpoint backend name is not recognised.
    #[error("Unsupported checkpoint backend: {0:?}")]
    UnsupportedCheckpointBackend(String),

    /// The durable checkpoint backend needs a path.
    #[error("CHECKPOINT_PATH is required for sqlite")]
    MissingCheckpointPath,

    /// A step override was registered under an unknown name.
    #[error("Unknown step: {0:?}")]
    UnknownStep(String),

    /// An environment value could not be parsed.
    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue {
        /// Variable name.
        name: String,
        /// Raw value.
        value: String,
    },

    /// The tool step has no tool to call.
    #[error("tool_name is required")]
    MissingToolName,

    /// The MCP transport name is not recognised.
    #[error("Unsupported MCP transport: {0:?}")]
    UnsupportedTransport(Option<String>),

    /// A required setting is missing.
    #[error("{name} is required")]
    Missing {
        /// The missing setting.
        name: String,
    },
}

impl ConfigError {
    /// Creates a missing setting error.
    #[must_use]
    pub fn missing(name: impl Into<String>) -> Self {
        Self::Missing { name: name.into() }
    }

    /// Creates an invalid value error.
    #[must_use]
    pub fn invalid_value(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Error raised when a step writes a key already written earlier in the run.
#[derive(Debug, Clone, Error)]
#[error("Output conflict for step '{step}': key '{key}' is already set")]
pub struct OutputConflictError {
    /// The step that attempted the write.
    pub step: String,
    /// The sealed key.
    pub key: String,
}

impl OutputConflictError {
    /// Creates a new output conflict error.
    #[must_use]
    pub fn new(step: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            key: key.into(),
        }
    }
}

/// Errors raised by checkpoint backends.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Underlying `SQLite` failure.
    #[cfg(feature = "sqlite")]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Snapshot could not be encoded or decoded.
    #[error("checkpoint serialization error: {0}")]
    Serialization(String),

    /// File-system I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The blocking task running the query failed.
    #[error("checkpoint task failed: {0}")]
    Task(String),
}

impl From<serde_json::Error> for CheckpointError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Errors raised by the remote service clients used by default steps.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// Status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The response did not have the expected shape.
    #[error("Malformed response: {0}")]
    Decode(String),

    /// The remote service reported an error in its payload.
    #[error("Remote error: {0}")]
    Remote(String),

    /// Missing or invalid client configuration.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A transport is not available.
    #[error("{0}")]
    Unavailable(String),

    /// IO error talking to a child process.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Creates a decode error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Creates a remote error.
    #[must_use]
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote(message.into())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Errors raised by tracing backends. Never surfaced to callers of a run.
#[derive(Debug, Error)]
pub enum TraceError {
    /// Tracing is not configured.
    #[error("tracing disabled: missing config")]
    Disabled,

    /// Transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// Status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// Any other backend failure.
    #[error("{0}")]
    Backend(String),
}

impl TraceError {
    /// Creates a backend error.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_messages() {
        assert_eq!(
            ConfigError::UnsupportedCheckpointBackend("nope".into()).to_string(),
            "Unsupported checkpoint backend: \"nope\""
        );
        assert_eq!(
            ConfigError::MissingCheckpointPath.to_string(),
            "CHECKPOINT_PATH is required for sqlite"
        );
        assert_eq!(ConfigError::MissingToolName.to_string(), "tool_name is required");
        assert_eq!(
            ConfigError::missing("MCP_COMMAND").to_string(),
            "MCP_COMMAND is required"
        );
    }

    #[test]
    fn test_capability_distinct_from_config() {
        let cap = AgentflowError::capability_unavailable("sqlite checkpointer", "enable the `sqlite` feature");
        let cfg = AgentflowError::from(ConfigError::MissingCheckpointPath);

        assert!(cap.is_capability_unavailable());
        assert!(!cap.is_config());
        assert!(cfg.is_config());
        assert!(!cfg.is_capability_unavailable());
        assert!(cap.to_string().contains("sqlite checkpointer"));
    }

    #[test]
    fn test_output_conflict_error() {
        let err = OutputConflictError::new("mem0", "llm");
        assert!(err.to_string().contains("mem0"));
        assert!(err.to_string().contains("'llm'"));
    }

    #[test]
    fn test_client_error_wraps_config() {
        let err = ClientError::from(ConfigError::MissingToolName);
        assert_eq!(err.to_string(), "tool_name is required");
    }
}
