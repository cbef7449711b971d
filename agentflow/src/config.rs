//! Application configuration loaded from the environment.
//!
//! Every setting is optional at load time; blank values count as unset.
//! Requirements are checked where a setting is used, so a missing LLM key
//! fails the `llm` step rather than the whole run.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::errors::ConfigError;

/// Milvus connection settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MilvusConfig {
    /// Host name or base URL.
    pub host: Option<String>,
    /// Port.
    pub port: Option<u16>,
    /// Username.
    pub username: Option<String>,
    /// Password.
    pub password: Option<String>,
    /// Collection name.
    pub collection: Option<String>,
    /// Partition name.
    pub partition: Option<String>,
    /// Database name.
    pub db_name: Option<String>,
}

/// mem0 server settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mem0Config {
    /// Base URL of the mem0 REST server.
    pub server_url: Option<String>,
    /// API key, sent as `Authorization: Token <key>`.
    pub api_key: Option<String>,
    /// User the memories are filed under.
    pub user_id: Option<String>,
}

/// LLM completion endpoint settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// API key.
    pub api_key: Option<String>,
    /// Base URL of an OpenAI-compatible API.
    pub endpoint: Option<String>,
    /// Model name.
    pub model: Option<String>,
    /// Request timeout in seconds.
    pub timeout: Option<u64>,
    /// Sampling temperature.
    pub temperature: Option<f64>,
}

/// Langfuse tracing settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LangfuseConfig {
    /// Public key.
    pub public_key: Option<String>,
    /// Secret key.
    pub secret_key: Option<String>,
    /// Host URL.
    pub host: Option<String>,
    /// Environment tag merged into trace metadata.
    pub env: Option<String>,
    /// Delivery timeout in seconds.
    pub timeout: Option<u64>,
}

impl LangfuseConfig {
    /// Delivery timeout used when `LANGFUSE_TIMEOUT` is unset.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

    /// Tracing is enabled only when the public key, secret key and host are all set.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.public_key.is_some() && self.secret_key.is_some() && self.host.is_some()
    }

    /// Bound on connecting to and hearing back from the host.
    #[must_use]
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.unwrap_or(Self::DEFAULT_TIMEOUT_SECS))
    }
}

/// MCP tool endpoint settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpConfig {
    /// `stdio`, `http` or `sse`.
    pub transport: Option<String>,
    /// Server URL for `http`/`sse`.
    pub server_url: Option<String>,
    /// Tool invoked by the `mcp` step.
    pub tool_name: Option<String>,
    /// Bearer token for `http`/`sse`.
    pub api_key: Option<String>,
    /// Server command for `stdio`.
    pub command: Option<String>,
    /// Arguments for `command`.
    #[serde(default)]
    pub args: Vec<String>,
}

/// Checkpoint backend selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Backend name (`memory` or `sqlite`).
    pub backend: Option<String>,
    /// Database path for `sqlite`.
    pub path: Option<String>,
}

impl CheckpointConfig {
    /// Creates a checkpoint config.
    #[must_use]
    pub fn new(backend: Option<&str>, path: Option<&str>) -> Self {
        Self {
            backend: backend.map(str::to_string),
            path: path.map(str::to_string),
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Vector database.
    pub milvus: MilvusConfig,
    /// Memory service.
    pub mem0: Mem0Config,
    /// Language model.
    pub llm: LlmConfig,
    /// Tracing backend.
    pub langfuse: LangfuseConfig,
    /// Tool endpoint.
    pub mcp: McpConfig,
    /// Checkpoint store.
    pub checkpoint: CheckpointConfig,
}

impl AppConfig {
    /// Loads configuration from the process environment.
    ///
    /// A `.env` file in the working directory is read first; variables
    /// already present in the environment take precedence over it.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                tracing::warn!(error = %err, "Failed to read .env file");
            }
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup };

        Ok(Self {
            milvus: MilvusConfig {
                host: env.string("MILVUS_HOST"),
                port: env.parsed("MILVUS_PORT")?,
                username: env.string("MILVUS_USERNAME"),
                password: env.string("MILVUS_PASSWORD"),
                collection: env.string("MILVUS_COLLECTION"),
                partition: env.string("MILVUS_PARTITION"),
                db_name: env.string("MILVUS_DB_NAME"),
            },
            mem0: Mem0Config {
                server_url: env.string("MEM0_SERVER_URL"),
                api_key: env.string("MEM0_API_KEY"),
                user_id: env.string("MEM0_USER_ID"),
            },
            llm: LlmConfig {
                api_key: env.string("LLM_API_KEY"),
                endpoint: env.string("LLM_ENDPOINT"),
                model: env.string("LLM_MODEL"),
                timeout: env.parsed("LLM_TIMEOUT")?,
                temperature: env.parsed("LLM_TEMPERATURE")?,
            },
            langfuse: LangfuseConfig {
                public_key: env.string("LANGFUSE_PUBLIC_KEY"),
                secret_key: env.string("LANGFUSE_SECRET_KEY"),
                host: env.string("LANGFUSE_HOST"),
                env: env.string("LANGFUSE_ENV"),
                timeout: env.parsed("LANGFUSE_TIMEOUT")?,
            },
            mcp: McpConfig {
                transport: env.string("MCP_TRANSPORT"),
                server_url: env.string("MCP_SERVER_URL"),
                tool_name: env.string("MCP_TOOL_NAME"),
                api_key: env.string("MCP_API_KEY"),
                command: env.string("MCP_COMMAND"),
                args: match env.string("MCP_ARGS") {
                    Some(raw) => split_args(&raw)
                        .ok_or_else(|| ConfigError::invalid_value("MCP_ARGS", raw))?,
                    None => Vec::new(),
                },
            },
            checkpoint: CheckpointConfig {
                backend: env.string("CHECKPOINT_BACKEND"),
                path: env.string("CHECKPOINT_PATH"),
            },
        })
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        normalize((self.lookup)(name))
    }

    fn parsed<T: FromStr>(&self, name: &str) -> Result<Option<T>, ConfigError> {
        match self.string(name) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|_| ConfigError::invalid_value(name, raw)),
        }
    }
}

/// Treats whitespace-only values as unset.
#[must_use]
pub fn normalize(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Splits a command-line string into words using POSIX shell quoting rules.
///
/// Returns `None` on an unterminated quote or a trailing escape.
#[must_use]
pub fn split_args(raw: &str) -> Option<Vec<String>> {
    shlex::split(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_load_config_reads_env() {
        let config = AppConfig::from_lookup(lookup(&[
            ("MILVUS_HOST", "127.0.0.1"),
            ("MILVUS_PORT", "19530"),
            ("MILVUS_USERNAME", "test_user"),
            ("MILVUS_PASSWORD", ""),
            ("MILVUS_COLLECTION", "agent_vectors"),
            ("MILVUS_PARTITION", "  "),
            ("MILVUS_DB_NAME", "default"),
            ("MEM0_SERVER_URL", "http://localhost:8888"),
            ("MEM0_API_KEY", "mem0_key"),
            ("MEM0_USER_ID", "user_001"),
            ("LLM_API_KEY", "llm_key"),
            ("LLM_ENDPOINT", "http://llm.local"),
            ("LLM_MODEL", "gpt-test"),
            ("LLM_TIMEOUT", "45"),
            ("LLM_TEMPERATURE", "0.2"),
            ("LANGFUSE_PUBLIC_KEY", "lf_pub"),
            ("LANGFUSE_SECRET_KEY", "lf_sec"),
            ("LANGFUSE_HOST", "http://langfuse.local"),
            ("LANGFUSE_ENV", "test"),
            ("LANGFUSE_TIMEOUT", "2"),
            ("MCP_TRANSPORT", "stdio"),
            ("MCP_SERVER_URL", "http://mcp.local"),
            ("MCP_TOOL_NAME", "echo"),
            ("MCP_API_KEY", "mcp_key"),
            ("MCP_COMMAND", "node"),
            ("MCP_ARGS", "--foo bar --baz=1"),
            ("CHECKPOINT_BACKEND", "memory"),
            ("CHECKPOINT_PATH", "/tmp/checkpoints"),
        ]))
        .unwrap();

        assert_eq!(config.milvus.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(config.milvus.port, Some(19530));
        assert_eq!(config.milvus.username.as_deref(), Some("test_user"));
        assert_eq!(config.milvus.password, None);
        assert_eq!(config.milvus.partition, None);
        assert_eq!(config.milvus.db_name.as_deref(), Some("default"));

        assert_eq!(config.mem0.user_id.as_deref(), Some("user_001"));

        assert_eq!(config.llm.timeout, Some(45));
        assert_eq!(config.llm.temperature, Some(0.2));

        assert!(config.langfuse.is_enabled());
        assert_eq!(config.langfuse.env.as_deref(), Some("test"));
        assert_eq!(config.langfuse.delivery_timeout(), Duration::from_secs(2));

        assert_eq!(config.mcp.transport.as_deref(), Some("stdio"));
        assert_eq!(config.mcp.args, vec!["--foo", "bar", "--baz=1"]);

        assert_eq!(config.checkpoint.backend.as_deref(), Some("memory"));
        assert_eq!(config.checkpoint.path.as_deref(), Some("/tmp/checkpoints"));
    }

    #[test]
    fn test_empty_environment_is_all_unset() {
        let config = AppConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(!config.langfuse.is_enabled());
    }

    #[test]
    fn test_invalid_cast_names_variable() {
        let err = AppConfig::from_lookup(lookup(&[("MILVUS_PORT", "not-a-port")])).unwrap_err();
        assert_eq!(err, ConfigError::invalid_value("MILVUS_PORT", "not-a-port"));
        assert!(err.to_string().contains("MILVUS_PORT"));
    }

    #[test]
    fn test_langfuse_requires_all_three() {
        let config = LangfuseConfig {
            public_key: Some("pk".into()),
            secret_key: None,
            host: Some("http://h".into()),
            env: None,
            timeout: None,
        };
        assert!(!config.is_enabled());
        assert_eq!(
            config.delivery_timeout(),
            Duration::from_secs(LangfuseConfig::DEFAULT_TIMEOUT_SECS)
        );
    }

    #[test]
    fn test_split_args_quoting() {
        assert_eq!(split_args("").unwrap(), Vec::<String>::new());
        assert_eq!(
            split_args(r#"-m "my server" 'a b' c\ d"#).unwrap(),
            vec!["-m", "my server", "a b", "c d"]
        );
        assert_eq!(split_args(r#""""#).unwrap(), vec![""]);
        assert!(split_args("'unterminated").is_none());
    }

    #[test]
    fn test_unterminated_mcp_args_is_invalid() {
        let err = AppConfig::from_lookup(lookup(&[("MCP_ARGS", "\"oops")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref name, .. } if name == "MCP_ARGS"));
    }
}
