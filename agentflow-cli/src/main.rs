mod logging;

use std::sync::Arc;

use agentflow::observability::{
    backend_from_config, send_test_trace, LoggingTraceBackend, TraceBackend,
};
use agentflow::prelude::*;
use agentflow::state::{keys, DEFAULT_MEM0_QUERY};
use anyhow::{bail, Context};
use clap::Parser;
use serde_json::{json, Map, Value};

#[derive(Parser, Debug)]
#[command(
    name = "agentflow",
    version,
    about = "Run the llm → mem0 → milvus → mcp agent pipeline once"
)]
struct Cli {
    /// Prompt sent to the language model
    #[arg(long, default_value = "ping")]
    prompt: String,

    /// Query used for the memory search
    #[arg(long, default_value = DEFAULT_MEM0_QUERY)]
    mem0_query: String,

    /// Tool arguments as a JSON object
    #[arg(long, default_value = "{}")]
    mcp_args: String,

    /// Conversation id used for checkpoints (default: a fresh UUID)
    #[arg(long)]
    thread_id: Option<String>,

    /// Send a single test trace and exit
    #[arg(long)]
    check_tracing: bool,

    /// Log spans locally when Langfuse is not configured
    #[arg(long)]
    log_spans: bool,
}

/// Parses `--mcp-args`, which must be a JSON object.
fn parse_json_args(raw: &str) -> anyhow::Result<Map<String, Value>> {
    let value: Value = serde_json::from_str(raw).context("Invalid JSON for --mcp-args")?;
    match value {
        Value::Object(map) => Ok(map),
        _ => bail!("--mcp-args must be a JSON object"),
    }
}

fn resolve_backend(config: &AppConfig, log_spans: bool) -> Option<Arc<dyn TraceBackend>> {
    backend_from_config(&config.langfuse).or_else(|| {
        log_spans.then(|| Arc::new(LoggingTraceBackend) as Arc<dyn TraceBackend>)
    })
}

async fn check_tracing(backend: Option<Arc<dyn TraceBackend>>) -> anyhow::Result<()> {
    let mut metadata = Map::new();
    metadata.insert("source".to_string(), json!("agentflow-cli"));
    let report = send_test_trace(
        backend.as_deref(),
        "tracing-check",
        "tracing-check-span",
        metadata,
        Map::new(),
    )
    .await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init("info");
    let cli = Cli::parse();

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let backend = resolve_backend(&config, cli.log_spans);

    if cli.check_tracing {
        return check_tracing(backend).await;
    }

    let mcp_args = parse_json_args(&cli.mcp_args)?;
    let thread_id = cli
        .thread_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());

    let mut initial = Map::new();
    initial.insert(keys::PROMPT.to_string(), Value::String(cli.prompt));
    initial.insert(keys::MEM0_QUERY.to_string(), Value::String(cli.mem0_query));
    initial.insert(keys::MCP_TOOL_ARGS.to_string(), Value::Object(mcp_args));

    let mut options = RunOptions::new().thread_id(thread_id.clone());
    if let Some(backend) = backend {
        options = options.trace_backend(backend);
    }

    tracing::info!(thread_id = %thread_id, "Starting agent run");
    let result = run_agent(initial, &config, options).await?;
    println!("{}", serde_json::to_string_pretty(&Value::Object(result))?);

    Ok(())
}
