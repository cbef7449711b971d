//! MCP tool client speaking JSON-RPC 2.0.
//!
//! Each call performs a full session: `initialize`, the `initialized`
//! notification, then `tools/call`. `stdio` spawns the configured server
//! command and exchanges newline-delimited messages; `http` posts to the
//! streamable HTTP endpoint and accepts either a JSON or an SSE-framed reply.
//! `sse` is the legacy transport: a long-lived event stream announces the
//! message endpoint, requests are posted there and replies arrive on the
//! stream.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{ChildStdin, ChildStdout, Command};

use super::ToolClient;
use crate::config::McpConfig;
use crate::errors::{ClientError, ConfigError};

const PROTOCOL_VERSION: &str = "2025-03-26";
const SESSION_HEADER: &str = "mcp-session-id";
const INITIALIZE_ID: u64 = 1;
const CALL_ID: u64 = 2;

/// Supported MCP transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McpTransport {
    /// Child process over stdin/stdout.
    Stdio,
    /// Streamable HTTP.
    Http,
    /// Legacy server-sent events.
    Sse,
}

impl McpTransport {
    /// Parses a transport name (case-insensitive).
    pub fn parse(name: Option<&str>) -> Result<Self, ConfigError> {
        match name.map(str::to_lowercase).as_deref() {
            Some("stdio") => Ok(Self::Stdio),
            Some("http") => Ok(Self::Http),
            Some("sse") => Ok(Self::Sse),
            _ => Err(ConfigError::UnsupportedTransport(name.map(str::to_string))),
        }
    }
}

/// Calls MCP tools over the configured transport.
#[derive(Debug, Clone)]
pub struct McpClient {
    http: reqwest::Client,
    config: McpConfig,
}

impl McpClient {
    /// Creates a client.
    #[must_use]
    pub fn new(config: &McpConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            config: config.clone(),
        }
    }

    async fn call_stdio(&self, name: &str, args: &Map<String, Value>) -> Result<Value, ClientError> {
        let command = self
            .config
            .command
            .as_deref()
            .ok_or_else(|| ConfigError::missing("MCP_COMMAND"))?;

        let mut child = Command::new(command)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ClientError::Unavailable("mcp server stdin is unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ClientError::Unavailable("mcp server stdout is unavailable".into()))?;
        let mut lines = BufReader::new(stdout).lines();

        write_message(&mut stdin, &initialize_request()).await?;
        rpc_result(read_response(&mut lines, INITIALIZE_ID).await?)?;
        write_message(&mut stdin, &initialized_notification()).await?;
        write_message(&mut stdin, &call_request(name, args)).await?;
        let response = read_response(&mut lines, CALL_ID).await?;

        drop(stdin);
        if let Err(err) = child.kill().await {
            tracing::debug!(error = %err, "mcp server already exited");
        }
        rpc_result(response)
    }

    async fn call_http(&self, name: &str, args: &Map<String, Value>) -> Result<Value, ClientError> {
        let url = self
            .config
            .server_url
            .as_deref()
            .ok_or_else(|| ConfigError::missing("MCP_SERVER_URL"))?;

        let (init, session) = self.post(url, None, &initialize_request()).await?;
        rpc_result(init.unwrap_or(Value::Null))?;
        self.post(url, session.as_deref(), &initialized_notification())
            .await?;
        let (response, _) = self
            .post(url, session.as_deref(), &call_request(name, args))
            .await?;

        rpc_result(response.ok_or_else(|| ClientError::decode("empty tools/call response"))?)
    }

    async fn call_sse(&self, name: &str, args: &Map<String, Value>) -> Result<Value, ClientError> {
        let url = self
            .config
            .server_url
            .as_deref()
            .ok_or_else(|| ConfigError::missing("MCP_SERVER_URL"))?;

        let mut request = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, "text/event-stream");
        if let Some(ref key) = self.config.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                body: response.text().await?,
            });
        }

        let mut stream = EventStream::new(response);
        let endpoint = stream.endpoint(url).await?;
        tracing::debug!(endpoint = %endpoint, "mcp sse endpoint announced");

        self.send(&endpoint, &initialize_request()).await?;
        rpc_result(stream.reply(INITIALIZE_ID).await?)?;
        self.send(&endpoint, &initialized_notification()).await?;
        self.send(&endpoint, &call_request(name, args)).await?;
        rpc_result(stream.reply(CALL_ID).await?)
    }

    /// Posts one message to an sse message endpoint; replies arrive on the stream.
    async fn send(&self, endpoint: &reqwest::Url, message: &Value) -> Result<(), ClientError> {
        let mut request = self.http.post(endpoint.clone()).json(message);
        if let Some(ref key) = self.config.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                body: response.text().await?,
            });
        }
        Ok(())
    }

    /// Posts one message; returns the decoded reply (if any) and the session id.
    async fn post(
        &self,
        url: &str,
        session: Option<&str>,
        message: &Value,
    ) -> Result<(Option<Value>, Option<String>), ClientError> {
        let mut request = self
            .http
            .post(url)
            .header(reqwest::header::ACCEPT, "application/json, text/event-stream")
            .json(message);
        if let Some(ref key) = self.config.api_key {
            request = request.bearer_auth(key);
        }
        if let Some(id) = session {
            request = request.header(SESSION_HEADER, id);
        }

        let response = request.send().await?;
        let status = response.status();
        let session = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }
        match message.get("id").and_then(Value::as_u64) {
            Some(id) => Ok((Some(decode_body(&content_type, &body, id)?), session)),
            None => Ok((None, session)),
        }
    }
}

#[async_trait]
impl ToolClient for McpClient {
    async fn call_tool(&self, name: &str, args: &Map<String, Value>) -> Result<Value, ClientError> {
        match McpTransport::parse(self.config.transport.as_deref())? {
            McpTransport::Stdio => self.call_stdio(name, args).await,
            McpTransport::Http => self.call_http(name, args).await,
            McpTransport::Sse => self.call_sse(name, args).await,
        }
    }
}

fn initialize_request() -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": INITIALIZE_ID,
        "method": "initialize",
        "params": {
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {"name": "agentflow", "version": env!("CARGO_PKG_VERSION")}
        }
    })
}

fn initialized_notification() -> Value {
    json!({"jsonrpc": "2.0", "method": "notifications/initialized"})
}

fn call_request(name: &str, args: &Map<String, Value>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": CALL_ID,
        "method": "tools/call",
        "params": {"name": name, "arguments": args}
    })
}

/// Returns the `result` member, or the `error` member as [`ClientError::Remote`].
fn rpc_result(response: Value) -> Result<Value, ClientError> {
    if let Some(error) = response.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| error.to_string(), str::to_string);
        return Err(ClientError::remote(message));
    }
    response
        .get("result")
        .cloned()
        .ok_or_else(|| ClientError::decode("JSON-RPC response has no result"))
}

/// Decodes a reply body that is either plain JSON or SSE `data:` frames.
fn decode_body(content_type: &str, body: &str, id: u64) -> Result<Value, ClientError> {
    if !content_type.starts_with("text/event-stream") {
        let message: Value = serde_json::from_str(body)?;
        return match message.get("id").and_then(Value::as_u64) {
            Some(got) if got == id => Ok(message),
            got => Err(ClientError::decode(format!(
                "response id {got:?} does not match request {id}"
            ))),
        };
    }
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .filter_map(|data| serde_json::from_str::<Value>(data.trim()).ok())
        .find(|msg| msg.get("id").and_then(Value::as_u64) == Some(id))
        .ok_or_else(|| ClientError::decode(format!("no event-stream response for request {id}")))
}

/// One server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SseEvent {
    event: String,
    data: String,
}

impl SseEvent {
    /// Parses one blank-line-terminated block; comment-only blocks yield `None`.
    fn parse(block: &str) -> Option<Self> {
        let mut event = String::from("message");
        let mut data: Vec<&str> = Vec::new();
        for line in block.lines() {
            let (field, value) = line.split_once(':').unwrap_or((line, ""));
            let value = value.strip_prefix(' ').unwrap_or(value);
            match field {
                "event" => event = value.to_string(),
                "data" => data.push(value),
                _ => {}
            }
        }
        if data.is_empty() {
            return None;
        }
        Some(Self {
            event,
            data: data.join("\n"),
        })
    }
}

/// Incremental reader over a `text/event-stream` response.
struct EventStream {
    response: reqwest::Response,
    buffer: String,
    done: bool,
}

impl EventStream {
    fn new(response: reqwest::Response) -> Self {
        Self {
            response,
            buffer: String::new(),
            done: false,
        }
    }

    async fn next_event(&mut self) -> Result<Option<SseEvent>, ClientError> {
        loop {
            while let Some(end) = self.buffer.find("\n\n") {
                let block: String = self.buffer.drain(..end + 2).collect();
                if let Some(event) = SseEvent::parse(&block) {
                    return Ok(Some(event));
                }
            }
            if self.done {
                let rest = std::mem::take(&mut self.buffer);
                return Ok(SseEvent::parse(&rest));
            }
            match self.response.chunk().await? {
                Some(bytes) => self
                    .buffer
                    .push_str(&String::from_utf8_lossy(&bytes).replace('\r', "")),
                None => self.done = true,
            }
        }
    }

    /// Waits for the `endpoint` event and resolves it against `base`.
    async fn endpoint(&mut self, base: &str) -> Result<reqwest::Url, ClientError> {
        while let Some(event) = self.next_event().await? {
            if event.event == "endpoint" {
                let base = reqwest::Url::parse(base)
                    .map_err(|err| ClientError::decode(format!("invalid MCP_SERVER_URL: {err}")))?;
                return base
                    .join(event.data.trim())
                    .map_err(|err| ClientError::decode(format!("invalid sse endpoint: {err}")));
            }
        }
        Err(ClientError::decode("sse stream closed before announcing an endpoint"))
    }

    /// Waits for the JSON-RPC reply to request `id`.
    async fn reply(&mut self, id: u64) -> Result<Value, ClientError> {
        while let Some(event) = self.next_event().await? {
            if event.event != "message" {
                continue;
            }
            let Ok(message) = serde_json::from_str::<Value>(&event.data) else {
                tracing::debug!(data = %event.data, "Ignoring non-JSON sse message");
                continue;
            };
            if message.get("id").and_then(Value::as_u64) == Some(id) {
                return Ok(message);
            }
        }
        Err(ClientError::decode(format!(
            "sse stream closed before answering request {id}"
        )))
    }
}

async fn write_message(stdin: &mut ChildStdin, message: &Value) -> Result<(), ClientError> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    stdin.write_all(line.as_bytes()).await?;
    stdin.flush().await?;
    Ok(())
}

async fn read_response(
    lines: &mut Lines<BufReader<ChildStdout>>,
    id: u64,
) -> Result<Value, ClientError> {
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let message: Value = match serde_json::from_str(&line) {
            Ok(message) => message,
            Err(_) => {
                tracing::debug!(line = %line, "Ignoring non-JSON output from mcp server");
                continue;
            }
        };
        if message.get("id").and_then(Value::as_u64) == Some(id) {
            return Ok(message);
        }
    }
    Err(ClientError::decode(format!(
        "mcp server closed stdout before answering request {id}"
    )))
}
