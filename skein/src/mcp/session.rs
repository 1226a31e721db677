//! MCP session over stdio: spawns a server process, performs the initialize
//! handshake, and provides blocking request/response for JSON-RPC calls.
//!
//! Runs on a blocking thread via `task::block_in_place` at the call site
//! (§4.2); this type itself is synchronous, matching `mcp_client`'s transport.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use mcp_client::stdio::{
    JsonRpcMessage, StdioClientTransport, StdioClientTransportError, StdioServerParameters,
    StdioStream,
};
use mcp_core::{MessageId, NotificationMessage, RequestMessage, ResultMessage};
use serde_json::{json, Value};

use super::error::McpError;

const PROTOCOL_VERSION: &str = "2025-11-25";
const INITIALIZE_REQUEST_ID: &str = "skein-mcp-initialize";

pub struct McpSession {
    transport: StdioClientTransport,
    receiver: mpsc::Receiver<JsonRpcMessage>,
}

impl McpSession {
    /// Spawns the server process and completes the initialize handshake.
    /// When `stderr_verbose` is false, child stderr is discarded.
    pub fn new(
        command: impl Into<String>,
        args: Vec<String>,
        env: Option<impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>>,
        stderr_verbose: bool,
    ) -> Result<Self, McpError> {
        let (tx, rx) = mpsc::channel();

        let stderr_stream = if stderr_verbose {
            StdioStream::Inherit
        } else {
            StdioStream::Null
        };
        let mut params = StdioServerParameters::new(command)
            .args(args)
            .stderr(stderr_stream);
        if let Some(env_iter) = env {
            params = params.env(env_iter);
        }

        let mut transport = StdioClientTransport::new(params);
        transport.on_message(move |msg| {
            let _ = tx.send(msg);
        });
        transport.on_error(|e| {
            tracing::warn!(error = %e, "mcp stdio transport error");
        });

        transport
            .start()
            .map_err(|e| McpError::Transport(e.to_string()))?;

        let mut session = Self {
            transport,
            receiver: rx,
        };
        session.initialize()?;
        Ok(session)
    }

    fn initialize(&mut self) -> Result<(), McpError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "clientInfo": {
                "name": "skein-mcp",
                "version": env!("CARGO_PKG_VERSION")
            }
        });
        self.send_request(INITIALIZE_REQUEST_ID, "initialize", params)?;

        match self.wait_for_result(INITIALIZE_REQUEST_ID, Duration::from_secs(20))? {
            Some(result) => {
                if result.error.is_some() {
                    return Err(McpError::Initialize(
                        result
                            .error
                            .map(|e| e.message)
                            .unwrap_or_else(|| "unknown".into()),
                    ));
                }
                let notification = JsonRpcMessage::Notification(NotificationMessage::new(
                    "notifications/initialized",
                    Some(json!({})),
                ));
                self.transport
                    .send(&notification)
                    .map_err(|e| McpError::Transport(e.to_string()))?;
            }
            None => {
                return Err(McpError::Initialize(
                    "timeout waiting for initialize".into(),
                ))
            }
        }

        Ok(())
    }

    pub fn send_request(
        &mut self,
        id: &str,
        method: &str,
        params: Value,
    ) -> Result<(), McpError> {
        let request = RequestMessage::new(id, method, params);
        self.transport
            .send(&JsonRpcMessage::Request(request))
            .map_err(|e| McpError::Transport(e.to_string()))
    }

    /// Waits for a JSON-RPC result matching `request_id`. Server-initiated
    /// `roots/list` requests are answered with an empty roots list inline.
    pub fn wait_for_result(
        &mut self,
        request_id: &str,
        timeout: Duration,
    ) -> Result<Option<ResultMessage>, McpError> {
        self.wait_for_result_with_progress(request_id, timeout, None)
    }

    /// Like [`Self::wait_for_result`], but forwards `notifications/progress`
    /// payloads to `on_progress` as they arrive, for long-running tool calls.
    pub fn wait_for_result_with_progress(
        &mut self,
        request_id: &str,
        timeout: Duration,
        on_progress: Option<&(dyn Fn(Value) + Send + Sync)>,
    ) -> Result<Option<ResultMessage>, McpError> {
        let deadline = Instant::now() + timeout;

        while Instant::now() < deadline {
            let remaining = deadline
                .saturating_duration_since(Instant::now())
                .min(Duration::from_secs(1));

            match self.receiver.recv_timeout(remaining) {
                Ok(JsonRpcMessage::Result(msg)) if message_id_matches(&msg.id, request_id) => {
                    return Ok(Some(msg));
                }
                Ok(JsonRpcMessage::Request(req)) if req.method == "roots/list" => {
                    let result = ResultMessage::success(req.id.clone(), json!({ "roots": [] }));
                    self.transport
                        .send(&JsonRpcMessage::Result(result))
                        .map_err(|e| McpError::Transport(e.to_string()))?;
                }
                Ok(JsonRpcMessage::Request(_)) | Ok(JsonRpcMessage::Result(_)) => {}
                Ok(JsonRpcMessage::Notification(n)) => {
                    if n.method == "notifications/progress" {
                        if let Some(cb) = on_progress {
                            cb(n.params.clone().unwrap_or(Value::Null));
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        Ok(None)
    }
}

fn message_id_matches(id: &MessageId, expected: &str) -> bool {
    id.as_str() == Some(expected)
}

impl From<StdioClientTransportError> for McpError {
    fn from(e: StdioClientTransportError) -> Self {
        McpError::Transport(e.to_string())
    }
}
