//! MCP Adapter (§4.2): connects to one or more MCP servers (stdio or
//! Streamable HTTP), lists and calls their tools, and registers them into a
//! [`ToolRunner`] under a per-server name prefix with include/exclude filtering.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mcp_core::ResultMessage;
use serde_json::Value;
use tokio::task;

use crate::tool::{
    context::ProgressCallback, ContextualTool, ToolAttributes, ToolContext, ToolEntry, ToolOutput,
    ToolRunner, ToolSourceKind, ToolSpec,
};

use super::error::McpError;
use super::session::McpSession;
use super::session_http::McpHttpSession;

/// How to reach one MCP server.
pub enum McpTransportConfig {
    Stdio {
        command: String,
        args: Vec<String>,
        env: Vec<(String, String)>,
        stderr_verbose: bool,
    },
    Http {
        url: String,
        headers: Vec<(String, String)>,
    },
}

/// One server to connect, plus the filtering/naming policy for its tools.
pub struct McpServerConfig {
    pub name: String,
    pub transport: McpTransportConfig,
    /// Prefix applied to every tool name from this server. Defaults to `{name}_`.
    pub prefix: Option<String>,
    /// If set, only these (unprefixed) tool names are registered.
    pub include: Option<Vec<String>>,
    /// Removed after `include` is applied.
    pub exclude: Option<Vec<String>>,
    /// If true, a connect failure for this server is logged and skipped
    /// instead of failing the whole adapter connect.
    pub fail_silent: bool,
}

impl McpServerConfig {
    pub fn stdio(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            transport: McpTransportConfig::Stdio {
                command: command.into(),
                args,
                env: Vec::new(),
                stderr_verbose: false,
            },
            prefix: None,
            include: None,
            exclude: None,
            fail_silent: false,
        }
    }

    pub fn http(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: McpTransportConfig::Http {
                url: url.into(),
                headers: Vec::new(),
            },
            prefix: None,
            include: None,
            exclude: None,
            fail_silent: false,
        }
    }

    fn effective_prefix(&self) -> String {
        self.prefix.clone().unwrap_or_else(|| format!("{}_", self.name))
    }

    fn passes_filter(&self, unprefixed_name: &str) -> bool {
        let included = match &self.include {
            Some(list) => list.iter().any(|n| n == unprefixed_name),
            None => true,
        };
        let excluded = match &self.exclude {
            Some(list) => list.iter().any(|n| n == unprefixed_name),
            None => false,
        };
        included && !excluded
    }
}

enum ServerSession {
    Stdio(Mutex<McpSession>),
    Http(Arc<McpHttpSession>),
}

struct ConnectedServer {
    name: String,
    prefix: String,
    session: ServerSession,
}

impl ConnectedServer {
    fn request_sync(
        &self,
        id: &str,
        method: &str,
        params: Value,
        on_progress: Option<&(dyn Fn(Value) + Send + Sync)>,
    ) -> Result<ResultMessage, McpError> {
        match &self.session {
            ServerSession::Stdio(session) => {
                let mut session = session.lock().unwrap();
                session.send_request(id, method, params)?;
                session
                    .wait_for_result_with_progress(id, std::time::Duration::from_secs(30), on_progress)?
                    .ok_or_else(|| McpError::Transport("timeout waiting for response".into()))
            }
            ServerSession::Http(_) => unreachable!("HTTP sessions use the async request path"),
        }
    }

    async fn request(&self, id: &str, method: &str, params: Value) -> Result<ResultMessage, McpError> {
        match &self.session {
            ServerSession::Http(session) => session.request(id, method, params).await,
            ServerSession::Stdio(_) => unreachable!("stdio sessions use the sync request path"),
        }
    }

    async fn list_tools(&self) -> Result<Vec<ToolSpec>, McpError> {
        let result = match &self.session {
            ServerSession::Stdio(_) => task::block_in_place(|| {
                self.request_sync(
                    "tools-list",
                    "tools/list",
                    Value::Object(Default::default()),
                    None,
                )
            })?,
            ServerSession::Http(_) => {
                self.request("tools-list", "tools/list", Value::Object(Default::default()))
                    .await?
            }
        };
        parse_list_tools_result(result)
    }

    /// Calls a tool, forwarding any `notifications/progress` payloads seen
    /// while waiting for the response through `progress`. HTTP transport here
    /// is request/response only, so progress is stdio-only for now.
    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        progress: Option<ProgressCallback>,
    ) -> Result<ToolOutput, McpError> {
        let id = format!("call-{name}");
        let params = serde_json::json!({ "name": name, "arguments": arguments });
        let result = match &self.session {
            ServerSession::Stdio(_) => {
                let (progress_tx, mut progress_rx) = tokio::sync::mpsc::unbounded_channel::<Value>();
                let forwarder = progress.map(|cb| {
                    tokio::spawn(async move {
                        while let Some(payload) = progress_rx.recv().await {
                            let progress = payload.get("progress").and_then(|v| v.as_f64()).unwrap_or(0.0);
                            let total = payload.get("total").and_then(|v| v.as_f64());
                            let message = payload
                                .get("message")
                                .and_then(|v| v.as_str())
                                .map(String::from);
                            (cb)(progress, total, message).await;
                        }
                    })
                });
                let on_progress = move |payload: Value| {
                    let _ = progress_tx.send(payload);
                };
                let result = task::block_in_place(|| {
                    self.request_sync(&id, "tools/call", params, Some(&on_progress))
                })?;
                if let Some(handle) = forwarder {
                    let _ = handle.await;
                }
                result
            }
            ServerSession::Http(_) => self.request(&id, "tools/call", params).await?,
        };
        parse_call_tool_result(result)
    }
}

fn parse_list_tools_result(result: ResultMessage) -> Result<Vec<ToolSpec>, McpError> {
    if let Some(err) = result.error {
        return Err(McpError::JsonRpc(err.message));
    }
    let tools_value = result
        .result
        .and_then(|r| r.get("tools").cloned())
        .ok_or_else(|| McpError::Transport("no tools in response".into()))?;
    let tools_array = tools_value
        .as_array()
        .ok_or_else(|| McpError::Transport("tools not an array".into()))?;
    let mut specs = Vec::with_capacity(tools_array.len());
    for t in tools_array {
        let obj = t
            .as_object()
            .ok_or_else(|| McpError::Transport("tool item not an object".into()))?;
        let name = obj.get("name").and_then(|v| v.as_str()).unwrap_or("").to_string();
        let description = obj
            .get("description")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let input_schema = obj
            .get("inputSchema")
            .cloned()
            .unwrap_or(Value::Object(Default::default()));
        specs.push(ToolSpec::new(name, description, input_schema));
    }
    Ok(specs)
}

fn parse_call_tool_result(result: ResultMessage) -> Result<ToolOutput, McpError> {
    if let Some(err) = result.error {
        return Err(McpError::JsonRpc(err.message));
    }
    let result_value = result
        .result
        .ok_or_else(|| McpError::Transport("no result in tools/call response".into()))?;
    if result_value.get("isError").and_then(|v| v.as_bool()).unwrap_or(false) {
        let msg = result_value
            .get("content")
            .and_then(|c| c.as_array())
            .and_then(|a| a.first())
            .and_then(|b| b.get("text").and_then(|t| t.as_str()))
            .unwrap_or("tool returned error")
            .to_string();
        return Err(McpError::Transport(msg));
    }
    let mut text_parts = Vec::new();
    if let Some(content_array) = result_value.get("content").and_then(|c| c.as_array()) {
        for block in content_array {
            if block.get("type").and_then(|t| t.as_str()) == Some("text") {
                if let Some(t) = block.get("text").and_then(|v| v.as_str()) {
                    text_parts.push(t);
                }
            }
        }
    }
    let mut text = text_parts.join("\n").trim().to_string();
    if text.is_empty() {
        if let Some(structured) = result_value.get("structuredContent") {
            text = serde_json::to_string(structured).unwrap_or_default();
        }
    }
    if text.is_empty() {
        return Err(McpError::Transport(
            "no text or structuredContent in tools/call response".into(),
        ));
    }
    Ok(ToolOutput::text(text))
}

/// Connects to a set of MCP servers and registers their tools into a
/// [`ToolRunner`] under each server's prefix.
pub struct McpAdapter {
    servers: Vec<Arc<ConnectedServer>>,
}

impl McpAdapter {
    /// Connects every configured server. A server whose `fail_silent` is
    /// true is skipped (with a warning) on connect failure rather than
    /// aborting the whole adapter; otherwise the first failure is returned.
    pub async fn connect(configs: Vec<McpServerConfig>) -> Result<Self, McpError> {
        let mut servers = Vec::new();
        for config in configs {
            let prefix = config.effective_prefix();
            let name = config.name.clone();
            let session = match &config.transport {
                McpTransportConfig::Stdio {
                    command,
                    args,
                    env,
                    stderr_verbose,
                } => {
                    let command = command.clone();
                    let args = args.clone();
                    let env = env.clone();
                    let stderr_verbose = *stderr_verbose;
                    task::block_in_place(|| {
                        McpSession::new(
                            command,
                            args,
                            if env.is_empty() { None } else { Some(env) },
                            stderr_verbose,
                        )
                    })
                    .map(|s| ServerSession::Stdio(Mutex::new(s)))
                }
                McpTransportConfig::Http { url, headers } => {
                    McpHttpSession::new(url.clone(), headers.clone())
                        .await
                        .map(|s| ServerSession::Http(Arc::new(s)))
                }
            };
            match session {
                Ok(session) => servers.push(Arc::new(ConnectedServer { name, prefix, session })),
                Err(e) if config.fail_silent => {
                    tracing::warn!(server = %config.name, error = %e, "mcp server connect failed, skipping");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(Self { servers })
    }

    /// Lists every server's tools (already filtered and prefixed) and
    /// registers each as a [`ContextualTool`] into `runner`.
    pub async fn register_tools(
        &self,
        runner: &ToolRunner,
        configs: &[McpServerConfig],
    ) -> Result<(), McpError> {
        for server in &self.servers {
            let config = configs
                .iter()
                .find(|c| c.name == server.name)
                .expect("connected server must have a matching config");
            let tools = server.list_tools().await?;
            for spec in tools {
                if !config.passes_filter(&spec.name) {
                    continue;
                }
                let prefixed_name = format!("{}{}", server.prefix, spec.name);
                let prefixed_spec = ToolSpec::new(prefixed_name.clone(), spec.description, spec.input_schema);
                let tool = McpToolAdapter {
                    server: server.clone(),
                    remote_name: spec.name,
                    spec: prefixed_spec,
                };
                runner.register(
                    prefixed_name,
                    ToolEntry::Contextual(Box::new(tool)),
                    ToolAttributes::new(ToolSourceKind::Mcp),
                )?;
            }
        }
        Ok(())
    }
}

/// Adapts one MCP server tool into this crate's [`ContextualTool`] trait.
/// Progress updates reported during `tools/call` are forwarded through the
/// call's [`ToolContext`] progress callback, when one is configured.
struct McpToolAdapter {
    server: Arc<ConnectedServer>,
    remote_name: String,
    spec: ToolSpec,
}

#[async_trait]
impl ContextualTool for McpToolAdapter {
    fn spec(&self) -> ToolSpec {
        self.spec.clone()
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput, String> {
        self.server
            .call_tool(&self.remote_name, args, ctx.progress.clone())
            .await
            .map_err(|e| e.to_string())
    }
}
