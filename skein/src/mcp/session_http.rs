//! MCP session over Streamable HTTP: POST one JSON-RPC message per call,
//! accepting either a JSON or SSE-framed response (§4.2).

use std::sync::Mutex;

use mcp_core::{ErrorObject, MessageId, NotificationMessage, RequestMessage, ResultMessage};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::error::McpError;

const MCP_PROTOCOL_VERSION: &str = "2025-11-25";
const INITIALIZE_REQUEST_ID: &str = "skein-mcp-initialize";

#[derive(Debug, Deserialize)]
struct JsonRpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    id: Option<MessageId>,
    result: Option<Value>,
    error: Option<JsonRpcErrorBody>,
}

/// Parses a JSON-RPC response from an HTTP body, supporting both
/// `application/json` (one object) and `text/event-stream` (`data: ` framed)
/// responses.
fn parse_json_rpc_from_body(
    body: &str,
    content_type: Option<&reqwest::header::HeaderValue>,
) -> Result<JsonRpcResponse, McpError> {
    let is_sse = content_type
        .and_then(|v| v.to_str().ok())
        .map(|s| s.contains("text/event-stream"))
        .unwrap_or(false);

    if !is_sse {
        return serde_json::from_str(body)
            .map_err(|e| McpError::Transport(format!("response json: {e}")));
    }

    let mut data_buffer = String::new();
    let mut try_flush = |buffer: &mut String| -> Option<JsonRpcResponse> {
        if buffer.is_empty() {
            return None;
        }
        let parsed = serde_json::from_str::<JsonRpcResponse>(buffer).ok();
        match parsed {
            Some(r) if r.result.is_some() || r.error.is_some() => {
                buffer.clear();
                Some(r)
            }
            _ => None,
        }
    };

    for line in body.lines() {
        if let Some(data) = line.strip_prefix("data: ") {
            if data == "[DONE]" || data.is_empty() {
                if let Some(r) = try_flush(&mut data_buffer) {
                    return Ok(r);
                }
                continue;
            }
            if data_buffer.is_empty() {
                data_buffer = data.to_string();
            } else {
                data_buffer.push('\n');
                data_buffer.push_str(data);
            }
            if let Some(r) = try_flush(&mut data_buffer) {
                return Ok(r);
            }
        } else if line.trim().is_empty() {
            if let Some(r) = try_flush(&mut data_buffer) {
                return Ok(r);
            }
        }
    }
    if let Some(r) = try_flush(&mut data_buffer) {
        return Ok(r);
    }
    Err(McpError::Transport(
        "SSE stream: no JSON-RPC response (result/error) found".into(),
    ))
}

/// MCP session over Streamable HTTP: handshake once, then one POST per call.
pub struct McpHttpSession {
    client: Client,
    url: String,
    headers: Vec<(String, String)>,
    session_id: Mutex<Option<String>>,
}

impl McpHttpSession {
    pub async fn new(
        url: impl Into<String>,
        headers: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Result<Self, McpError> {
        let url = url.into();
        let headers: Vec<(String, String)> = headers
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| McpError::Transport(e.to_string()))?;
        let mut s = Self {
            client,
            url,
            headers,
            session_id: Mutex::new(None),
        };
        s.initialize().await?;
        Ok(s)
    }

    async fn initialize(&mut self) -> Result<(), McpError> {
        let params = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "clientInfo": {
                "name": "skein-mcp",
                "version": env!("CARGO_PKG_VERSION")
            }
        });
        let request = RequestMessage::new(INITIALIZE_REQUEST_ID, "initialize", params);
        let body =
            serde_json::to_vec(&request).map_err(|e| McpError::Transport(e.to_string()))?;
        let mut req = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream")
            .header("MCP-Protocol-Version", MCP_PROTOCOL_VERSION)
            .body(body);
        for (k, v) in &self.headers {
            req = req.header(k.as_str(), v.as_str());
        }
        let resp = req
            .send()
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;
        let status = resp.status();
        let session_id = resp
            .headers()
            .get("MCP-Session-Id")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        if let Some(ref id) = session_id {
            *self.session_id.lock().unwrap() = Some(id.clone());
        }
        if status == reqwest::StatusCode::ACCEPTED {
            return Ok(());
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(McpError::Transport(format!(
                "initialize HTTP {status}: {}",
                if text.is_empty() { "no body" } else { &text }
            )));
        }
        let content_type = resp.headers().get("content-type").cloned();
        let text = resp
            .text()
            .await
            .map_err(|e| McpError::Transport(format!("initialize response body: {e}")))?;
        let _: JsonRpcResponse = parse_json_rpc_from_body(&text, content_type.as_ref())
            .map_err(|e| McpError::Transport(format!("initialize {e}")))?;

        let notification = NotificationMessage::new("notifications/initialized", Some(json!({})));
        let notif_body =
            serde_json::to_vec(&notification).map_err(|e| McpError::Transport(e.to_string()))?;
        let mut req2 = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream")
            .header("MCP-Protocol-Version", MCP_PROTOCOL_VERSION)
            .body(notif_body);
        for (k, v) in &self.headers {
            req2 = req2.header(k.as_str(), v.as_str());
        }
        if let Some(ref id) = *self.session_id.lock().unwrap() {
            req2 = req2.header("MCP-Session-Id", id.as_str());
        }
        let resp2 = req2
            .send()
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;
        let status2 = resp2.status();
        if status2 != reqwest::StatusCode::ACCEPTED && !status2.is_success() {
            let text = resp2.text().await.unwrap_or_default();
            return Err(McpError::Transport(format!(
                "notifications/initialized HTTP {status2}: {}",
                if text.is_empty() { "no body" } else { &text }
            )));
        }
        Ok(())
    }

    /// Sends one JSON-RPC request and returns its result, mapping a JSON-RPC
    /// error into `ResultMessage::failure` so callers have one shape to match on.
    pub async fn request(
        &self,
        id: &str,
        method: &str,
        params: Value,
    ) -> Result<ResultMessage, McpError> {
        let request = RequestMessage::new(id, method, params);
        let body =
            serde_json::to_vec(&request).map_err(|e| McpError::Transport(e.to_string()))?;
        let mut req = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream")
            .header("MCP-Protocol-Version", MCP_PROTOCOL_VERSION)
            .body(body);
        for (k, v) in &self.headers {
            req = req.header(k.as_str(), v.as_str());
        }
        if let Some(ref sid) = *self.session_id.lock().unwrap() {
            req = req.header("MCP-Session-Id", sid.as_str());
        }
        let resp = req
            .send()
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(McpError::Transport(format!(
                "{method} HTTP {status}: {}",
                if text.is_empty() { "no body" } else { &text }
            )));
        }
        let content_type = resp.headers().get("content-type").cloned();
        let text = resp
            .text()
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;
        let json: JsonRpcResponse = parse_json_rpc_from_body(&text, content_type.as_ref())
            .map_err(|e| McpError::Transport(e.to_string()))?;
        let msg_id = json.id.unwrap_or_else(|| MessageId::from(id));
        if let Some(err) = json.error {
            let err_obj = ErrorObject::new(err.code as i32, err.message, None);
            return Ok(ResultMessage::failure(msg_id, err_obj));
        }
        Ok(ResultMessage::success(
            msg_id,
            json.result.unwrap_or(Value::Null),
        ))
    }
}
