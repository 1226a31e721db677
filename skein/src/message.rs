//! The message/thread data model (§3): immutable-after-append messages, tool-call
//! records, attachments, and per-message metrics.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::llm::LlmUsage;

/// The role a message plays in a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A structured request from the model to invoke a named tool with JSON arguments.
///
/// Construction from provider output accepts either JSON-string arguments or an
/// already-parsed mapping; malformed JSON degrades to an empty mapping with a
/// warning rather than an exception. Arguments are copied, not shared, across
/// retries — `arguments()` always returns an owned value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Builds a `ToolCall` from wire form: arguments as a JSON string. Malformed
    /// JSON degrades to an empty mapping with a logged warning (never an error).
    pub fn from_wire(id: impl Into<String>, name: impl Into<String>, arguments_json: &str) -> Self {
        let id = id.into();
        let name = name.into();
        let arguments = parse_tool_arguments(arguments_json, &name);
        Self {
            id,
            name,
            arguments,
        }
    }

    /// Returns a copy of the parsed arguments mapping.
    pub fn arguments(&self) -> Value {
        self.arguments.clone()
    }

    /// Serializes arguments back to wire form: a JSON string.
    pub fn arguments_json(&self) -> String {
        serde_json::to_string(&self.arguments).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Parses tool-call arguments from the provider's wire format. Empty/blank strings
/// become an empty mapping; a double-JSON-encoded string is unwrapped once;
/// unparsable input logs a warning and degrades to an empty mapping.
pub fn parse_tool_arguments(raw: &str, tool_name: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Object(Default::default());
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::String(inner)) => match serde_json::from_str::<Value>(&inner) {
            Ok(v @ Value::Object(_)) => v,
            _ => Value::Object(Default::default()),
        },
        Ok(v @ Value::Object(_)) => v,
        Ok(_) | Err(_) => {
            tracing::warn!(
                tool = tool_name,
                raw = trimmed,
                "malformed tool-call arguments, degrading to empty mapping"
            );
            Value::Object(Default::default())
        }
    }
}

/// A file attached to a message: raw bytes or a reference the caller resolves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub mime_type: String,
    pub data: AttachmentData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttachmentData {
    Bytes(Vec<u8>),
    Uri(String),
}

/// Where a message originated: the end user, the agent (LLM), or a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    User,
    Agent,
    Tool,
}

/// Source descriptor stamped onto every message by the message factory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub kind: SourceKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
}

impl Source {
    pub fn new(kind: SourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Token usage, timing, and latency recorded against a message once it completes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub usage: Option<LlmUsage>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub latency_ms: Option<i64>,
}

impl Metrics {
    /// Computes `{started_at, ended_at, latency_ms}` from a start instant to now.
    pub fn timed_from(started_at: DateTime<Utc>) -> Self {
        let ended_at = Utc::now();
        let latency_ms = (ended_at - started_at).num_milliseconds();
        Self {
            usage: None,
            started_at: Some(started_at),
            ended_at: Some(ended_at),
            latency_ms: Some(latency_ms),
        }
    }

    /// Zero-latency timing for synthetic messages (e.g. factory error messages).
    pub fn instantaneous() -> Self {
        let now = Utc::now();
        Self {
            usage: None,
            started_at: Some(now),
            ended_at: Some(now),
            latency_ms: Some(0),
        }
    }
}

/// One entry in a structured-output retry history: the validation errors seen and
/// the attempt number they occurred on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryRecord {
    pub attempt: u32,
    pub errors: Vec<String>,
}

/// A single message in a thread. Immutable after being appended, except for
/// post-hoc metric enrichment (`metrics` may be updated in place by the loop).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub reasoning: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    pub name: Option<String>,
    pub tool_call_id: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub source: Source,
    pub metrics: Metrics,
    pub retry_history: Option<Vec<RetryRecord>>,
}

impl Message {
    fn base(role: Role, content: impl Into<String>, source: Source) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            reasoning: None,
            tool_calls: Vec::new(),
            name: None,
            tool_call_id: None,
            attachments: Vec::new(),
            source,
            metrics: Metrics::default(),
            retry_history: None,
        }
    }

    pub fn system(content: impl Into<String>, source: Source) -> Self {
        Self::base(Role::System, content, source)
    }

    pub fn user(content: impl Into<String>, source: Source) -> Self {
        Self::base(Role::User, content, source)
    }

    pub fn assistant(content: impl Into<String>, source: Source) -> Self {
        Self::base(Role::Assistant, content, source)
    }

    pub fn tool(
        name: impl Into<String>,
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
        source: Source,
    ) -> Self {
        let mut m = Self::base(Role::Tool, content, source);
        m.name = Some(name.into());
        m.tool_call_id = Some(tool_call_id.into());
        m
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_call_round_trip_preserves_id_name_arguments() {
        let tc = ToolCall::new("c1", "calculate", serde_json::json!({"expression": "5+3"}));
        let wire = tc.arguments_json();
        let parsed = ToolCall::from_wire("c1", "calculate", &wire);
        assert_eq!(tc.id, parsed.id);
        assert_eq!(tc.name, parsed.name);
        assert_eq!(tc.arguments(), parsed.arguments());
    }

    #[test]
    fn malformed_json_arguments_degrade_to_empty_mapping() {
        let tc = ToolCall::from_wire("c1", "calculate", "{not json");
        assert_eq!(tc.arguments(), Value::Object(Default::default()));
    }

    #[test]
    fn empty_string_arguments_become_empty_mapping() {
        let tc = ToolCall::from_wire("c1", "noop", "");
        assert_eq!(tc.arguments(), Value::Object(Default::default()));
    }

    #[test]
    fn double_encoded_arguments_are_unwrapped() {
        let inner = r#"{"expression":"5+3"}"#;
        let double = serde_json::to_string(&Value::String(inner.to_string())).unwrap();
        let tc = ToolCall::from_wire("c1", "calculate", &double);
        assert_eq!(tc.arguments()["expression"], "5+3");
    }

    #[test]
    fn assistant_message_carries_tool_calls() {
        let source = Source::new(SourceKind::Agent, "agent").with_attribute("model", "gpt-4o");
        let msg = Message::assistant("", source).with_tool_calls(vec![ToolCall::new(
            "c1",
            "calculate",
            serde_json::json!({}),
        )]);
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.tool_calls.len(), 1);
    }

    #[test]
    fn serde_round_trip() {
        let source = Source::new(SourceKind::User, "user");
        let msg = Message::user("hello", source);
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.content, "hello");
        assert_eq!(back.role, Role::User);
    }
}
