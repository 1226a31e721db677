//! Stream Modes (§4.5): four ways to observe a run — silent (`None`), typed
//! telemetry (`Events`), raw provider passthrough (`OpenAI`/`raw`), and the
//! Vercel AI SDK Data Stream Protocol (`Vercel`), the last built on top of
//! `Events`.

pub mod events;
pub mod raw;
pub mod vercel;

use serde_json::Value;

use crate::message::{Message, RetryRecord};
use crate::thread::Thread;

/// The kind of telemetry an [`ExecutionEvent`] carries. Mirrors the original
/// framework's `EventType` enum almost verbatim (§9): this crate keeps it as
/// a plain enum rather than a class hierarchy since every event is a tagged
/// union member, not a type with its own behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    IterationStart,
    IterationLimit,
    LlmRequest,
    LlmStreamChunk,
    LlmThinkingChunk,
    LlmResponse,
    ToolSelected,
    ToolProgress,
    ToolResult,
    ToolError,
    MessageCreated,
    ExecutionError,
    ExecutionComplete,
}

/// One piece of run telemetry. `data` is a JSON payload whose shape depends
/// on `event_type` (documented at each emission site in the agent loop)
/// rather than a per-kind Rust struct, so new fields can be added to one
/// event's payload without widening every other kind's type.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ExecutionEvent {
    pub event_type: EventType,
    pub thread_id: String,
    pub iteration: u32,
    #[serde(default)]
    pub data: Value,
}

impl ExecutionEvent {
    pub fn new(event_type: EventType, thread_id: impl Into<String>, iteration: u32) -> Self {
        Self {
            event_type,
            thread_id: thread_id.into(),
            iteration,
            data: Value::Null,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

/// What a run produced, for the non-streaming ("run") mode and as the final
/// value every streaming mode resolves to once its receiver is drained.
#[derive(Clone, Debug)]
pub struct AgentResult {
    pub thread: Thread,
    /// Messages appended during this call, in append order.
    pub new_messages: Vec<Message>,
    /// The last assistant message's content.
    pub output: String,
    pub success: bool,
    pub iterations: u32,
    pub duration_ms: i64,
    pub total_tokens: u32,
    /// Set when `response_type` was requested and validation succeeded.
    pub structured_data: Option<Value>,
    pub validation_retries: u32,
    pub retry_history: Vec<RetryRecord>,
}

/// Which of the four stream modes a `stream` call should render.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamMode {
    /// No streaming surface; equivalent to calling `run`.
    None,
    Events,
    /// "OpenAI" / "raw" mode: untouched provider chunks.
    Raw,
    Vercel,
}

/// One value yielded by a streaming call. Which variant a given [`StreamMode`]
/// produces is fixed: `Events` yields `Event`, `Raw` and `Vercel` yield `Sse`
/// (already-framed SSE text, so callers can write it straight to a response
/// body).
#[derive(Clone, Debug)]
pub enum StreamItem {
    Event(ExecutionEvent),
    Sse(String),
}
