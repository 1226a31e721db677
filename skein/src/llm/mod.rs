//! Completion Handler (§4.3): translates agent configuration and thread state
//! into a provider-agnostic request, and normalizes provider responses (and,
//! for streaming, provider deltas) back into this crate's types.

mod mock;
mod openai;

pub use mock::{MockLlm, ScriptedTurn};
pub use openai::ChatOpenAI;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::AgentError;
use crate::message::Message;
use crate::tool::ToolSpec;

/// Tool choice mode for chat completions: when tools are present, controls whether
/// the model may choose (auto), must not use (none), or must use (required).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ToolChoiceMode {
    #[default]
    Auto,
    None,
    Required,
}

impl std::str::FromStr for ToolChoiceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "none" => Ok(Self::None),
            "required" => Ok(Self::Required),
            _ => Err(format!(
                "unknown tool_choice: {s} (use auto, none, or required)"
            )),
        }
    }
}

/// Reasoning effort, for providers that expose a coarse level rather than a
/// token budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReasoningLevel {
    Low,
    Medium,
    High,
}

/// How the provider should constrain its output shape. Distinct from this
/// crate's own structured-output mechanism (the synthetic output tool, §4.6):
/// this is a provider-level directive that a `ChatOpenAI`-style client can also
/// set on the request when the caller wants both.
#[derive(Clone, Debug)]
pub enum ResponseFormat {
    Text,
    JsonObject,
    JsonSchema { name: String, schema: Value },
}

/// Provider-facing parameters, independent of the thread content.
#[derive(Clone, Debug)]
pub struct CompletionParams {
    pub temperature: Option<f32>,
    pub tool_choice: Option<ToolChoiceMode>,
    pub reasoning: Option<ReasoningLevel>,
    pub response_format: Option<ResponseFormat>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub extra_headers: Vec<(String, String)>,
    /// When true (the default), a param this provider doesn't support is
    /// silently dropped rather than rejected at request-build time.
    pub drop_params: bool,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            temperature: None,
            tool_choice: None,
            reasoning: None,
            response_format: None,
            base_url: None,
            api_key: None,
            extra_headers: Vec::new(),
            drop_params: true,
        }
    }
}

/// A complete request to a completion handler: serialized thread, flattened
/// tool schemas (local + MCP + skills + A2A delegation + the synthetic output
/// tool, already merged by the caller), model name, and provider parameters.
#[derive(Clone, Debug)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
    pub params: CompletionParams,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: Vec::new(),
            params: CompletionParams::default(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_params(mut self, params: CompletionParams) -> Self {
        self.params = params;
        self
    }
}

/// Token usage for one completion call.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct LlmUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Why a completion call stopped producing tokens. Serializes to the hyphenated
/// form the Vercel AI SDK Data Stream Protocol's `finish` frame expects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    Error,
}

/// The normalized result of one completion call.
#[derive(Clone, Debug, Default)]
pub struct LlmResponse {
    pub content: String,
    pub reasoning: Option<String>,
    pub tool_calls: Vec<crate::message::ToolCall>,
    pub usage: Option<LlmUsage>,
    /// Why the provider stopped. `None` when the provider didn't report one
    /// (e.g. `MockLlm` turns that don't set it).
    pub finish_reason: Option<FinishReason>,
}

/// One incremental update from a streaming completion: content token,
/// reasoning token, a piece of a tool call's arguments, or terminal usage.
/// `index` identifies which tool call a `tool_call` delta belongs to, matching
/// the provider's own delta index so fragments for the same call can be
/// accumulated in order even when interleaved with other calls.
#[derive(Clone, Debug, Default)]
pub struct StreamDelta {
    pub content: Option<String>,
    pub reasoning: Option<String>,
    pub tool_call: Option<ToolCallDelta>,
    pub usage: Option<LlmUsage>,
    /// Present on the terminal chunk, same as `usage`.
    pub finish_reason: Option<FinishReason>,
    /// The untouched provider chunk, when the client can supply one. Only
    /// consumed by the raw passthrough stream mode (§4.5); other modes read
    /// the normalized fields above instead.
    pub raw: Option<Value>,
}

#[derive(Clone, Debug)]
pub struct ToolCallDelta {
    pub index: u32,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments_delta: Option<String>,
}

/// Coalesces a sequence of [`StreamDelta`]s into the same [`LlmResponse`] shape
/// a non-streaming call would have produced. Tool call fragments are keyed by
/// provider delta index and assembled in index order; ties are then broken by
/// name so the final tool-call list is deterministic across runs even when two
/// calls interleave their argument tokens.
#[derive(Default)]
pub struct ChunkAccumulator {
    content: String,
    reasoning: String,
    tool_calls: std::collections::BTreeMap<u32, (String, String, String)>,
    usage: Option<LlmUsage>,
    finish_reason: Option<FinishReason>,
}

impl ChunkAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn absorb(&mut self, delta: &StreamDelta) {
        if let Some(ref c) = delta.content {
            self.content.push_str(c);
        }
        if let Some(ref r) = delta.reasoning {
            self.reasoning.push_str(r);
        }
        if let Some(ref tc) = delta.tool_call {
            let entry = self
                .tool_calls
                .entry(tc.index)
                .or_insert_with(|| (String::new(), String::new(), String::new()));
            if let Some(ref id) = tc.id {
                entry.0 = id.clone();
            }
            if let Some(ref name) = tc.name {
                entry.1.push_str(name);
            }
            if let Some(ref args) = tc.arguments_delta {
                entry.2.push_str(args);
            }
        }
        if delta.usage.is_some() {
            self.usage = delta.usage.clone();
        }
        if delta.finish_reason.is_some() {
            self.finish_reason = delta.finish_reason;
        }
    }

    pub fn finish(self) -> LlmResponse {
        let mut tool_calls: Vec<crate::message::ToolCall> = self
            .tool_calls
            .into_values()
            .map(|(id, name, arguments)| crate::message::ToolCall::from_wire(id, name, &arguments))
            .collect();
        tool_calls.sort_by(|a, b| a.name.cmp(&b.name));
        LlmResponse {
            content: self.content,
            reasoning: if self.reasoning.is_empty() {
                None
            } else {
                Some(self.reasoning)
            },
            tool_calls,
            usage: self.usage,
            finish_reason: self.finish_reason,
        }
    }
}

/// A completion handler: turns a [`CompletionRequest`] into an [`LlmResponse`],
/// either all at once or incrementally.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<LlmResponse, AgentError>;

    /// Streaming variant. Sends one [`StreamDelta`] per provider chunk through
    /// `tx`, then returns the same accumulated [`LlmResponse`] a non-streaming
    /// call would have. The default implementation has no true streaming: it
    /// calls `complete` and sends the whole response as a single delta.
    async fn stream(
        &self,
        request: &CompletionRequest,
        tx: mpsc::Sender<StreamDelta>,
    ) -> Result<LlmResponse, AgentError> {
        let response = self.complete(request).await?;
        let _ = tx
            .send(StreamDelta {
                content: Some(response.content.clone()),
                reasoning: response.reasoning.clone(),
                tool_call: None,
                usage: response.usage.clone(),
                finish_reason: response.finish_reason,
                raw: None,
            })
            .await;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_choice_mode_from_str_parses_known_values() {
        assert_eq!(
            "auto".parse::<ToolChoiceMode>().unwrap(),
            ToolChoiceMode::Auto
        );
        assert_eq!(
            "required".parse::<ToolChoiceMode>().unwrap(),
            ToolChoiceMode::Required
        );
    }

    #[test]
    fn tool_choice_mode_from_str_rejects_unknown_value() {
        assert!("unexpected".parse::<ToolChoiceMode>().is_err());
    }

    #[test]
    fn accumulator_orders_tool_calls_by_index_then_name() {
        let mut acc = ChunkAccumulator::new();
        acc.absorb(&StreamDelta {
            tool_call: Some(ToolCallDelta {
                index: 1,
                id: Some("c2".into()),
                name: Some("beta".into()),
                arguments_delta: Some("{}".into()),
            }),
            ..Default::default()
        });
        acc.absorb(&StreamDelta {
            tool_call: Some(ToolCallDelta {
                index: 0,
                id: Some("c1".into()),
                name: Some("al".into()),
                arguments_delta: Some("pha".into()),
            }),
            ..Default::default()
        });
        let resp = acc.finish();
        assert_eq!(resp.tool_calls.len(), 2);
        assert_eq!(resp.tool_calls[0].name, "alpha");
        assert_eq!(resp.tool_calls[1].name, "beta");
    }

    #[test]
    fn accumulator_concatenates_content_and_reasoning() {
        let mut acc = ChunkAccumulator::new();
        acc.absorb(&StreamDelta {
            content: Some("Hel".into()),
            reasoning: Some("thinking ".into()),
            ..Default::default()
        });
        acc.absorb(&StreamDelta {
            content: Some("lo".into()),
            reasoning: Some("more".into()),
            ..Default::default()
        });
        let resp = acc.finish();
        assert_eq!(resp.content, "Hello");
        assert_eq!(resp.reasoning.as_deref(), Some("thinking more"));
    }
}
