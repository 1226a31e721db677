//! OpenAI Chat Completions implementation of the Completion Handler (§4.3).
//!
//! Requires `OPENAI_API_KEY` in the environment unless an explicit key is set
//! via [`CompletionParams::api_key`]. Builds requests through `async_openai`'s
//! builder types the same way the non-streaming and streaming paths share one
//! request-construction routine, differing only in `stream(true)` and how the
//! response is consumed.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{debug, trace};

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionMessageToolCall, ChatCompletionMessageToolCalls,
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestToolMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionTool, ChatCompletionToolChoiceOption,
        ChatCompletionTools, CreateChatCompletionRequestArgs, FinishReason as OpenAiFinishReason,
        FunctionCall, FunctionObject, ResponseFormat as OpenAiResponseFormat,
        ResponseFormatJsonSchema, ToolChoiceOptions,
    },
    Client,
};

use crate::error::AgentError;
use crate::message::Role;

use super::{
    ChunkAccumulator, CompletionRequest, FinishReason, LlmClient, LlmResponse, LlmUsage,
    ReasoningLevel, ResponseFormat, StreamDelta, ToolCallDelta, ToolChoiceMode,
};

/// Maps OpenAI's per-choice stop reason onto this crate's provider-agnostic
/// [`FinishReason`]. `FunctionCall` is the legacy single-function-call
/// equivalent of `ToolCalls` and is folded into it; `ContentFilter` has no
/// direct equivalent in the Vercel frame vocabulary and is reported as `Error`.
fn map_finish_reason(reason: OpenAiFinishReason) -> FinishReason {
    match reason {
        OpenAiFinishReason::Stop => FinishReason::Stop,
        OpenAiFinishReason::ToolCalls | OpenAiFinishReason::FunctionCall => FinishReason::ToolCalls,
        OpenAiFinishReason::Length => FinishReason::Length,
        OpenAiFinishReason::ContentFilter => FinishReason::Error,
    }
}

/// OpenAI-backed completion handler.
///
/// Holds no per-call state: every request builds a fresh `async_openai`
/// request from the `CompletionRequest` it's given, so one `ChatOpenAI` can
/// safely serve concurrent calls for different agents or models.
pub struct ChatOpenAI {
    default_client: Client<OpenAIConfig>,
}

impl Default for ChatOpenAI {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatOpenAI {
    /// Client using `OPENAI_API_KEY`/`OPENAI_BASE_URL` from the environment by
    /// default; per-request `base_url`/`api_key` override this.
    pub fn new() -> Self {
        Self {
            default_client: Client::new(),
        }
    }

    fn client_for(&self, request: &CompletionRequest) -> Client<OpenAIConfig> {
        let params = &request.params;
        if params.base_url.is_none() && params.api_key.is_none() {
            return self.default_client.clone();
        }
        let mut config = OpenAIConfig::new();
        if let Some(ref key) = params.api_key {
            config = config.with_api_key(key);
        }
        if let Some(ref base) = params.base_url {
            config = config.with_api_base(base);
        }
        Client::with_config(config)
    }

    fn message_to_request(message: &crate::message::Message) -> ChatCompletionRequestMessage {
        match message.role {
            Role::System => ChatCompletionRequestSystemMessageArgs::default()
                .content(message.content.clone())
                .build()
                .expect("system message always builds")
                .into(),
            Role::User => ChatCompletionRequestUserMessageArgs::default()
                .content(message.content.clone())
                .build()
                .expect("user message always builds")
                .into(),
            Role::Assistant => {
                let mut builder = ChatCompletionRequestAssistantMessageArgs::default();
                builder.content(message.content.clone());
                if !message.tool_calls.is_empty() {
                    let tool_calls: Vec<ChatCompletionMessageToolCalls> = message
                        .tool_calls
                        .iter()
                        .map(|tc| {
                            ChatCompletionMessageToolCalls::Function(ChatCompletionMessageToolCall {
                                id: tc.id.clone(),
                                function: FunctionCall {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments_json(),
                                },
                            })
                        })
                        .collect();
                    builder.tool_calls(tool_calls);
                }
                builder
                    .build()
                    .expect("assistant message always builds")
                    .into()
            }
            Role::Tool => ChatCompletionRequestToolMessageArgs::default()
                .content(message.content.clone())
                .tool_call_id(message.tool_call_id.clone().unwrap_or_default())
                .build()
                .expect("tool message always builds")
                .into(),
        }
    }

    fn build_request(
        &self,
        request: &CompletionRequest,
        stream: bool,
    ) -> Result<async_openai::types::chat::CreateChatCompletionRequest, AgentError> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(request.model.clone());
        args.messages(
            request
                .messages
                .iter()
                .map(Self::message_to_request)
                .collect::<Vec<_>>(),
        );
        args.stream(stream);

        if !request.tools.is_empty() {
            let tools: Vec<ChatCompletionTools> = request
                .tools
                .iter()
                .map(|t| {
                    ChatCompletionTools::Function(ChatCompletionTool {
                        function: FunctionObject {
                            name: t.name.clone(),
                            description: Some(t.description.clone()),
                            parameters: Some(t.input_schema.clone()),
                            ..Default::default()
                        },
                    })
                })
                .collect();
            args.tools(tools);
        }

        let params = &request.params;
        if let Some(t) = params.temperature {
            args.temperature(t);
        }
        if let Some(mode) = params.tool_choice {
            let opt = match mode {
                ToolChoiceMode::Auto => ToolChoiceOptions::Auto,
                ToolChoiceMode::None => ToolChoiceOptions::None,
                ToolChoiceMode::Required => ToolChoiceOptions::Required,
            };
            args.tool_choice(ChatCompletionToolChoiceOption::Mode(opt));
        }
        if let Some(level) = params.reasoning {
            let effort = match level {
                ReasoningLevel::Low => "low",
                ReasoningLevel::Medium => "medium",
                ReasoningLevel::High => "high",
            };
            args.reasoning_effort(effort);
        }
        if let Some(ref format) = params.response_format {
            let value = match format {
                ResponseFormat::Text => OpenAiResponseFormat::Text,
                ResponseFormat::JsonObject => OpenAiResponseFormat::JsonObject,
                ResponseFormat::JsonSchema { name, schema } => OpenAiResponseFormat::JsonSchema {
                    json_schema: ResponseFormatJsonSchema {
                        name: name.clone(),
                        description: None,
                        schema: Some(schema.clone()),
                        strict: Some(true),
                    },
                },
            };
            args.response_format(value);
        }

        args.build().map_err(|e| {
            if params.drop_params {
                debug!(error = %e, "dropping unsupported completion params and retrying with defaults");
                AgentError::Completion(format!("request build failed even after dropping params: {e}"))
            } else {
                AgentError::Completion(format!("request build failed: {e}"))
            }
        })
    }
}

#[async_trait]
impl LlmClient for ChatOpenAI {
    async fn complete(&self, request: &CompletionRequest) -> Result<LlmResponse, AgentError> {
        let built = self.build_request(request, false)?;
        let client = self.client_for(request);

        debug!(model = %request.model, message_count = request.messages.len(), tools = request.tools.len(), "completion request");
        if let Ok(js) = serde_json::to_string(&built) {
            trace!(request = %js, "completion request body");
        }

        let response = client
            .chat()
            .create(built)
            .await
            .map_err(|e| AgentError::Completion(format!("OpenAI API error: {e}")))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Completion("OpenAI returned no choices".to_string()))?;

        let finish_reason = choice.finish_reason.map(map_finish_reason);
        let msg = choice.message;
        let content = msg.content.unwrap_or_default();
        let tool_calls = msg
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .filter_map(|tc| match tc {
                ChatCompletionMessageToolCalls::Function(f) => Some(
                    crate::message::ToolCall::from_wire(f.id, f.function.name, &f.function.arguments),
                ),
            })
            .collect();

        let usage = response.usage.map(|u| LlmUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(LlmResponse {
            content,
            reasoning: msg.reasoning_content,
            tool_calls,
            usage,
            finish_reason,
        })
    }

    async fn stream(
        &self,
        request: &CompletionRequest,
        tx: mpsc::Sender<StreamDelta>,
    ) -> Result<LlmResponse, AgentError> {
        let built = self.build_request(request, true)?;
        let client = self.client_for(request);

        debug!(model = %request.model, stream = true, "completion stream request");

        let mut stream = client
            .chat()
            .create_stream(built)
            .await
            .map_err(|e| AgentError::Completion(format!("OpenAI stream error: {e}")))?;

        let mut accumulator = ChunkAccumulator::new();

        while let Some(item) = stream.next().await {
            let chunk = item.map_err(|e| AgentError::Completion(format!("OpenAI stream error: {e}")))?;

            if let Ok(raw) = serde_json::to_value(&chunk) {
                let delta = StreamDelta {
                    raw: Some(raw),
                    ..Default::default()
                };
                let _ = tx.send(delta).await;
            }

            if let Some(ref u) = chunk.usage {
                let usage = LlmUsage {
                    prompt_tokens: u.prompt_tokens,
                    completion_tokens: u.completion_tokens,
                    total_tokens: u.total_tokens,
                };
                let delta = StreamDelta {
                    usage: Some(usage),
                    ..Default::default()
                };
                accumulator.absorb(&delta);
                let _ = tx.send(delta).await;
            }

            for choice in &chunk.choices {
                let d = &choice.delta;
                if let Some(ref content) = d.content {
                    if !content.is_empty() {
                        let delta = StreamDelta {
                            content: Some(content.clone()),
                            ..Default::default()
                        };
                        accumulator.absorb(&delta);
                        let _ = tx.send(delta).await;
                    }
                }
                if let Some(ref reasoning) = d.reasoning_content {
                    if !reasoning.is_empty() {
                        let delta = StreamDelta {
                            reasoning: Some(reasoning.clone()),
                            ..Default::default()
                        };
                        accumulator.absorb(&delta);
                        let _ = tx.send(delta).await;
                    }
                }
                if let Some(ref tool_calls) = d.tool_calls {
                    for tc in tool_calls {
                        let delta = StreamDelta {
                            tool_call: Some(ToolCallDelta {
                                index: tc.index,
                                id: tc.id.clone(),
                                name: tc.function.as_ref().and_then(|f| f.name.clone()),
                                arguments_delta: tc.function.as_ref().and_then(|f| f.arguments.clone()),
                            }),
                            ..Default::default()
                        };
                        accumulator.absorb(&delta);
                        let _ = tx.send(delta).await;
                    }
                }
                if let Some(reason) = choice.finish_reason {
                    let delta = StreamDelta {
                        finish_reason: Some(map_finish_reason(reason)),
                        ..Default::default()
                    };
                    accumulator.absorb(&delta);
                    let _ = tx.send(delta).await;
                }
            }
        }

        Ok(accumulator.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    fn unreachable_request(messages: Vec<Message>) -> (ChatOpenAI, CompletionRequest) {
        let client = ChatOpenAI::new();
        let mut req = CompletionRequest::new("gpt-4o-mini", messages);
        req.params.api_key = Some("test-key".to_string());
        req.params.base_url = Some("https://127.0.0.1:1".to_string());
        (client, req)
    }

    #[tokio::test]
    async fn complete_against_unreachable_base_returns_error() {
        let (client, req) = unreachable_request(vec![Message::user(
            "hi",
            crate::message::Source::new(crate::message::SourceKind::User, "user"),
        )]);
        assert!(client.complete(&req).await.is_err());
    }

    #[tokio::test]
    async fn stream_against_unreachable_base_returns_error() {
        let (client, req) = unreachable_request(vec![Message::user(
            "hi",
            crate::message::Source::new(crate::message::SourceKind::User, "user"),
        )]);
        let (tx, _rx) = mpsc::channel(8);
        assert!(client.stream(&req, tx).await.is_err());
    }
}
