//! A scripted completion handler for agent-loop tests: returns fixed
//! responses in sequence rather than calling a real provider.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::AgentError;
use crate::message::ToolCall;

use super::{
    ChunkAccumulator, CompletionRequest, FinishReason, LlmClient, LlmResponse, LlmUsage,
    StreamDelta,
};

/// One scripted turn: assistant content plus any tool calls it should emit.
#[derive(Clone, Debug, Default)]
pub struct ScriptedTurn {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<LlmUsage>,
    /// Defaults to `ToolCalls` when `tool_calls` is non-empty, else `Stop`,
    /// mirroring what a real provider would report for the same shape of
    /// response. Set explicitly to script `Length`/`Error` turns.
    pub finish_reason: Option<FinishReason>,
}

impl ScriptedTurn {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
            usage: None,
            finish_reason: None,
        }
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    pub fn with_finish_reason(mut self, finish_reason: FinishReason) -> Self {
        self.finish_reason = Some(finish_reason);
        self
    }

    fn resolved_finish_reason(&self) -> FinishReason {
        self.finish_reason.unwrap_or(if self.tool_calls.is_empty() {
            FinishReason::Stop
        } else {
            FinishReason::ToolCalls
        })
    }
}

/// Plays back a fixed sequence of turns, one per `complete`/`stream` call.
/// Calling past the end of the script repeats the final turn, so loop tests
/// that overrun their expected iteration count fail on the iteration cap
/// rather than on a panic inside the mock.
pub struct MockLlm {
    turns: Vec<ScriptedTurn>,
    call_count: AtomicUsize,
    stream_by_char: bool,
    requests_seen: Mutex<Vec<CompletionRequest>>,
}

impl MockLlm {
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            turns,
            call_count: AtomicUsize::new(0),
            stream_by_char: false,
            requests_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn single(turn: ScriptedTurn) -> Self {
        Self::new(vec![turn])
    }

    pub fn with_stream_by_char(mut self) -> Self {
        self.stream_by_char = true;
        self
    }

    fn next_turn(&self) -> ScriptedTurn {
        let n = self.call_count.fetch_add(1, Ordering::SeqCst);
        self.turns
            .get(n)
            .or_else(|| self.turns.last())
            .cloned()
            .unwrap_or_default()
    }

    pub fn calls_made(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn requests_seen(&self) -> usize {
        self.requests_seen.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn complete(&self, request: &CompletionRequest) -> Result<LlmResponse, AgentError> {
        self.requests_seen.lock().unwrap().push(request.clone());
        let turn = self.next_turn();
        let finish_reason = Some(turn.resolved_finish_reason());
        Ok(LlmResponse {
            content: turn.content,
            reasoning: None,
            tool_calls: turn.tool_calls,
            usage: turn.usage,
            finish_reason,
        })
    }

    async fn stream(
        &self,
        request: &CompletionRequest,
        tx: mpsc::Sender<StreamDelta>,
    ) -> Result<LlmResponse, AgentError> {
        let response = self.complete(request).await?;
        let mut acc = ChunkAccumulator::new();
        if self.stream_by_char {
            for c in response.content.chars() {
                let delta = StreamDelta {
                    content: Some(c.to_string()),
                    ..Default::default()
                };
                acc.absorb(&delta);
                let _ = tx.send(delta).await;
            }
        } else if !response.content.is_empty() {
            let delta = StreamDelta {
                content: Some(response.content.clone()),
                ..Default::default()
            };
            acc.absorb(&delta);
            let _ = tx.send(delta).await;
        }
        for (i, tc) in response.tool_calls.iter().enumerate() {
            let delta = StreamDelta {
                tool_call: Some(super::ToolCallDelta {
                    index: i as u32,
                    id: Some(tc.id.clone()),
                    name: Some(tc.name.clone()),
                    arguments_delta: Some(tc.arguments_json()),
                }),
                ..Default::default()
            };
            acc.absorb(&delta);
            let _ = tx.send(delta).await;
        }
        if response.usage.is_some() {
            let delta = StreamDelta {
                usage: response.usage.clone(),
                ..Default::default()
            };
            acc.absorb(&delta);
            let _ = tx.send(delta).await;
        }
        if response.finish_reason.is_some() {
            let delta = StreamDelta {
                finish_reason: response.finish_reason,
                ..Default::default()
            };
            acc.absorb(&delta);
            let _ = tx.send(delta).await;
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn plays_back_scripted_turns_in_order() {
        let llm = MockLlm::new(vec![
            ScriptedTurn::text("first"),
            ScriptedTurn::text("second"),
        ]);
        let req = CompletionRequest::new("test-model", vec![]);
        assert_eq!(llm.complete(&req).await.unwrap().content, "first");
        assert_eq!(llm.complete(&req).await.unwrap().content, "second");
        assert_eq!(llm.complete(&req).await.unwrap().content, "second");
    }

    #[tokio::test]
    async fn stream_sends_deltas_and_returns_full_response() {
        let llm = MockLlm::single(ScriptedTurn::text("hi")).with_stream_by_char();
        let req = CompletionRequest::new("test-model", vec![]);
        let (tx, mut rx) = mpsc::channel(16);
        let resp = llm.stream(&req, tx).await.unwrap();
        assert_eq!(resp.content, "hi");
        let mut received = String::new();
        while let Ok(delta) = rx.try_recv() {
            if let Some(c) = delta.content {
                received.push_str(&c);
            }
        }
        assert_eq!(received, "hi");
    }
}
