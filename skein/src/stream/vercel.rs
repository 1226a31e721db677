//! Vercel AI SDK Data Stream Protocol stream mode (§4.5): built on top of
//! Events mode. A stateful formatter translates the same [`ExecutionEvent`]
//! sequence the Events mode emits into the protocol's SSE frames, opening and
//! closing `text`/`reasoning`/`step` blocks as their underlying events start
//! and stop.

use serde_json::{json, Value};

use super::{EventType, ExecutionEvent};

fn frame(value: Value) -> String {
    format!("data: {}\n\n", value)
}

/// Tracks which Vercel protocol blocks are currently open so deltas land
/// inside a `-delta` frame instead of reopening a `-start` frame each time.
#[derive(Default)]
pub struct VercelFormatter {
    message_started: bool,
    text_open: bool,
    reasoning_open: bool,
    step_open: bool,
    message_id: String,
}

impl VercelFormatter {
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            ..Default::default()
        }
    }

    /// Translates one execution event into zero or more protocol frames.
    pub fn format(&mut self, event: &ExecutionEvent) -> Vec<String> {
        let mut frames = Vec::new();

        if !self.message_started {
            self.message_started = true;
            frames.push(frame(json!({ "type": "message-start", "id": self.message_id })));
        }

        match event.event_type {
            EventType::IterationStart => {
                if !self.step_open {
                    self.step_open = true;
                    frames.push(frame(json!({ "type": "step-start" })));
                }
            }
            EventType::LlmStreamChunk => {
                self.close_reasoning(&mut frames);
                if !self.text_open {
                    self.text_open = true;
                    frames.push(frame(json!({ "type": "text-start", "id": self.message_id })));
                }
                let content = event
                    .data
                    .get("content")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                frames.push(frame(json!({
                    "type": "text-delta",
                    "id": self.message_id,
                    "delta": content,
                })));
            }
            EventType::LlmThinkingChunk => {
                self.close_text(&mut frames);
                if !self.reasoning_open {
                    self.reasoning_open = true;
                    frames.push(frame(json!({ "type": "reasoning-start", "id": self.message_id })));
                }
                let content = event
                    .data
                    .get("content")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                frames.push(frame(json!({
                    "type": "reasoning-delta",
                    "id": self.message_id,
                    "delta": content,
                })));
            }
            EventType::LlmResponse => {
                self.close_text(&mut frames);
                self.close_reasoning(&mut frames);
            }
            EventType::ToolSelected => {
                frames.push(frame(json!({
                    "type": "tool-input-start",
                    "toolCallId": event.data.get("tool_call_id"),
                    "toolName": event.data.get("tool_name"),
                })));
                frames.push(frame(json!({
                    "type": "tool-input-available",
                    "toolCallId": event.data.get("tool_call_id"),
                    "toolName": event.data.get("tool_name"),
                })));
            }
            EventType::ToolResult => {
                frames.push(frame(json!({
                    "type": "tool-output-available",
                    "toolCallId": event.data.get("tool_call_id"),
                    "output": event.data.get("content"),
                })));
            }
            EventType::ToolError => {
                frames.push(frame(json!({
                    "type": "tool-output-error",
                    "toolCallId": event.data.get("tool_call_id"),
                    "errorText": event.data.get("error"),
                })));
            }
            EventType::IterationLimit => {
                self.close_step(&mut frames);
                frames.push(frame(json!({
                    "type": "error",
                    "errorText": "iteration limit reached",
                })));
            }
            EventType::ExecutionError => {
                self.close_text(&mut frames);
                self.close_reasoning(&mut frames);
                self.close_step(&mut frames);
                frames.push(frame(json!({
                    "type": "error",
                    "errorText": event.data.get("error"),
                })));
            }
            EventType::ExecutionComplete => {
                self.close_text(&mut frames);
                self.close_reasoning(&mut frames);
                self.close_step(&mut frames);
                let reason = event
                    .data
                    .get("finish_reason")
                    .cloned()
                    .unwrap_or_else(|| json!("stop"));
                frames.push(frame(json!({ "type": "finish", "reason": reason })));
                frames.push("data: [DONE]\n\n".to_string());
            }
            EventType::ToolProgress | EventType::MessageCreated | EventType::LlmRequest => {}
        }

        frames
    }

    fn close_text(&mut self, frames: &mut Vec<String>) {
        if self.text_open {
            frames.push(frame(json!({ "type": "text-end", "id": self.message_id })));
            self.text_open = false;
        }
    }

    fn close_reasoning(&mut self, frames: &mut Vec<String>) {
        if self.reasoning_open {
            frames.push(frame(json!({ "type": "reasoning-end", "id": self.message_id })));
            self.reasoning_open = false;
        }
    }

    fn close_step(&mut self, frames: &mut Vec<String>) {
        if self.step_open {
            frames.push(frame(json!({ "type": "step-finish" })));
            self.step_open = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_block_opens_once_and_closes_on_response() {
        let mut fmt = VercelFormatter::new("msg-1");
        let start = fmt.format(&ExecutionEvent::new(EventType::IterationStart, "t1", 0));
        assert_eq!(start.len(), 2);
        assert!(start[0].contains("message-start"));
        assert!(start[1].contains("step-start"));

        let chunk1 = ExecutionEvent::new(EventType::LlmStreamChunk, "t1", 0)
            .with_data(json!({ "content": "Hel" }));
        let frames1 = fmt.format(&chunk1);
        assert!(frames1[0].contains("text-start"));
        assert!(frames1[1].contains("text-delta"));

        let chunk2 = ExecutionEvent::new(EventType::LlmStreamChunk, "t1", 0)
            .with_data(json!({ "content": "lo" }));
        let frames2 = fmt.format(&chunk2);
        assert_eq!(frames2.len(), 1);
        assert!(frames2[0].contains("text-delta"));

        let response = ExecutionEvent::new(EventType::LlmResponse, "t1", 0);
        let frames3 = fmt.format(&response);
        assert!(frames3[0].contains("text-end"));
    }

    #[test]
    fn execution_complete_closes_everything_and_emits_done() {
        let mut fmt = VercelFormatter::new("msg-1");
        fmt.format(&ExecutionEvent::new(EventType::IterationStart, "t1", 0));
        fmt.format(
            &ExecutionEvent::new(EventType::LlmStreamChunk, "t1", 0)
                .with_data(json!({ "content": "hi" })),
        );
        let frames = fmt.format(
            &ExecutionEvent::new(EventType::ExecutionComplete, "t1", 0)
                .with_data(json!({ "finish_reason": "stop" })),
        );
        assert!(frames.iter().any(|f| f.contains("text-end")));
        assert!(frames.iter().any(|f| f.contains("step-finish")));
        assert!(frames.iter().any(|f| f.contains("\"type\":\"finish\"") && f.contains("\"reason\":\"stop\"")));
        assert_eq!(frames.last().unwrap(), "data: [DONE]\n\n");
    }
}
