//! Bridges LLM-level [`StreamDelta`](crate::llm::StreamDelta) ticks into
//! loop-level [`ExecutionEvent`]s for Events stream mode.

use serde_json::json;

use crate::llm::StreamDelta;

use super::{EventType, ExecutionEvent};

/// Converts one provider delta into zero or more typed events. A delta can
/// carry content and reasoning in the same tick (rare, but some providers
/// interleave them), so this may return more than one event.
pub fn delta_to_events(delta: &StreamDelta, thread_id: &str, iteration: u32) -> Vec<ExecutionEvent> {
    let mut events = Vec::new();

    if let Some(ref content) = delta.content {
        if !content.is_empty() {
            events.push(
                ExecutionEvent::new(EventType::LlmStreamChunk, thread_id, iteration)
                    .with_data(json!({ "content": content })),
            );
        }
    }

    if let Some(ref reasoning) = delta.reasoning {
        if !reasoning.is_empty() {
            events.push(
                ExecutionEvent::new(EventType::LlmThinkingChunk, thread_id, iteration)
                    .with_data(json!({ "content": reasoning })),
            );
        }
    }

    events
}

pub fn iteration_start(thread_id: &str, iteration: u32) -> ExecutionEvent {
    ExecutionEvent::new(EventType::IterationStart, thread_id, iteration)
}

pub fn iteration_limit(thread_id: &str, iteration: u32, max_iterations: u32) -> ExecutionEvent {
    ExecutionEvent::new(EventType::IterationLimit, thread_id, iteration)
        .with_data(json!({ "max_iterations": max_iterations }))
}

pub fn llm_request(thread_id: &str, iteration: u32, model: &str) -> ExecutionEvent {
    ExecutionEvent::new(EventType::LlmRequest, thread_id, iteration).with_data(json!({ "model": model }))
}

pub fn llm_response(thread_id: &str, iteration: u32, response: &crate::llm::LlmResponse) -> ExecutionEvent {
    ExecutionEvent::new(EventType::LlmResponse, thread_id, iteration).with_data(json!({
        "content": response.content,
        "reasoning": response.reasoning,
        "tool_call_count": response.tool_calls.len(),
        "usage": response.usage,
    }))
}

pub fn tool_selected(thread_id: &str, iteration: u32, tool_name: &str, tool_call_id: &str) -> ExecutionEvent {
    ExecutionEvent::new(EventType::ToolSelected, thread_id, iteration).with_data(json!({
        "tool_name": tool_name,
        "tool_call_id": tool_call_id,
    }))
}

pub fn tool_progress(
    thread_id: &str,
    iteration: u32,
    tool_call_id: &str,
    progress: f64,
    total: Option<f64>,
    message: Option<String>,
) -> ExecutionEvent {
    ExecutionEvent::new(EventType::ToolProgress, thread_id, iteration).with_data(json!({
        "tool_call_id": tool_call_id,
        "progress": progress,
        "total": total,
        "message": message,
    }))
}

pub fn tool_result(thread_id: &str, iteration: u32, tool_call_id: &str, content: &str) -> ExecutionEvent {
    ExecutionEvent::new(EventType::ToolResult, thread_id, iteration).with_data(json!({
        "tool_call_id": tool_call_id,
        "content": content,
    }))
}

pub fn tool_error(thread_id: &str, iteration: u32, tool_call_id: &str, error: &str) -> ExecutionEvent {
    ExecutionEvent::new(EventType::ToolError, thread_id, iteration).with_data(json!({
        "tool_call_id": tool_call_id,
        "error": error,
    }))
}

pub fn message_created(thread_id: &str, iteration: u32, message_id: &str, role: &str) -> ExecutionEvent {
    ExecutionEvent::new(EventType::MessageCreated, thread_id, iteration).with_data(json!({
        "message_id": message_id,
        "role": role,
    }))
}

pub fn execution_error(thread_id: &str, iteration: u32, error: &str) -> ExecutionEvent {
    ExecutionEvent::new(EventType::ExecutionError, thread_id, iteration).with_data(json!({ "error": error }))
}

pub fn execution_complete(
    thread_id: &str,
    iteration: u32,
    duration_ms: i64,
    finish_reason: crate::llm::FinishReason,
) -> ExecutionEvent {
    ExecutionEvent::new(EventType::ExecutionComplete, thread_id, iteration)
        .with_data(json!({ "duration_ms": duration_ms, "finish_reason": finish_reason }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_to_events_skips_empty_fragments() {
        let delta = StreamDelta {
            content: Some(String::new()),
            ..Default::default()
        };
        assert!(delta_to_events(&delta, "t1", 0).is_empty());
    }

    #[test]
    fn delta_to_events_emits_both_kinds_when_both_present() {
        let delta = StreamDelta {
            content: Some("hi".into()),
            reasoning: Some("pondering".into()),
            ..Default::default()
        };
        let events = delta_to_events(&delta, "t1", 2);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventType::LlmStreamChunk);
        assert_eq!(events[1].event_type, EventType::LlmThinkingChunk);
        assert_eq!(events[0].iteration, 2);
    }
}
