//! A2A Streaming Executor (§4.7): a thin consumer mapping the loop's events
//! mode onto A2A task/artifact wire events for a single task.

use tokio::sync::mpsc;

use crate::agent::Agent;
use crate::error::AgentError;
use crate::stream::{EventType, ExecutionEvent, StreamItem};
use crate::thread::Thread;

use super::{A2aEvent, Part, TaskState};

/// Translates one task's execution-event stream into A2A wire events.
/// Stateful only in the sense of remembering the task and artifact ids it was
/// constructed with — a fresh instance per task.
pub struct A2aExecutor {
    task_id: String,
    artifact_id: String,
}

impl A2aExecutor {
    pub fn new(task_id: impl Into<String>, artifact_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            artifact_id: artifact_id.into(),
        }
    }

    /// The working-status event a streaming run emits before anything else.
    pub fn start(&self) -> A2aEvent {
        A2aEvent::TaskStatusUpdate {
            task_id: self.task_id.clone(),
            state: TaskState::Working,
            message: None,
        }
    }

    /// Translates one execution event into zero or more A2A events. Tool
    /// activity between LLM streams produces no A2A event of its own —
    /// streaming resumes transparently once the next `llm_stream_chunk`
    /// arrives.
    pub fn translate(&self, event: &ExecutionEvent) -> Vec<A2aEvent> {
        match event.event_type {
            EventType::LlmStreamChunk => {
                let text = event
                    .data
                    .get("content")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                vec![self.artifact_chunk(text, false)]
            }
            EventType::LlmResponse => {
                let content = event
                    .data
                    .get("content")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                vec![self.artifact_chunk(content, true)]
            }
            EventType::ExecutionComplete => vec![A2aEvent::TaskStatusUpdate {
                task_id: self.task_id.clone(),
                state: TaskState::Completed,
                message: None,
            }],
            EventType::ExecutionError => {
                let error = event
                    .data
                    .get("error")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                vec![A2aEvent::TaskStatusUpdate {
                    task_id: self.task_id.clone(),
                    state: TaskState::Failed,
                    message: Some(error),
                }]
            }
            _ => Vec::new(),
        }
    }

    fn artifact_chunk(&self, text: &str, last_chunk: bool) -> A2aEvent {
        A2aEvent::TaskArtifactUpdate {
            task_id: self.task_id.clone(),
            artifact_id: self.artifact_id.clone(),
            parts: vec![Part::text(text)],
            append: true,
            last_chunk,
        }
    }
}

/// Drains an Events-mode stream, translating each event and forwarding the
/// result to `out`. Returns once `items` closes (the run completed).
pub async fn drive_streaming(
    executor: A2aExecutor,
    mut items: mpsc::Receiver<StreamItem>,
    out: mpsc::Sender<A2aEvent>,
) {
    if out.send(executor.start()).await.is_err() {
        return;
    }
    while let Some(item) = items.recv().await {
        if let StreamItem::Event(event) = item {
            for a2a_event in executor.translate(&event) {
                if out.send(a2a_event).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// The streaming-disabled variant (§4.7): calls `run` once and emits only the
/// final artifact, with no intermediate status events.
pub async fn run_non_streaming(
    agent: &Agent,
    thread: &mut Thread,
    task_id: impl Into<String>,
    artifact_id: impl Into<String>,
) -> Result<A2aEvent, AgentError> {
    let result = agent.run(thread).await?;
    Ok(A2aEvent::TaskArtifactUpdate {
        task_id: task_id.into(),
        artifact_id: artifact_id.into(),
        parts: vec![Part::text(result.output)],
        append: false,
        last_chunk: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stream_chunk_translates_to_non_final_artifact_update() {
        let executor = A2aExecutor::new("t1", "a1");
        let event = ExecutionEvent::new(EventType::LlmStreamChunk, "t1", 0)
            .with_data(json!({ "content": "Hel" }));
        let events = executor.translate(&event);
        match &events[0] {
            A2aEvent::TaskArtifactUpdate { append, last_chunk, .. } => {
                assert!(*append);
                assert!(!*last_chunk);
            }
            _ => panic!("expected artifact update"),
        }
    }

    #[test]
    fn llm_response_translates_to_final_artifact_update() {
        let executor = A2aExecutor::new("t1", "a1");
        let event = ExecutionEvent::new(EventType::LlmResponse, "t1", 0)
            .with_data(json!({ "content": "Hello" }));
        let events = executor.translate(&event);
        match &events[0] {
            A2aEvent::TaskArtifactUpdate { last_chunk, .. } => assert!(*last_chunk),
            _ => panic!("expected artifact update"),
        }
    }

    #[test]
    fn execution_error_translates_to_failed_status() {
        let executor = A2aExecutor::new("t1", "a1");
        let event = ExecutionEvent::new(EventType::ExecutionError, "t1", 0)
            .with_data(json!({ "error": "boom" }));
        let events = executor.translate(&event);
        match &events[0] {
            A2aEvent::TaskStatusUpdate { state, message, .. } => {
                assert_eq!(*state, TaskState::Failed);
                assert_eq!(message.as_deref(), Some("boom"));
            }
            _ => panic!("expected status update"),
        }
    }

    #[test]
    fn tool_selected_produces_no_event() {
        let executor = A2aExecutor::new("t1", "a1");
        let event = ExecutionEvent::new(EventType::ToolSelected, "t1", 0);
        assert!(executor.translate(&event).is_empty());
    }
}
