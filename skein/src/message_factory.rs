//! Message Factory (§4.4): builds messages with consistent source and timing
//! metadata so the loop never constructs a `Message` by hand.

use chrono::{DateTime, Utc};

use crate::message::{Attachment, Message, Metrics, Source, SourceKind, ToolCall};

const DEFAULT_ERROR_PREAMBLE: &str = "I encountered an error while processing your request.";

/// Stamps messages with a consistent source and timing. One factory per agent;
/// cheap to construct, holds no mutable state.
#[derive(Debug, Clone)]
pub struct MessageFactory {
    agent_name: String,
    model_name: String,
}

impl MessageFactory {
    pub fn new(agent_name: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            model_name: model_name.into(),
        }
    }

    /// Builds an assistant message. Source is the agent, with the model recorded
    /// in attributes.
    pub fn assistant(
        &self,
        content: impl Into<String>,
        tool_calls: Vec<ToolCall>,
        metrics: Metrics,
    ) -> Message {
        let source = Source::new(SourceKind::Agent, self.agent_name.clone())
            .with_attribute("model", self.model_name.clone());
        Message::assistant(content, source)
            .with_tool_calls(tool_calls)
            .with_metrics(metrics)
    }

    /// Builds a tool result message. Source is the tool, with the agent recorded
    /// in attributes.
    pub fn tool(
        &self,
        tool_name: impl Into<String>,
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
        attachments: Vec<Attachment>,
        metrics: Metrics,
    ) -> Message {
        let tool_name = tool_name.into();
        let source = Source::new(SourceKind::Tool, tool_name.clone())
            .with_attribute("agent", self.agent_name.clone());
        Message::tool(tool_name, tool_call_id, content, source)
            .with_attachments(attachments)
            .with_metrics(metrics)
    }

    /// Builds a system-visible error message: an assistant message with a
    /// deterministic preamble (unless suppressed), zero-latency timing.
    pub fn error(&self, message: impl AsRef<str>, include_preamble: bool) -> Message {
        let content = if include_preamble {
            format!("{DEFAULT_ERROR_PREAMBLE} {}", message.as_ref())
        } else {
            message.as_ref().to_string()
        };
        let source = Source::new(SourceKind::Agent, self.agent_name.clone());
        Message::assistant(content, source).with_metrics(Metrics::instantaneous())
    }

    /// Builds the system prompt message. Source is the agent.
    pub fn system(&self, content: impl Into<String>) -> Message {
        let source = Source::new(SourceKind::Agent, self.agent_name.clone());
        Message::system(content, source)
    }

    /// Builds the designated max-iterations message emitted when the loop hits
    /// its iteration cap.
    pub fn max_iterations(&self, max_tool_iterations: u32) -> Message {
        self.error(
            format!(
                "Maximum tool iterations ({max_tool_iterations}) reached without a final answer."
            ),
            false,
        )
    }

    /// Computes `{started_at, ended_at, latency_ms}` from a start instant.
    pub fn timing(started_at: DateTime<Utc>) -> Metrics {
        Metrics::timed_from(started_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;

    fn factory() -> MessageFactory {
        MessageFactory::new("test-agent", "gpt-4o-mini")
    }

    #[test]
    fn assistant_message_records_model_in_attributes() {
        let msg = factory().assistant("hi", vec![], Metrics::default());
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(
            msg.source.attributes.get("model").unwrap(),
            &serde_json::json!("gpt-4o-mini")
        );
    }

    #[test]
    fn tool_message_records_agent_in_attributes() {
        let msg = factory().tool("calculate", "c1", "8", vec![], Metrics::default());
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.name.as_deref(), Some("calculate"));
        assert_eq!(msg.tool_call_id.as_deref(), Some("c1"));
        assert_eq!(
            msg.source.attributes.get("agent").unwrap(),
            &serde_json::json!("test-agent")
        );
    }

    #[test]
    fn error_message_includes_preamble_by_default() {
        let msg = factory().error("connection refused", true);
        assert!(msg.content.starts_with(DEFAULT_ERROR_PREAMBLE));
        assert_eq!(msg.metrics.latency_ms, Some(0));
    }

    #[test]
    fn error_message_can_suppress_preamble() {
        let msg = factory().error("connection refused", false);
        assert_eq!(msg.content, "connection refused");
    }

    #[test]
    fn max_iterations_message_names_the_cap() {
        let msg = factory().max_iterations(10);
        assert!(msg.content.contains('1'));
        assert!(msg.content.to_lowercase().contains("iteration"));
    }
}
