//! Thread: the ordered, append-only message history of a single conversation (§3).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::{Message, Role};

/// Ordered sequence of messages plus an identifier and optional platform metadata.
///
/// Invariants enforced by construction-site discipline (the loop is the only
/// mutator during a run):
/// (a) every tool message's `tool_call_id` matches some tool-call id on an
///     earlier assistant message in the same thread;
/// (b) tool messages referencing one assistant message appear after it and
///     before the next assistant message;
/// (c) at most one system message, always at index 0 if present;
/// (d) messages are appended monotonically — prior messages are never removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    #[serde(default)]
    pub platform_metadata: BTreeMap<String, Value>,
    messages: Vec<Message>,
}

impl Thread {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            platform_metadata: BTreeMap::new(),
            messages: Vec::new(),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Appends a message to the thread. A system message may only be appended
    /// when the thread is empty, so it always lands at index 0.
    ///
    /// This does not re-validate the full invariant set on every call (that would
    /// be quadratic); callers that construct threads outside the loop should use
    /// [`Thread::validate`] before handing the thread to `run`/`stream`.
    pub fn add_message(&mut self, message: Message) {
        if message.role == Role::System && !self.messages.is_empty() {
            tracing::warn!("appending a system message to a non-empty thread; invariant (c) expects system at index 0 only");
        }
        self.messages.push(message);
    }

    /// The last assistant message's tool calls, if the thread is not yet terminal.
    pub fn pending_tool_calls(&self) -> &[crate::message::ToolCall] {
        match self.messages.last() {
            Some(m) if m.role == Role::Assistant => &m.tool_calls,
            _ => &[],
        }
    }

    /// True when the last message is an assistant message with no tool calls
    /// (the thread needs no further loop iteration).
    pub fn is_terminal(&self) -> bool {
        match self.messages.last() {
            Some(m) => m.role == Role::Assistant && m.tool_calls.is_empty(),
            None => false,
        }
    }

    /// Checks invariants (a)-(c) against the current messages. Returns the first
    /// violation found, if any.
    pub fn validate(&self) -> Result<(), String> {
        let mut system_count = 0;
        let mut open_tool_calls: Vec<&str> = Vec::new();
        for (idx, msg) in self.messages.iter().enumerate() {
            match msg.role {
                Role::System => {
                    system_count += 1;
                    if idx != 0 {
                        return Err(format!("system message at index {idx}, expected 0"));
                    }
                }
                Role::Assistant => {
                    open_tool_calls = msg.tool_calls.iter().map(|t| t.id.as_str()).collect();
                }
                Role::Tool => {
                    let Some(ref tool_call_id) = msg.tool_call_id else {
                        return Err(format!("tool message at index {idx} has no tool_call_id"));
                    };
                    if !open_tool_calls.contains(&tool_call_id.as_str()) {
                        return Err(format!(
                            "tool message at index {idx} references unknown tool_call_id {tool_call_id}"
                        ));
                    }
                }
                Role::User => {}
            }
        }
        if system_count > 1 {
            return Err(format!("{system_count} system messages, expected at most one"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Source, SourceKind, ToolCall};

    fn src() -> Source {
        Source::new(SourceKind::Agent, "agent")
    }

    #[test]
    fn valid_thread_passes_validation() {
        let mut t = Thread::new("t1");
        t.add_message(Message::system("sys", src()));
        t.add_message(Message::user("hi", src()));
        t.add_message(
            Message::assistant("", src())
                .with_tool_calls(vec![ToolCall::new("c1", "calc", serde_json::json!({}))]),
        );
        t.add_message(Message::tool("calc", "c1", "8", src()));
        assert!(t.validate().is_ok());
        assert!(!t.is_terminal());
    }

    #[test]
    fn tool_message_with_unknown_call_id_fails_validation() {
        let mut t = Thread::new("t1");
        t.add_message(Message::user("hi", src()));
        t.add_message(Message::tool("calc", "missing", "8", src()));
        assert!(t.validate().is_err());
    }

    #[test]
    fn terminal_thread_has_assistant_with_no_tool_calls() {
        let mut t = Thread::new("t1");
        t.add_message(Message::user("hi", src()));
        t.add_message(Message::assistant("done", src()));
        assert!(t.is_terminal());
    }
}
