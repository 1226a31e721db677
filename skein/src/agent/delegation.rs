//! Agent-to-agent delegation tool (§4.8): exposes a sub-[`Agent`] as an
//! ordinary callable tool, the way the MCP adapter exposes a remote server's
//! tools — calling it is indistinguishable, from the parent loop's
//! perspective, from calling any other local tool.

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::message::{Message, Source, SourceKind};
use crate::thread::Thread;
use crate::tool::{PlainTool, ToolOutput, ToolSpec};

use super::Agent;

/// Forwards its `message` argument onto a fresh thread for `sub_agent` and
/// runs that agent's loop to completion, returning its final assistant
/// content as the tool's result.
///
/// Registered under `ToolSourceKind::A2a` (mirroring `ToolSourceKind::Mcp` for
/// `McpToolAdapter`) with the conventional name `delegate_to_<name>`.
pub struct DelegationTool {
    name: String,
    description: String,
    sub_agent: Agent,
}

impl DelegationTool {
    pub fn new(sub_agent_name: impl Into<String>, description: impl Into<String>, sub_agent: Agent) -> Self {
        Self {
            name: format!("delegate_to_{}", sub_agent_name.into()),
            description: description.into(),
            sub_agent,
        }
    }

    pub fn tool_name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl PlainTool for DelegationTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            self.name.clone(),
            self.description.clone(),
            json!({
                "type": "object",
                "properties": {
                    "message": {
                        "type": "string",
                        "description": "The task or question to delegate to the sub-agent.",
                    }
                },
                "required": ["message"],
            }),
        )
    }

    async fn call(&self, args: Value) -> Result<ToolOutput, String> {
        let message = args
            .get("message")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "delegation tool requires a \"message\" string argument".to_string())?;

        let mut thread = Thread::new(Uuid::new_v4().to_string());
        thread.add_message(Message::user(message, Source::new(SourceKind::User, "delegation")));

        let result = self
            .sub_agent
            .run(&mut thread)
            .await
            .map_err(|e| e.to_string())?;

        if !result.success {
            return Err(format!("sub-agent did not complete successfully: {}", result.output));
        }
        Ok(ToolOutput::text(result.output))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use crate::config::AgentConfig;
    use crate::error::AgentError;
    use crate::llm::{CompletionRequest, LlmClient, LlmResponse, MockLlm, ScriptedTurn, StreamDelta};
    use crate::tool::ToolRunner;

    use super::*;

    fn config(name: &str) -> AgentConfig {
        AgentConfig::new(name, "mock-model")
    }

    /// A completion handler that always fails, to exercise the sub-agent
    /// failure path without needing error injection in `MockLlm`.
    struct AlwaysErrorsLlm;

    #[async_trait]
    impl LlmClient for AlwaysErrorsLlm {
        async fn complete(&self, _request: &CompletionRequest) -> Result<LlmResponse, AgentError> {
            Err(AgentError::Completion("provider unreachable".into()))
        }

        async fn stream(
            &self,
            _request: &CompletionRequest,
            _tx: mpsc::Sender<StreamDelta>,
        ) -> Result<LlmResponse, AgentError> {
            Err(AgentError::Completion("provider unreachable".into()))
        }
    }

    #[tokio::test]
    async fn delegation_tool_name_follows_convention() {
        let llm = Arc::new(MockLlm::single(ScriptedTurn::text("ack")));
        let sub_agent = Agent::new(config("researcher"), llm, ToolRunner::new());
        let tool = DelegationTool::new("researcher", "delegates research tasks", sub_agent);
        assert_eq!(tool.tool_name(), "delegate_to_researcher");
        assert_eq!(tool.spec().name, "delegate_to_researcher");
    }

    #[tokio::test]
    async fn delegation_runs_sub_agent_and_returns_its_output() {
        let llm = Arc::new(MockLlm::single(ScriptedTurn::text("42")));
        let sub_agent = Agent::new(config("math"), llm, ToolRunner::new());
        let tool = DelegationTool::new("math", "delegates math", sub_agent);
        let out = tool
            .call(json!({ "message": "what is 6 * 7?" }))
            .await
            .unwrap();
        assert_eq!(out.content, "42");
    }

    #[tokio::test]
    async fn delegation_surfaces_sub_agent_failure_as_tool_error() {
        let sub_agent = Agent::new(config("flaky"), Arc::new(AlwaysErrorsLlm), ToolRunner::new());
        let tool = DelegationTool::new("flaky", "delegates to a flaky agent", sub_agent);
        let err = tool.call(json!({ "message": "hi" })).await.unwrap_err();
        assert!(err.contains("did not complete successfully"));
    }

    #[tokio::test]
    async fn delegation_rejects_missing_message_argument() {
        let llm = Arc::new(MockLlm::new(vec![]));
        let sub_agent = Agent::new(config("noop"), llm, ToolRunner::new());
        let tool = DelegationTool::new("noop", "noop", sub_agent);
        let err = tool.call(json!({})).await.unwrap_err();
        assert!(err.contains("message"));
    }
}
