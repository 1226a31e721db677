//! Agent (§9 design note): explicit composition instead of a mixin
//! hierarchy. Holds a tool runner, a completion handler, a message factory,
//! a prompt composer's inputs, and (per call) a structured-output
//! validator, and forwards operations to each rather than inheriting from
//! them.

pub mod delegation;
mod loop_;
pub mod structured_output;

pub use delegation::DelegationTool;
pub use loop_::RunOptions;

use std::sync::Arc;

use crate::config::AgentConfig;
use crate::llm::LlmClient;
use crate::message_factory::MessageFactory;
use crate::prompt::{self, PromptContext};
use crate::tool::ToolRunner;

/// An agent: the ingested configuration plus the live components the loop
/// drives. Cheap to clone — `tools` and `llm` are already `Arc`/shared under
/// the hood.
#[derive(Clone)]
pub struct Agent {
    pub config: AgentConfig,
    pub tools: ToolRunner,
    pub llm: Arc<dyn LlmClient>,
    pub factory: MessageFactory,
    pub prompt_context: PromptContext,
}

impl Agent {
    pub fn new(config: AgentConfig, llm: Arc<dyn LlmClient>, tools: ToolRunner) -> Self {
        let factory = MessageFactory::new(config.name.clone(), config.model_name.clone());
        Self {
            config,
            tools,
            llm,
            factory,
            prompt_context: PromptContext::default(),
        }
    }

    pub fn with_prompt_context(mut self, context: PromptContext) -> Self {
        self.prompt_context = context;
        self
    }

    /// Regenerates the system prompt from the current tool set. The loop
    /// calls this once per request (§4.6 step 1 calls it "frozen" — it is
    /// cheap enough here to simply rebuild every time rather than caching
    /// and invalidating on tool-set changes).
    pub fn system_prompt(&self) -> String {
        prompt::compose_system_prompt(
            self.config.purpose.as_deref(),
            self.config.notes.as_deref(),
            &self.prompt_context,
            &self.tools.list(),
        )
    }
}
