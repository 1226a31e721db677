//! # Skein
//!
//! Agent orchestration runtime: the message/thread data model, a tool
//! runner, an MCP tool-source adapter, a completion handler abstraction over
//! chat-completion providers, four stream-mode implementations (silent,
//! typed events, raw provider passthrough, and the Vercel AI SDK Data Stream
//! Protocol), the agent loop that drives all of the above, and a thin A2A
//! streaming executor that maps the loop's event stream onto the A2A wire
//! format.
//!
//! ## Main modules
//!
//! - [`message`] / [`thread`]: [`Message`], [`Thread`] — the append-only
//!   conversation data model.
//! - [`message_factory`]: [`MessageFactory`] — builds messages with
//!   consistent source and timing metadata.
//! - [`tool`]: [`ToolRunner`], [`ToolSpec`], [`PlainTool`], [`ContextualTool`]
//!   — registration, schema, and dispatch for agent-callable tools.
//! - [`mcp`]: [`mcp::McpAdapter`] — exposes MCP server tools through the same
//!   [`ToolRunner`] local tools use.
//! - [`llm`]: [`LlmClient`] trait, [`MockLlm`], [`ChatOpenAI`] — the
//!   completion handler abstraction.
//! - [`stream`]: [`StreamMode`], [`StreamItem`], [`ExecutionEvent`] — the four
//!   stream modes' shared vocabulary.
//! - [`agent`]: [`Agent`] — explicit composition of the above into a runnable
//!   loop (`run`, `run_structured`, `stream`). [`agent::DelegationTool`]
//!   exposes a sub-agent as an ordinary callable tool.
//! - [`a2a`]: [`A2aExecutor`] — maps Events-mode output onto A2A task and
//!   artifact wire events.
//! - [`prompt`]: system prompt composition from purpose, notes, project
//!   instructions, skills, and the tool list.
//! - [`config`]: [`AgentConfig`] — the ingested agent configuration record.
//! - [`error`]: [`AgentError`] — errors that escape the loop rather than
//!   being contained as thread messages.

pub mod a2a;
pub mod agent;
pub mod config;
pub mod error;
pub mod llm;
pub mod mcp;
pub mod message;
pub mod message_factory;
pub mod prompt;
pub mod stream;
pub mod thread;
pub mod tool;

pub use a2a::A2aExecutor;
pub use agent::{Agent, DelegationTool, RunOptions};
pub use config::{AgentConfig, ResponseFormatDirective, RetryConfig};
pub use error::AgentError;
pub use llm::{ChatOpenAI, LlmClient, LlmResponse, LlmUsage, MockLlm, ScriptedTurn, ToolChoiceMode};
pub use mcp::{McpAdapter, McpError, McpServerConfig, McpTransportConfig};
pub use message::{Message, Role, ToolCall};
pub use message_factory::MessageFactory;
pub use prompt::PromptContext;
pub use stream::{AgentResult, ExecutionEvent, EventType, StreamItem, StreamMode};
pub use thread::Thread;
pub use tool::{ContextualTool, PlainTool, ToolOutput, ToolRunner, ToolSpec};

/// When running `cargo test -p skein`, initializes tracing from `RUST_LOG` so
/// unit tests in `src/**` can print logs with `--nocapture`.
#[cfg(test)]
mod test_logging {
    use ctor::ctor;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::Layer;

    #[ctor]
    fn init() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_filter(filter),
            )
            .try_init();
    }
}
