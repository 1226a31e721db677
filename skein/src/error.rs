//! Error kinds raised by the agent loop and its components.
//!
//! Most failures never reach here: tool failures and validation failures are
//! contained as messages in the thread (§7 error handling). Only construction-time
//! configuration errors and structured-output retry exhaustion escape to the caller.

use thiserror::Error;

/// Errors surfaced by agent construction, MCP connect, and loop orchestration.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Bad tool timeout, unknown tool name in an include list, invalid MCP transport,
    /// or schema rejection. Raised at construction or `connect_mcp`; never reached mid-run.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Provider error from the completion handler. Contained as an `execution_error`
    /// event and an assistant error message; not retried by the core.
    #[error("completion error: {0}")]
    Completion(String),

    /// Exception from a tool impl, a timeout, or an unknown tool name. Normally
    /// contained as a tool-error result; this variant exists for paths that choose
    /// to propagate rather than contain (e.g. `step_errors_raise`).
    #[error("tool error: {0}")]
    Tool(#[from] crate::tool::ToolError),

    /// Structured-output validation failed after exhausting `retry_config.max_retries`.
    #[error("structured output validation failed after {retries} retries: {errors:?}")]
    StructuredOutputExhausted {
        retries: u32,
        errors: Vec<String>,
        last_response: String,
    },

    /// Any exception not classified above during loop orchestration.
    #[error("fatal error: {0}")]
    Fatal(String),
}

impl AgentError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }
}
