use thiserror::Error;

/// Errors produced by tool registration and dispatch (§4.1, §7).
///
/// A tool exception never propagates to the loop as a Rust panic: tool
/// implementations return `Result<ToolOutput, String>`, and any of these
/// variants is pattern-matched into a tool-error result message, never raised.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    NotFound(String),

    #[error("tool '{tool}' timed out after {seconds}s")]
    Timeout { tool: String, seconds: f64 },

    #[error("tool '{tool}' raised an exception: {message}")]
    Exception { tool: String, message: String },

    #[error("invalid registration for '{tool}': {message}")]
    InvalidRegistration { tool: String, message: String },

    #[error("structured-output validation failed: {0:?}")]
    Validation(Vec<String>),
}

impl ToolError {
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::NotFound(_) => "unknown",
            ToolError::Timeout { .. } => "timeout",
            ToolError::Exception { .. } => "exception",
            ToolError::InvalidRegistration { .. } => "invalid_registration",
            ToolError::Validation(_) => "validation",
        }
    }
}
