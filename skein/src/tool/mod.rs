//! Tool Runner (§4.1): registration, schema, and dispatch for the callables an
//! agent can invoke mid-loop.

pub mod context;
pub mod error;
pub mod registry;

pub use context::{compose_progress, ProgressCallback, ToolContext};
pub use error::ToolError;
pub use registry::{RegisteredTool, ScopedToolHandle, ToolRunner};

use async_trait::async_trait;
use serde_json::Value;

use crate::message::Attachment;

/// The static description of a tool: its name, a model-facing description, and
/// a JSON Schema for its arguments.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// Where a tool came from, for provenance and filtering (MCP prefixing,
/// include/exclude, A2A delegation visibility).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolSourceKind {
    Local,
    Mcp,
    A2a,
    Skill,
    StructuredOutput,
}

/// Non-schema metadata about a tool's behavior. `interrupt` mirrors the
/// original framework's "interrupt" tool type: a true result tells the loop to
/// stop iterating immediately after this call completes, without treating it
/// as an error.
#[derive(Debug, Clone)]
pub struct ToolAttributes {
    pub source: ToolSourceKind,
    pub interrupt: bool,
    pub timeout_seconds: Option<f64>,
}

impl ToolAttributes {
    pub fn new(source: ToolSourceKind) -> Self {
        Self {
            source,
            interrupt: false,
            timeout_seconds: None,
        }
    }

    pub fn with_interrupt(mut self, interrupt: bool) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }
}

/// A tool result: text content plus any files it produced.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub content: String,
    pub attachments: Vec<Attachment>,
}

impl ToolOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachments(content: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        Self {
            content: content.into(),
            attachments,
        }
    }
}

/// A tool that needs no per-call context: just arguments in, a result out.
///
/// ```ignore
/// struct Calculator;
///
/// #[async_trait]
/// impl PlainTool for Calculator {
///     fn spec(&self) -> ToolSpec {
///         ToolSpec::new("calculate", "Evaluate an arithmetic expression", schema)
///     }
///
///     async fn call(&self, args: Value) -> Result<ToolOutput, String> {
///         let expr = args["expression"].as_str().unwrap_or_default();
///         Ok(ToolOutput::text(eval(expr)?))
///     }
/// }
/// ```
#[async_trait]
pub trait PlainTool: Send + Sync {
    fn spec(&self) -> ToolSpec;
    async fn call(&self, args: Value) -> Result<ToolOutput, String>;
}

/// A tool that needs the per-call [`ToolContext`] — dependencies, progress
/// reporting, or its own call id.
#[async_trait]
pub trait ContextualTool: Send + Sync {
    fn spec(&self) -> ToolSpec;
    async fn call(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput, String>;
}

/// The two ways a tool can be registered, chosen once at registration time
/// rather than discovered per call: a statically typed stand-in for runtime
/// parameter introspection.
pub enum ToolEntry {
    Plain(Box<dyn PlainTool>),
    Contextual(Box<dyn ContextualTool>),
}

impl ToolEntry {
    pub fn spec(&self) -> ToolSpec {
        match self {
            ToolEntry::Plain(t) => t.spec(),
            ToolEntry::Contextual(t) => t.spec(),
        }
    }
}
