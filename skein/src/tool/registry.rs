//! Tool registry and dispatch (§4.1).

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

use super::context::ProgressCallback;
use super::error::ToolError;
use super::{ToolAttributes, ToolContext, ToolEntry, ToolOutput, ToolSpec};

struct Registration {
    entry: ToolEntry,
    attributes: ToolAttributes,
}

/// A name-keyed set of callable tools. Cheap to clone (the map is `Arc`-backed);
/// clones share the same underlying registrations.
#[derive(Clone)]
pub struct ToolRunner {
    tools: Arc<DashMap<String, Registration>>,
}

impl Default for ToolRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot of one registered tool's public shape, for building completion
/// request tool schemas.
pub struct RegisteredTool {
    pub spec: ToolSpec,
    pub attributes: ToolAttributes,
}

impl ToolRunner {
    pub fn new() -> Self {
        Self {
            tools: Arc::new(DashMap::new()),
        }
    }

    /// Registers a tool under `name`. Rejects a non-positive timeout outright.
    /// The union of every registered name (server-prefixed or local) must stay
    /// unique: registering over an existing name is rejected rather than
    /// silently replacing it. Use [`Self::replace`] for the one legitimate
    /// case of swapping an MCP tool back in after its server reconnects.
    pub fn register(
        &self,
        name: impl Into<String>,
        entry: ToolEntry,
        attributes: ToolAttributes,
    ) -> Result<(), ToolError> {
        let name = name.into();
        if let Some(seconds) = attributes.timeout_seconds {
            if seconds <= 0.0 {
                return Err(ToolError::InvalidRegistration {
                    tool: name,
                    message: format!("timeout must be positive, got {seconds}"),
                });
            }
        }
        if self.tools.contains_key(&name) {
            return Err(ToolError::InvalidRegistration {
                tool: name.clone(),
                message: format!("a tool named '{name}' is already registered"),
            });
        }
        self.tools.insert(name, Registration { entry, attributes });
        Ok(())
    }

    /// Registers a tool under `name`, replacing any existing registration.
    /// Reserved for a server-driven reconnect re-announcing tools it already
    /// registered once; anywhere else a collision should be rejected, so
    /// prefer [`Self::register`].
    pub fn replace(
        &self,
        name: impl Into<String>,
        entry: ToolEntry,
        attributes: ToolAttributes,
    ) -> Result<(), ToolError> {
        let name = name.into();
        if let Some(seconds) = attributes.timeout_seconds {
            if seconds <= 0.0 {
                return Err(ToolError::InvalidRegistration {
                    tool: name,
                    message: format!("timeout must be positive, got {seconds}"),
                });
            }
        }
        self.tools.insert(name, Registration { entry, attributes });
        Ok(())
    }

    /// Registers a tool and returns a handle that unregisters it on drop — used
    /// for the structured-output synthetic output tool, which must not survive
    /// past the call that created it on any loop exit path.
    pub fn register_scoped(
        &self,
        name: impl Into<String>,
        entry: ToolEntry,
        attributes: ToolAttributes,
    ) -> Result<ScopedToolHandle, ToolError> {
        let name = name.into();
        self.register(name.clone(), entry, attributes)?;
        Ok(ScopedToolHandle {
            tools: self.tools.clone(),
            name,
        })
    }

    pub fn unregister(&self, name: &str) {
        self.tools.remove(name);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Snapshot of every registered tool's spec and attributes, in the order the
    /// underlying map yields them. Callers that need determinism (e.g. the
    /// completion handler building a tool list) should sort by name.
    pub fn list(&self) -> Vec<RegisteredTool> {
        self.tools
            .iter()
            .map(|entry| RegisteredTool {
                spec: entry.value().entry.spec(),
                attributes: entry.value().attributes.clone(),
            })
            .collect()
    }

    pub fn attributes(&self, name: &str) -> Option<ToolAttributes> {
        self.tools.get(name).map(|r| r.attributes.clone())
    }

    /// Normalizes raw tool-call arguments into a JSON object: a string is parsed
    /// as JSON, a non-object value or parse failure becomes an empty object.
    pub fn normalize_arguments(args: Value) -> Value {
        match args {
            Value::Object(_) => args,
            Value::String(s) if s.trim().is_empty() => Value::Object(Default::default()),
            Value::String(s) => match serde_json::from_str::<Value>(&s) {
                Ok(v @ Value::Object(_)) => v,
                _ => Value::Object(Default::default()),
            },
            _ => Value::Object(Default::default()),
        }
    }

    /// Executes a registered tool by name. Unknown names, timeouts, and
    /// exceptions are all returned as typed errors rather than panicking — the
    /// caller (the agent loop) turns every variant into a tool-result message.
    pub async fn execute(
        &self,
        tool_name: &str,
        tool_call_id: &str,
        arguments: Value,
        deps: BTreeMap<String, Value>,
        progress: Option<ProgressCallback>,
    ) -> Result<ToolOutput, ToolError> {
        let Some(registration) = self.tools.get(tool_name) else {
            return Err(ToolError::NotFound(tool_name.to_string()));
        };

        let arguments = Self::normalize_arguments(arguments);
        let timeout_seconds = registration.attributes.timeout_seconds;

        let fut = async {
            match &registration.entry {
                ToolEntry::Plain(tool) => tool.call(arguments).await,
                ToolEntry::Contextual(tool) => {
                    let mut ctx = ToolContext::new(tool_name, tool_call_id, deps);
                    if let Some(cb) = progress {
                        ctx = ctx.with_progress(cb);
                    }
                    tool.call(arguments, &ctx).await
                }
            }
        };

        let result = match timeout_seconds {
            Some(seconds) => {
                match tokio::time::timeout(std::time::Duration::from_secs_f64(seconds), fut).await
                {
                    Ok(result) => result,
                    Err(_) => {
                        return Err(ToolError::Timeout {
                            tool: tool_name.to_string(),
                            seconds,
                        })
                    }
                }
            }
            None => fut.await,
        };

        result.map_err(|message| ToolError::Exception {
            tool: tool_name.to_string(),
            message,
        })
    }
}

/// Unregisters its tool when dropped, guaranteeing cleanup on every loop exit
/// path (success, error, or panic unwind) without a manual try/finally.
pub struct ScopedToolHandle {
    tools: Arc<DashMap<String, Registration>>,
    name: String,
}

impl Drop for ScopedToolHandle {
    fn drop(&mut self) {
        self.tools.remove(&self.name);
    }
}
