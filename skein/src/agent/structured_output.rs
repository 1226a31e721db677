//! Structured output via the synthetic "output tool" pattern (§4.6, §9):
//! rather than a provider-level `response_format`, the target schema is
//! exposed as an ordinary tool call. The provider's own function-calling
//! machinery enforces schema adherence, and regular tools stay callable in
//! the same turn.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::tool::{PlainTool, ToolOutput, ToolSpec};

/// Tool name convention the loop registers the synthetic output tool under.
pub const OUTPUT_TOOL_NAME: &str = "__final_answer__";

/// Where the output tool's captured arguments land once called. Shared
/// between the tool impl and the loop via `Arc`; `take` clears it so a
/// retried call doesn't see a stale value.
#[derive(Clone, Default)]
pub struct OutputSlot(Arc<Mutex<Option<Value>>>);

impl OutputSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Option<Value> {
        self.0.lock().expect("output slot poisoned").take()
    }
}

/// The synthetic tool: its schema is the target type's JSON schema, and its
/// implementation does nothing but record its arguments.
pub struct OutputTool {
    slot: OutputSlot,
    schema: Value,
}

impl OutputTool {
    pub fn new<T: JsonSchema>(slot: OutputSlot) -> Self {
        Self {
            slot,
            schema: schema_for::<T>(),
        }
    }
}

#[async_trait]
impl PlainTool for OutputTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            OUTPUT_TOOL_NAME,
            "Call this with your final answer once you have everything needed to respond.",
            self.schema.clone(),
        )
    }

    async fn call(&self, args: Value) -> Result<ToolOutput, String> {
        *self.slot.0.lock().expect("output slot poisoned") = Some(args);
        Ok(ToolOutput::text("structured output recorded"))
    }
}

/// Generates the JSON schema for a structured-output target type.
pub fn schema_for<T: JsonSchema>() -> Value {
    let mut generator = schemars::gen::SchemaGenerator::default();
    let schema = generator.root_schema_for::<T>();
    serde_json::to_value(&schema).unwrap_or(Value::Object(Default::default()))
}

/// Validates captured output-tool arguments against `T`. Checks the schema's
/// declared required fields first (for readable, field-naming error
/// messages), then attempts full deserialization for type mismatches.
pub fn validate<T: JsonSchema + DeserializeOwned>(value: &Value) -> Result<T, Vec<String>> {
    let schema = schema_for::<T>();
    let mut errors = Vec::new();

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        match value.as_object() {
            Some(map) => {
                for field in required {
                    if let Some(name) = field.as_str() {
                        if !map.contains_key(name) {
                            errors.push(format!("missing required field: {name}"));
                        }
                    }
                }
            }
            None => errors.push("expected a JSON object".to_string()),
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    serde_json::from_value::<T>(value.clone()).map_err(|e| vec![e.to_string()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, JsonSchema, PartialEq)]
    struct Invoice {
        invoice_id: String,
        total: f64,
        items: Vec<String>,
        paid: bool,
    }

    #[tokio::test]
    async fn output_tool_records_arguments_in_slot() {
        let slot = OutputSlot::new();
        let tool = OutputTool::new::<Invoice>(slot.clone());
        tool.call(serde_json::json!({"invoice_id": "INV-001"}))
            .await
            .unwrap();
        assert_eq!(slot.take(), Some(serde_json::json!({"invoice_id": "INV-001"})));
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn validate_reports_missing_required_fields_by_name() {
        let value = serde_json::json!({"invoice_id": "INV-001"});
        let errors = validate::<Invoice>(&value).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("total")));
        assert!(errors.iter().any(|e| e.contains("items")));
        assert!(errors.iter().any(|e| e.contains("paid")));
    }

    #[test]
    fn validate_succeeds_on_complete_payload() {
        let value = serde_json::json!({
            "invoice_id": "INV-001",
            "total": 42.5,
            "items": ["widget"],
            "paid": true,
        });
        let invoice = validate::<Invoice>(&value).unwrap();
        assert_eq!(invoice.invoice_id, "INV-001");
        assert!(invoice.paid);
    }
}
