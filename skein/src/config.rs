//! Agent configuration (§6, ingested): the record a caller builds (directly
//! or from a YAML file, out of scope here) before constructing an [`Agent`](crate::agent::Agent).

use crate::llm::{CompletionParams, ReasoningLevel, ResponseFormat as ProviderResponseFormat, ToolChoiceMode};

pub const DEFAULT_MAX_TOOL_ITERATIONS: u32 = 10;
const MAX_TOOL_ITERATIONS_CEILING: u32 = 100;
const MAX_RETRIES_CEILING: u32 = 10;

/// `json` requires the provider to emit a JSON object; `none` leaves the
/// response format unconstrained. Distinct from the structured-output output
/// tool (§4.7), which is driven by `response_type` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormatDirective {
    #[default]
    None,
    Json,
}

/// Bounded retry policy for structured-output validation failures.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub retry_on_validation_error: bool,
    pub backoff_base_seconds: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_on_validation_error: true,
            backoff_base_seconds: 0.0,
        }
    }
}

impl RetryConfig {
    /// Clamps `max_retries` to the documented 0..=10 range.
    pub fn new(max_retries: u32, retry_on_validation_error: bool, backoff_base_seconds: f64) -> Self {
        Self {
            max_retries: max_retries.min(MAX_RETRIES_CEILING),
            retry_on_validation_error,
            backoff_base_seconds,
        }
    }
}

/// The ingested agent configuration record. `tools`/`agents`/`mcp`/`skills`/
/// `agents_md` discovery is performed by the caller before construction (this
/// crate's core takes the already-resolved [`ToolRunner`](crate::tool::ToolRunner)
/// and prompt context) — this record carries the scalar fields §6 lists that
/// directly parameterize the loop and the completion handler.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub name: String,
    pub model_name: String,
    pub purpose: Option<String>,
    pub notes: Option<String>,
    pub version: Option<String>,
    pub temperature: Option<f32>,
    pub max_tool_iterations: u32,
    pub response_format: ResponseFormatDirective,
    pub retry_config: RetryConfig,
    pub reasoning: Option<ReasoningLevel>,
    pub api_base: Option<String>,
    pub api_key: Option<String>,
    pub extra_headers: Vec<(String, String)>,
    pub drop_params: bool,
    pub step_errors_raise: bool,
}

impl AgentConfig {
    pub fn new(name: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model_name: model_name.into(),
            purpose: None,
            notes: None,
            version: None,
            temperature: None,
            max_tool_iterations: DEFAULT_MAX_TOOL_ITERATIONS,
            response_format: ResponseFormatDirective::default(),
            retry_config: RetryConfig::default(),
            reasoning: None,
            api_base: None,
            api_key: None,
            extra_headers: Vec::new(),
            drop_params: true,
            step_errors_raise: false,
        }
    }

    /// Clamps `max_tool_iterations` to the enforced upper bound and applies
    /// `${NAME}` environment-variable substitution to every string field, as
    /// the ingestion step requires.
    pub fn ingest(mut self) -> Self {
        self.max_tool_iterations = self.max_tool_iterations.min(MAX_TOOL_ITERATIONS_CEILING);
        self.retry_config.max_retries = self.retry_config.max_retries.min(MAX_RETRIES_CEILING);
        self.name = interpolate_env(&self.name);
        self.model_name = interpolate_env(&self.model_name);
        self.purpose = self.purpose.map(|s| interpolate_env(&s));
        self.notes = self.notes.map(|s| interpolate_env(&s));
        self.api_base = self.api_base.map(|s| interpolate_env(&s));
        self.api_key = self.api_key.map(|s| interpolate_env(&s));
        self.extra_headers = self
            .extra_headers
            .into_iter()
            .map(|(k, v)| (interpolate_env(&k), interpolate_env(&v)))
            .collect();
        self
    }

    /// Builds the provider-facing completion params this config implies.
    pub fn completion_params(&self) -> CompletionParams {
        CompletionParams {
            temperature: self.temperature,
            tool_choice: Some(ToolChoiceMode::Auto),
            reasoning: self.reasoning,
            response_format: match self.response_format {
                ResponseFormatDirective::Json => Some(ProviderResponseFormat::JsonObject),
                ResponseFormatDirective::None => None,
            },
            base_url: self.api_base.clone(),
            api_key: self.api_key.clone(),
            extra_headers: self.extra_headers.clone(),
            drop_params: self.drop_params,
        }
    }
}

/// Replaces every `${NAME}` occurrence with the environment variable's value,
/// leaving the placeholder untouched if the variable is unset.
pub fn interpolate_env(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start..].find('}') else {
            out.push_str(rest);
            return out;
        };
        out.push_str(&rest[..start]);
        let name = &rest[start + 2..start + end];
        match std::env::var(name) {
            Ok(value) => out.push_str(&value),
            Err(_) => out.push_str(&rest[start..start + end + 1]),
        }
        rest = &rest[start + end + 1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolate_env_substitutes_known_variable() {
        std::env::set_var("SKEIN_TEST_VAR", "hello");
        assert_eq!(interpolate_env("value=${SKEIN_TEST_VAR}!"), "value=hello!");
        std::env::remove_var("SKEIN_TEST_VAR");
    }

    #[test]
    fn interpolate_env_leaves_unset_variable_untouched() {
        assert_eq!(interpolate_env("value=${SKEIN_DEFINITELY_UNSET}"), "value=${SKEIN_DEFINITELY_UNSET}");
    }

    #[test]
    fn ingest_clamps_max_tool_iterations_and_retries() {
        let mut config = AgentConfig::new("a", "m");
        config.max_tool_iterations = 1000;
        config.retry_config.max_retries = 50;
        let config = config.ingest();
        assert_eq!(config.max_tool_iterations, MAX_TOOL_ITERATIONS_CEILING);
        assert_eq!(config.retry_config.max_retries, MAX_RETRIES_CEILING);
    }

    #[test]
    fn ingest_interpolates_name_and_api_key() {
        std::env::set_var("SKEIN_TEST_KEY", "sk-test");
        let config = AgentConfig::new("agent-${SKEIN_TEST_KEY}", "gpt-4o-mini");
        let mut config = config;
        config.api_key = Some("${SKEIN_TEST_KEY}".into());
        let config = config.ingest();
        assert_eq!(config.name, "agent-sk-test");
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        std::env::remove_var("SKEIN_TEST_KEY");
    }
}
