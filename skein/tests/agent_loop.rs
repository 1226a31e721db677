//! End-to-end agent loop tests: scripted LLM turns driving real tool
//! dispatch, structured output, iteration capping, and the Vercel stream
//! mode, with no network or provider involved.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use skein::agent::structured_output::OUTPUT_TOOL_NAME;
use skein::agent::RunOptions;
use skein::message::{Source, SourceKind};
use skein::tool::{PlainTool, ToolAttributes, ToolEntry, ToolOutput, ToolRunner, ToolSourceKind, ToolSpec};
use skein::{Agent, AgentConfig, Message, MockLlm, ScriptedTurn, StreamItem, StreamMode, Thread, ToolCall};

fn user_thread(id: &str, content: &str) -> Thread {
    let mut thread = Thread::new(id);
    thread.add_message(Message::user(content, Source::new(SourceKind::User, "user")));
    thread
}

fn agent_config() -> AgentConfig {
    AgentConfig::new("test-agent", "mock-model")
}

struct Calculate;

#[async_trait]
impl PlainTool for Calculate {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "calculate",
            "Evaluates a simple arithmetic expression",
            json!({
                "type": "object",
                "properties": { "expression": { "type": "string" } },
                "required": ["expression"],
            }),
        )
    }

    async fn call(&self, args: Value) -> Result<ToolOutput, String> {
        let expr = args.get("expression").and_then(|v| v.as_str()).unwrap_or_default();
        match expr {
            "5+3" => Ok(ToolOutput::text("8")),
            other => Err(format!("cannot evaluate: {other}")),
        }
    }
}

#[tokio::test]
async fn single_turn_tool_call_produces_final_answer() {
    let tools = ToolRunner::new();
    tools
        .register("calculate", ToolEntry::Plain(Box::new(Calculate)), ToolAttributes::new(ToolSourceKind::Local))
        .unwrap();

    let llm = Arc::new(MockLlm::new(vec![
        ScriptedTurn::text("").with_tool_calls(vec![ToolCall::new(
            "c1",
            "calculate",
            json!({ "expression": "5+3" }),
        )]),
        ScriptedTurn::text("The result is 8."),
    ]));

    let agent = Agent::new(agent_config(), llm, tools);
    let mut thread = user_thread("t1", "What is 5 + 3?");

    let result = agent.run(&mut thread).await.unwrap();

    assert!(result.success);
    assert_eq!(result.output, "The result is 8.");
    assert_eq!(result.iterations, 2);
    let tool_msg = thread
        .messages()
        .iter()
        .find(|m| m.tool_call_id.as_deref() == Some("c1"))
        .expect("tool result message");
    assert_eq!(tool_msg.content, "8");
}

/// A tool that sleeps `delay_ms` then returns `label`, to exercise ordering
/// under out-of-order completion.
struct Delayed {
    label: &'static str,
    delay_ms: u64,
}

#[async_trait]
impl PlainTool for Delayed {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(self.label, "delayed echo", json!({}))
    }

    async fn call(&self, _args: Value) -> Result<ToolOutput, String> {
        tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        Ok(ToolOutput::text(format!("{}-done", self.label)))
    }
}

#[tokio::test]
async fn parallel_tool_calls_are_appended_in_call_order_not_completion_order() {
    let tools = ToolRunner::new();
    tools
        .register(
            "r1",
            ToolEntry::Plain(Box::new(Delayed { label: "r1", delay_ms: 30 })),
            ToolAttributes::new(ToolSourceKind::Local),
        )
        .unwrap();
    tools
        .register(
            "r2",
            ToolEntry::Plain(Box::new(Delayed { label: "r2", delay_ms: 5 })),
            ToolAttributes::new(ToolSourceKind::Local),
        )
        .unwrap();
    tools
        .register(
            "r3",
            ToolEntry::Plain(Box::new(Delayed { label: "r3", delay_ms: 15 })),
            ToolAttributes::new(ToolSourceKind::Local),
        )
        .unwrap();

    let llm = Arc::new(MockLlm::new(vec![
        ScriptedTurn::text("").with_tool_calls(vec![
            ToolCall::new("c1", "r1", json!({})),
            ToolCall::new("c2", "r2", json!({})),
            ToolCall::new("c3", "r3", json!({})),
        ]),
        ScriptedTurn::text("done"),
    ]));

    let agent = Agent::new(agent_config(), llm, tools);
    let mut thread = user_thread("t2", "run all three");

    let result = agent.run(&mut thread).await.unwrap();

    assert!(result.success);
    let tool_contents: Vec<&str> = thread
        .messages()
        .iter()
        .filter(|m| m.tool_call_id.is_some())
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(tool_contents, vec!["r1-done", "r2-done", "r3-done"]);
}

struct Failing(&'static str);

#[async_trait]
impl PlainTool for Failing {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(self.0, "always fails", json!({}))
    }

    async fn call(&self, _args: Value) -> Result<ToolOutput, String> {
        Err("boom".to_string())
    }
}

#[tokio::test]
async fn one_tool_failure_does_not_block_its_siblings_in_the_same_batch() {
    let tools = ToolRunner::new();
    tools
        .register(
            "r1",
            ToolEntry::Plain(Box::new(Delayed { label: "r1", delay_ms: 1 })),
            ToolAttributes::new(ToolSourceKind::Local),
        )
        .unwrap();
    tools
        .register("r2", ToolEntry::Plain(Box::new(Failing("r2"))), ToolAttributes::new(ToolSourceKind::Local))
        .unwrap();
    tools
        .register(
            "r3",
            ToolEntry::Plain(Box::new(Delayed { label: "r3", delay_ms: 1 })),
            ToolAttributes::new(ToolSourceKind::Local),
        )
        .unwrap();

    let llm = Arc::new(MockLlm::new(vec![
        ScriptedTurn::text("").with_tool_calls(vec![
            ToolCall::new("c1", "r1", json!({})),
            ToolCall::new("c2", "r2", json!({})),
            ToolCall::new("c3", "r3", json!({})),
        ]),
        ScriptedTurn::text("handled the failure"),
    ]));

    let agent = Agent::new(agent_config(), llm, tools);
    let mut thread = user_thread("t3", "run all three, one will fail");

    let result = agent.run(&mut thread).await.unwrap();

    assert!(result.success);
    assert_eq!(result.output, "handled the failure");
    let r1_msg = thread.messages().iter().find(|m| m.tool_call_id.as_deref() == Some("c1")).unwrap();
    let r2_msg = thread.messages().iter().find(|m| m.tool_call_id.as_deref() == Some("c2")).unwrap();
    let r3_msg = thread.messages().iter().find(|m| m.tool_call_id.as_deref() == Some("c3")).unwrap();
    assert_eq!(r1_msg.content, "r1-done");
    assert!(r2_msg.content.contains("boom"));
    assert_eq!(r3_msg.content, "r3-done");
}

#[derive(Debug, Deserialize, JsonSchema, PartialEq)]
struct TestInvoice {
    id: String,
    total: f64,
}

#[tokio::test]
async fn structured_output_retries_once_then_succeeds() {
    let mut config = agent_config();
    config.retry_config.max_retries = 1;

    let llm = Arc::new(MockLlm::new(vec![
        ScriptedTurn::text("").with_tool_calls(vec![ToolCall::new(
            "c1",
            OUTPUT_TOOL_NAME,
            json!({ "id": "INV-1" }),
        )]),
        ScriptedTurn::text("").with_tool_calls(vec![ToolCall::new(
            "c2",
            OUTPUT_TOOL_NAME,
            json!({ "id": "INV-1", "total": 42.5 }),
        )]),
    ]));

    let agent = Agent::new(config, llm, ToolRunner::new());
    let mut thread = user_thread("t4", "produce an invoice");

    let result = agent.run_structured::<TestInvoice>(&mut thread, &RunOptions::default()).await.unwrap();

    assert!(result.success);
    assert_eq!(result.validation_retries, 1);
    assert_eq!(result.retry_history.len(), 1);
    let data = result.structured_data.expect("structured data recorded");
    let invoice: TestInvoice = serde_json::from_value(data).unwrap();
    assert_eq!(invoice, TestInvoice { id: "INV-1".into(), total: 42.5 });
    assert!(!tools_contains_output_tool(&agent));
}

fn tools_contains_output_tool(agent: &Agent) -> bool {
    agent.tools.contains(OUTPUT_TOOL_NAME)
}

struct Loop;

#[async_trait]
impl PlainTool for Loop {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new("loop_tool", "keeps going", json!({}))
    }

    async fn call(&self, _args: Value) -> Result<ToolOutput, String> {
        Ok(ToolOutput::text("again"))
    }
}

#[tokio::test]
async fn iteration_cap_halts_a_tool_call_that_never_stops() {
    let tools = ToolRunner::new();
    tools
        .register("loop_tool", ToolEntry::Plain(Box::new(Loop)), ToolAttributes::new(ToolSourceKind::Local))
        .unwrap();

    let mut config = agent_config();
    config.max_tool_iterations = 2;

    // MockLlm repeats the final scripted turn forever, so the assistant keeps
    // calling loop_tool and the loop only stops via the iteration cap.
    let llm = Arc::new(MockLlm::new(vec![ScriptedTurn::text("").with_tool_calls(vec![ToolCall::new(
        "c1",
        "loop_tool",
        json!({}),
    )])]));

    let agent = Agent::new(config, llm, tools);
    let mut thread = user_thread("t5", "never stop calling the tool");

    let result = agent.run(&mut thread).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.iterations, 2);
    assert!(result.output.to_lowercase().contains("iteration"));
}

#[tokio::test]
async fn vercel_stream_mode_frames_a_plain_text_response() {
    let llm = Arc::new(MockLlm::single(ScriptedTurn::text("Hello!")));
    let agent = Agent::new(agent_config(), llm, ToolRunner::new());
    let mut thread = user_thread("t6", "say hello");

    let (tx, mut rx) = mpsc::channel(64);
    let result = agent
        .stream(&mut thread, StreamMode::Vercel, &RunOptions::default(), tx)
        .await
        .unwrap();
    assert!(result.success);

    let mut frames = Vec::new();
    while let Some(item) = rx.recv().await {
        match item {
            StreamItem::Sse(frame) => frames.push(frame),
            StreamItem::Event(_) => panic!("Vercel mode should only yield Sse items"),
        }
    }
    let joined = frames.concat();

    assert!(joined.contains("\"type\":\"message-start\""));
    assert!(joined.contains("\"type\":\"step-start\""));
    assert!(joined.contains("\"type\":\"text-start\""));
    assert!(joined.contains("\"type\":\"text-delta\""));
    assert!(joined.contains("Hello!"));
    assert!(joined.contains("\"type\":\"text-end\""));
    assert!(joined.contains("\"type\":\"step-finish\""));
    assert!(joined.contains("\"type\":\"finish\""));
    assert!(joined.contains("\"reason\":\"stop\""));
    assert_eq!(frames.last().unwrap(), "data: [DONE]\n\n");
}

#[tokio::test]
async fn vercel_stream_mode_frames_a_tool_call_before_the_final_answer() {
    let llm = Arc::new(MockLlm::new(vec![
        ScriptedTurn::text("").with_tool_calls(vec![ToolCall::new("c1", "calculate", json!({ "expression": "5+3" }))]),
        ScriptedTurn::text("The result is 8."),
    ]));
    let tools = ToolRunner::new();
    tools
        .register(
            "calculate",
            ToolEntry::Plain(Box::new(Calculate)),
            ToolAttributes::new(ToolSourceKind::Local),
        )
        .unwrap();
    let agent = Agent::new(agent_config(), llm, tools);
    let mut thread = user_thread("t7", "what is 5+3?");

    let (tx, mut rx) = mpsc::channel(64);
    let result = agent
        .stream(&mut thread, StreamMode::Vercel, &RunOptions::default(), tx)
        .await
        .unwrap();
    assert!(result.success);

    let mut frames = Vec::new();
    while let Some(item) = rx.recv().await {
        match item {
            StreamItem::Sse(frame) => frames.push(frame),
            StreamItem::Event(_) => panic!("Vercel mode should only yield Sse items"),
        }
    }
    let joined = frames.concat();

    let input_start = joined.find("\"type\":\"tool-input-start\"").unwrap();
    let input_available = joined.find("\"type\":\"tool-input-available\"").unwrap();
    assert!(input_start < input_available);
    assert!(joined.contains("\"toolName\":\"calculate\""));
    assert!(joined.contains("\"type\":\"tool-output-available\""));
    assert!(joined.contains("\"reason\":\"stop\""));
}
