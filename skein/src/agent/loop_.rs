//! The Agent Loop (§4.6): request → parse → dispatch tools (parallel) →
//! append → repeat, with structured-output retry and max-iteration
//! termination.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::AgentError;
use crate::llm::{CompletionRequest, FinishReason, StreamDelta};
use crate::message::{Message, Metrics, RetryRecord, ToolCall};
use crate::stream::vercel::VercelFormatter;
use crate::stream::{events, raw, AgentResult, ExecutionEvent, StreamItem, StreamMode};
use crate::thread::Thread;
use crate::tool::{compose_progress, ProgressCallback, ToolAttributes, ToolEntry, ToolSourceKind};

use super::structured_output::{self, OutputSlot, OutputTool, OUTPUT_TOOL_NAME};
use super::Agent;

/// Per-call caller-supplied inputs that aren't part of the agent's static
/// configuration: dependency injection for tools, and an optional caller
/// progress callback composed with the streaming mode's own.
#[derive(Default, Clone)]
pub struct RunOptions {
    pub deps: BTreeMap<String, Value>,
    pub progress: Option<ProgressCallback>,
}

struct StructuredRequest {
    slot: OutputSlot,
    validate: Box<dyn Fn(&Value) -> Result<(), Vec<String>> + Send + Sync>,
}

impl Agent {
    pub async fn run(&self, thread: &mut Thread) -> Result<AgentResult, AgentError> {
        self.run_with(thread, &RunOptions::default()).await
    }

    pub async fn run_with(
        &self,
        thread: &mut Thread,
        options: &RunOptions,
    ) -> Result<AgentResult, AgentError> {
        execute(self, thread, options, None, StreamMode::None, None).await
    }

    /// Runs the loop with structured output: registers the synthetic output
    /// tool for `T` for the duration of this call, validating its captured
    /// arguments before terminating successfully.
    pub async fn run_structured<T>(
        &self,
        thread: &mut Thread,
        options: &RunOptions,
    ) -> Result<AgentResult, AgentError>
    where
        T: schemars::JsonSchema + serde::de::DeserializeOwned + Send + Sync + 'static,
    {
        let slot = OutputSlot::new();
        let _handle = self.tools.register_scoped(
            OUTPUT_TOOL_NAME,
            ToolEntry::Plain(Box::new(OutputTool::new::<T>(slot.clone()))),
            ToolAttributes::new(ToolSourceKind::StructuredOutput),
        )?;
        let structured = StructuredRequest {
            slot,
            validate: Box::new(|v: &Value| structured_output::validate::<T>(v).map(|_| ())),
        };
        execute(self, thread, options, Some(&structured), StreamMode::None, None).await
    }

    pub async fn stream(
        &self,
        thread: &mut Thread,
        mode: StreamMode,
        options: &RunOptions,
        tx: mpsc::Sender<StreamItem>,
    ) -> Result<AgentResult, AgentError> {
        execute(self, thread, options, None, mode, Some(tx)).await
    }
}

async fn emit_event(
    tx: Option<&mpsc::Sender<StreamItem>>,
    mode: StreamMode,
    formatter: &mut Option<VercelFormatter>,
    event: ExecutionEvent,
) {
    let Some(tx) = tx else { return };
    match mode {
        StreamMode::Events => {
            let _ = tx.send(StreamItem::Event(event)).await;
        }
        StreamMode::Vercel => {
            if let Some(formatter) = formatter {
                for frame in formatter.format(&event) {
                    let _ = tx.send(StreamItem::Sse(frame)).await;
                }
            }
        }
        StreamMode::None | StreamMode::Raw => {}
    }
}

struct ToolOutcome {
    message: Message,
    events: Vec<ExecutionEvent>,
    interrupt: bool,
}

#[allow(clippy::too_many_arguments)]
async fn run_one_tool(
    agent: &Agent,
    call: ToolCall,
    iteration: u32,
    thread_id: String,
    deps: BTreeMap<String, Value>,
    user_progress: Option<ProgressCallback>,
    want_progress_events: bool,
) -> ToolOutcome {
    let mut event_log = vec![events::tool_selected(&thread_id, iteration, &call.name, &call.id)];

    let progress_buffer: Arc<Mutex<Vec<ExecutionEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let stream_progress: Option<ProgressCallback> = if want_progress_events {
        let buffer = progress_buffer.clone();
        let thread_id_for_cb = thread_id.clone();
        let call_id = call.id.clone();
        let cb: ProgressCallback = Arc::new(move |progress: f64, total: Option<f64>, message: Option<String>| {
            let buffer = buffer.clone();
            let thread_id_for_cb = thread_id_for_cb.clone();
            let call_id = call_id.clone();
            Box::pin(async move {
                buffer
                    .lock()
                    .expect("progress event buffer poisoned")
                    .push(events::tool_progress(&thread_id_for_cb, iteration, &call_id, progress, total, message));
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        Some(cb)
    } else {
        None
    };

    let progress = compose_progress(stream_progress, user_progress);

    let started = Utc::now();
    let result = agent
        .tools
        .execute(&call.name, &call.id, call.arguments(), deps, progress)
        .await;
    let metrics = Metrics::timed_from(started);

    event_log.append(&mut progress_buffer.lock().expect("progress event buffer poisoned"));

    let (message, interrupt) = match result {
        Ok(output) => {
            event_log.push(events::tool_result(&thread_id, iteration, &call.id, &output.content));
            let interrupt = agent
                .tools
                .attributes(&call.name)
                .map(|a| a.interrupt)
                .unwrap_or(false);
            (
                agent
                    .factory
                    .tool(&call.name, &call.id, output.content, output.attachments, metrics),
                interrupt,
            )
        }
        Err(err) => {
            event_log.push(events::tool_error(&thread_id, iteration, &call.id, &err.to_string()));
            (
                agent
                    .factory
                    .tool(&call.name, &call.id, err.to_string(), Vec::new(), metrics),
                false,
            )
        }
    };

    ToolOutcome {
        message,
        events: event_log,
        interrupt,
    }
}

async fn execute(
    agent: &Agent,
    thread: &mut Thread,
    options: &RunOptions,
    structured: Option<&StructuredRequest>,
    mode: StreamMode,
    tx: Option<mpsc::Sender<StreamItem>>,
) -> Result<AgentResult, AgentError> {
    let started_at = Utc::now();
    let mut new_messages: Vec<Message> = Vec::new();
    let mut completed_iterations: u32 = 0;
    let mut total_tokens: u32 = 0;
    let mut structured_data: Option<Value> = None;
    let mut validation_retries: u32 = 0;
    let mut retry_history: Vec<RetryRecord> = Vec::new();
    let mut success = false;
    let mut final_reason = FinishReason::Stop;

    let mut formatter = if mode == StreamMode::Vercel {
        Some(VercelFormatter::new(uuid::Uuid::new_v4().to_string()))
    } else {
        None
    };

    if thread.is_empty() {
        let prompt = agent.system_prompt();
        if !prompt.is_empty() {
            thread.add_message(agent.factory.system(prompt));
        }
    }

    let finish = |thread: &Thread,
                  new_messages: Vec<Message>,
                  success: bool,
                  iterations: u32,
                  total_tokens: u32,
                  structured_data: Option<Value>,
                  validation_retries: u32,
                  retry_history: Vec<RetryRecord>| AgentResult {
        thread: thread.clone(),
        output: thread.messages().last().map(|m| m.content.clone()).unwrap_or_default(),
        new_messages,
        success,
        iterations,
        duration_ms: (Utc::now() - started_at).num_milliseconds(),
        total_tokens,
        structured_data,
        validation_retries,
        retry_history,
    };

    if thread.is_terminal() {
        return Ok(finish(thread, new_messages, true, 0, 0, None, 0, Vec::new()));
    }

    loop {
        if completed_iterations >= agent.config.max_tool_iterations {
            let msg = agent.factory.max_iterations(agent.config.max_tool_iterations);
            thread.add_message(msg.clone());
            new_messages.push(msg);
            emit_event(
                tx.as_ref(),
                mode,
                &mut formatter,
                events::iteration_limit(&thread.id, completed_iterations, agent.config.max_tool_iterations),
            )
            .await;
            final_reason = FinishReason::Length;
            break;
        }

        emit_event(tx.as_ref(), mode, &mut formatter, events::iteration_start(&thread.id, completed_iterations)).await;
        emit_event(
            tx.as_ref(),
            mode,
            &mut formatter,
            events::llm_request(&thread.id, completed_iterations, &agent.config.model_name),
        )
        .await;

        let mut tool_list = agent.tools.list();
        tool_list.sort_by(|a, b| a.spec.name.cmp(&b.spec.name));
        let tool_specs = tool_list.into_iter().map(|t| t.spec).collect();

        let request = CompletionRequest::new(agent.config.model_name.clone(), thread.messages().to_vec())
            .with_tools(tool_specs)
            .with_params(agent.config.completion_params());

        let request_started = Utc::now();

        let response = match mode {
            StreamMode::None => agent.llm.complete(&request).await,
            StreamMode::Events | StreamMode::Raw | StreamMode::Vercel => {
                let (delta_tx, mut delta_rx) = mpsc::channel::<StreamDelta>(64);
                let llm = agent.llm.clone();
                let req = request.clone();
                let handle = tokio::spawn(async move { llm.stream(&req, delta_tx).await });

                while let Some(delta) = delta_rx.recv().await {
                    if mode == StreamMode::Raw {
                        if let (Some(ref raw_chunk), Some(ref tx)) = (&delta.raw, &tx) {
                            let _ = tx.send(StreamItem::Sse(raw::frame_chunk(raw_chunk))).await;
                        }
                        continue;
                    }
                    for event in events::delta_to_events(&delta, &thread.id, completed_iterations) {
                        emit_event(tx.as_ref(), mode, &mut formatter, event).await;
                    }
                }

                match handle.await {
                    Ok(result) => result,
                    Err(join_err) => Err(AgentError::fatal(join_err.to_string())),
                }
            }
        };

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                let msg = agent.factory.error(e.to_string(), true);
                thread.add_message(msg.clone());
                new_messages.push(msg);
                emit_event(
                    tx.as_ref(),
                    mode,
                    &mut formatter,
                    events::execution_error(&thread.id, completed_iterations, &e.to_string()),
                )
                .await;
                return Ok(finish(
                    thread,
                    new_messages,
                    false,
                    completed_iterations,
                    total_tokens,
                    structured_data,
                    validation_retries,
                    retry_history,
                ));
            }
        };

        completed_iterations += 1;
        let iteration_index = completed_iterations - 1;
        if let Some(ref usage) = response.usage {
            total_tokens += usage.total_tokens;
        }
        emit_event(tx.as_ref(), mode, &mut formatter, events::llm_response(&thread.id, iteration_index, &response)).await;

        let assistant_metrics = Metrics::timed_from(request_started);
        let mut assistant_msg = agent
            .factory
            .assistant(response.content.clone(), response.tool_calls.clone(), assistant_metrics);
        if let Some(ref reasoning) = response.reasoning {
            assistant_msg = assistant_msg.with_reasoning(reasoning.clone());
        }
        thread.add_message(assistant_msg.clone());
        new_messages.push(assistant_msg.clone());
        emit_event(
            tx.as_ref(),
            mode,
            &mut formatter,
            events::message_created(&thread.id, iteration_index, &assistant_msg.id, "assistant"),
        )
        .await;

        if assistant_msg.tool_calls.is_empty() {
            success = true;
            final_reason = response.finish_reason.unwrap_or(FinishReason::Stop);
            break;
        }

        let want_progress = matches!(mode, StreamMode::Events | StreamMode::Vercel);
        let futures = assistant_msg.tool_calls.iter().cloned().map(|call| {
            run_one_tool(
                agent,
                call,
                iteration_index,
                thread.id.clone(),
                options.deps.clone(),
                options.progress.clone(),
                want_progress,
            )
        });
        let outcomes = futures::future::join_all(futures).await;

        let mut interrupted = false;
        for outcome in outcomes {
            for event in outcome.events {
                emit_event(tx.as_ref(), mode, &mut formatter, event).await;
            }
            thread.add_message(outcome.message.clone());
            new_messages.push(outcome.message.clone());
            emit_event(
                tx.as_ref(),
                mode,
                &mut formatter,
                events::message_created(&thread.id, iteration_index, &outcome.message.id, "tool"),
            )
            .await;

            if outcome.interrupt {
                interrupted = true;
            }

            if let Some(req) = structured {
                if outcome.message.name.as_deref() == Some(OUTPUT_TOOL_NAME) {
                    if let Some(value) = req.slot.take() {
                        match (req.validate)(&value) {
                            Ok(()) => {
                                structured_data = Some(value);
                                success = true;
                            }
                            Err(errors) => {
                                validation_retries += 1;
                                retry_history.push(RetryRecord {
                                    attempt: validation_retries,
                                    errors: errors.clone(),
                                });
                                if validation_retries > agent.config.retry_config.max_retries {
                                    return Err(AgentError::StructuredOutputExhausted {
                                        retries: validation_retries - 1,
                                        errors,
                                        last_response: response.content.clone(),
                                    });
                                }
                                let backoff =
                                    agent.config.retry_config.backoff_base_seconds * validation_retries as f64;
                                if backoff > 0.0 {
                                    tokio::time::sleep(std::time::Duration::from_secs_f64(backoff)).await;
                                }
                                let notice = agent.factory.error(
                                    format!(
                                        "Structured output validation failed: {}. Call {OUTPUT_TOOL_NAME} again with corrected data.",
                                        errors.join(", ")
                                    ),
                                    false,
                                );
                                thread.add_message(notice.clone());
                                new_messages.push(notice);
                            }
                        }
                    }
                }
            }
        }

        if success || interrupted {
            final_reason = if interrupted { FinishReason::ToolCalls } else { FinishReason::Stop };
            break;
        }
    }

    let duration_ms = (Utc::now() - started_at).num_milliseconds();
    emit_event(
        tx.as_ref(),
        mode,
        &mut formatter,
        events::execution_complete(&thread.id, completed_iterations, duration_ms, final_reason),
    )
    .await;
    if mode == StreamMode::Raw {
        if let Some(ref tx) = tx {
            let _ = tx.send(StreamItem::Sse(raw::terminal_frame().to_string())).await;
        }
    }

    Ok(finish(
        thread,
        new_messages,
        success,
        completed_iterations,
        total_tokens,
        structured_data,
        validation_retries,
        retry_history,
    ))
}
