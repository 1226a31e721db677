//! Per-call tool context (§3, §9): name/id of the invoking call, a shallow-copied
//! dependency mapping, and an optional composed progress callback.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

/// A progress callback: `(progress, total, message)`, fire-and-forget.
pub type ProgressCallback = Arc<
    dyn Fn(f64, Option<f64>, Option<String>) -> Pin<Box<dyn Future<Output = ()> + Send>>
        + Send
        + Sync,
>;

/// Context handed to a tool implementation alongside its arguments.
///
/// `deps` is a shallow copy of the caller-supplied dependency mapping taken at
/// dispatch time: cheap to clone per call, and isolates mutations a tool makes
/// to its own view from other concurrent calls in the same batch. It is not a
/// deep copy — values such as a shared database handle are expected to be
/// `Arc`-wrapped by the caller, not duplicated.
#[derive(Clone)]
pub struct ToolContext {
    pub tool_name: String,
    pub tool_call_id: String,
    pub deps: BTreeMap<String, Value>,
    pub progress: Option<ProgressCallback>,
}

impl ToolContext {
    pub fn new(
        tool_name: impl Into<String>,
        tool_call_id: impl Into<String>,
        deps: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            tool_call_id: tool_call_id.into(),
            deps,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Reports progress through the configured callback, if any. Best-effort:
    /// a tool that calls this with no callback configured is a no-op.
    pub async fn report_progress(
        &self,
        progress: f64,
        total: Option<f64>,
        message: Option<String>,
    ) {
        if let Some(cb) = &self.progress {
            (cb)(progress, total, message).await;
        }
    }
}

/// Composes a streaming-mode progress callback with a caller-supplied one so both
/// observe progress from a single tool call. Each side's failure is swallowed
/// independently so one broken observer never blocks the other.
pub fn compose_progress(
    stream_callback: Option<ProgressCallback>,
    user_callback: Option<ProgressCallback>,
) -> Option<ProgressCallback> {
    match (stream_callback, user_callback) {
        (Some(a), Some(b)) => {
            let composite: ProgressCallback = Arc::new(move |progress, total, message| {
                let a = a.clone();
                let b = b.clone();
                let message2 = message.clone();
                Box::pin(async move {
                    (a)(progress, total, message).await;
                    (b)(progress, total, message2).await;
                })
            });
            Some(composite)
        }
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn composed_callback_invokes_both_sides() {
        let a_calls = Arc::new(AtomicUsize::new(0));
        let b_calls = Arc::new(AtomicUsize::new(0));
        let a_calls2 = a_calls.clone();
        let b_calls2 = b_calls.clone();

        let a: ProgressCallback = Arc::new(move |_, _, _| {
            let c = a_calls2.clone();
            Box::pin(async move {
                c.fetch_add(1, Ordering::SeqCst);
            })
        });
        let b: ProgressCallback = Arc::new(move |_, _, _| {
            let c = b_calls2.clone();
            Box::pin(async move {
                c.fetch_add(1, Ordering::SeqCst);
            })
        });

        let composed = compose_progress(Some(a), Some(b)).unwrap();
        (composed)(0.5, Some(1.0), None).await;

        assert_eq!(a_calls.load(Ordering::SeqCst), 1);
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn compose_with_only_one_side_returns_it_unwrapped() {
        assert!(compose_progress(None, None).is_none());
    }

    #[test]
    fn deps_are_isolated_per_clone() {
        let mut deps = BTreeMap::new();
        deps.insert("db".to_string(), Value::String("handle".to_string()));
        let ctx = ToolContext::new("t", "c1", deps);
        let mut ctx2 = ctx.clone();
        ctx2.deps.insert("extra".to_string(), Value::Bool(true));
        assert!(!ctx.deps.contains_key("extra"));
    }
}
