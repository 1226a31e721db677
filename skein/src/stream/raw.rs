//! Raw passthrough stream mode (§4.5, the `OpenAI`/`raw` mode): frames each
//! provider chunk as an OpenAI-compatible SSE event, untouched.

use serde_json::Value;

/// Frames one raw provider chunk as an SSE `data:` line.
pub fn frame_chunk(raw: &Value) -> String {
    format!("data: {}\n\n", raw)
}

/// The terminal frame every OpenAI-compatible SSE stream ends with.
pub fn terminal_frame() -> &'static str {
    "data: [DONE]\n\n"
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn frame_chunk_wraps_json_in_sse_data_line() {
        let raw = json!({ "id": "chatcmpl-1" });
        assert_eq!(frame_chunk(&raw), "data: {\"id\":\"chatcmpl-1\"}\n\n");
    }

    #[test]
    fn terminal_frame_is_done_marker() {
        assert_eq!(terminal_frame(), "data: [DONE]\n\n");
    }
}
