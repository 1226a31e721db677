//! A2A wire types (§6): the task-status-update and task-artifact-update
//! events this crate's streaming executor (`executor`) produces.

pub mod executor;

pub use executor::A2aExecutor;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A task's lifecycle state, per the A2A protocol's task states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    Submitted,
    Working,
    InputRequired,
    Completed,
    Canceled,
    Failed,
    Rejected,
    AuthRequired,
    Unknown,
}

/// One piece of an artifact: text, a file (inline bytes or a URI), or a JSON
/// data payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Part {
    Text {
        text: String,
    },
    File {
        #[serde(rename = "mediaType")]
        media_type: String,
        #[serde(rename = "fileWithBytes", skip_serializing_if = "Option::is_none")]
        file_with_bytes: Option<String>,
        #[serde(rename = "fileWithUri", skip_serializing_if = "Option::is_none")]
        file_with_uri: Option<String>,
    },
    Data {
        data: Value,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn file_bytes(media_type: impl Into<String>, base64: impl Into<String>) -> Self {
        Part::File {
            media_type: media_type.into(),
            file_with_bytes: Some(base64.into()),
            file_with_uri: None,
        }
    }

    pub fn file_uri(media_type: impl Into<String>, uri: impl Into<String>) -> Self {
        Part::File {
            media_type: media_type.into(),
            file_with_bytes: None,
            file_with_uri: Some(uri.into()),
        }
    }

    pub fn data(value: Value) -> Self {
        Part::Data { data: value }
    }
}

/// One A2A wire event: a task status transition, or an artifact chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum A2aEvent {
    TaskStatusUpdate {
        #[serde(rename = "taskId")]
        task_id: String,
        state: TaskState,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    TaskArtifactUpdate {
        #[serde(rename = "taskId")]
        task_id: String,
        #[serde(rename = "artifactId")]
        artifact_id: String,
        parts: Vec<Part>,
        append: bool,
        #[serde(rename = "lastChunk")]
        last_chunk: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_status_update_serializes_with_camel_case_task_id() {
        let event = A2aEvent::TaskStatusUpdate {
            task_id: "t1".into(),
            state: TaskState::Working,
            message: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["taskId"], "t1");
        assert_eq!(json["state"], "working");
        assert_eq!(json["type"], "task-status-update");
    }

    #[test]
    fn artifact_update_serializes_with_camel_case_fields() {
        let event = A2aEvent::TaskArtifactUpdate {
            task_id: "t1".into(),
            artifact_id: "a1".into(),
            parts: vec![Part::text("hi")],
            append: true,
            last_chunk: false,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["artifactId"], "a1");
        assert_eq!(json["lastChunk"], false);
        assert_eq!(json["parts"][0]["kind"], "text");
    }
}
