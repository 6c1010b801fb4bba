use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::content::Content;

/// One unit of agent output, relayed to the caller in emission order.
///
/// Every variant serializes with a `type` tag. `Error` additionally carries an `error`
/// key, which is what runtime callers look for to detect failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        id: String,
        content: Vec<Content>,
        is_error: bool,
    },
    Final {
        text: String,
    },
    Error {
        error: String,
    },
}

impl StreamEvent {
    pub fn text<S: Into<String>>(text: S) -> Self {
        StreamEvent::Text { text: text.into() }
    }

    pub fn error<S: Into<String>>(error: S) -> Self {
        StreamEvent::Error {
            error: error.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, StreamEvent::Error { .. })
    }
}
