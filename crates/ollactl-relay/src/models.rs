//! Wire types for the upstream completion endpoint.

use serde::{Deserialize, Serialize};

use ollactl_core::domain::Message;

/// Request body for `POST /api/chat` with `stream: true`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub stream: bool,
    /// Sampling options, passed through opaquely (temperature, top_k, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Value>,
}

impl ChatRequest {
    /// A streaming request for `model` over the given history.
    #[must_use]
    pub const fn new(model: String, messages: Vec<Message>) -> Self {
        Self {
            model,
            messages,
            stream: true,
            options: None,
        }
    }

    /// Attach sampling options.
    #[must_use]
    pub fn with_options(mut self, options: serde_json::Value) -> Self {
        self.options = Some(options);
        self
    }
}

/// One NDJSON object from the upstream stream:
/// `{"message":{"role":"assistant","content":"hi"},"done":false}`.
///
/// The upstream may also carry an in-band `error` field instead of a
/// message.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatChunk {
    #[serde(default)]
    pub message: Option<ChunkMessage>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// The message fragment inside a chunk.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_stream_flag_and_roles() {
        let request = ChatRequest::new(
            "llama3:latest".into(),
            vec![Message::user("hello")],
        );
        let json = serde_json::to_value(&request).expect("serialize failed");
        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][0]["role"], "user");
        assert!(json.get("options").is_none());
    }

    #[test]
    fn chunk_tolerates_missing_fields() {
        let chunk: ChatChunk = serde_json::from_str(r#"{"done":true}"#).expect("parse failed");
        assert!(chunk.done);
        assert!(chunk.message.is_none());
        assert!(chunk.error.is_none());
    }
}
