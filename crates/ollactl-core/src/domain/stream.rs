//! Chat relay push-stream events.

use serde_json::json;

/// One event on the downstream push connection of a chat relay.
///
/// Events are produced in strict arrival order per session. `Done` is
/// always terminal and emitted exactly once; the sender closes the
/// connection right after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// One forwarded token fragment of the assistant message.
    Token(String),
    /// A relay-level or upstream error, forwarded without aborting.
    Error(String),
    /// Terminal event.
    Done,
}

impl StreamEvent {
    /// Wire representation matching the upstream NDJSON shape, so browser
    /// clients handle relayed and direct responses identically.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Token(content) => json!({
                "message": { "role": "assistant", "content": content },
                "done": false,
            }),
            Self::Error(message) => json!({ "error": message }),
            Self::Done => json!({ "done": true }),
        }
    }

    /// Encode as a single push frame: `data: <json>\n\n`.
    #[must_use]
    pub fn to_frame(&self) -> String {
        format!("data: {}\n\n", self.to_json())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_frame_carries_assistant_message() {
        let frame = StreamEvent::Token("hi".into()).to_frame();
        assert!(frame.starts_with("data: "));
        assert!(frame.ends_with("\n\n"));
        assert!(frame.contains(r#""content":"hi""#));
        assert!(frame.contains(r#""done":false"#));
    }

    #[test]
    fn done_frame_is_terminal_marker() {
        let json = StreamEvent::Done.to_json();
        assert_eq!(json, json!({ "done": true }));
    }
}
