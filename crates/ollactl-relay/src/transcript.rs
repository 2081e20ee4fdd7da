//! At-most-once persistence policy for the relayed assistant message.
//!
//! The relay never writes chat state itself; the caller feeds forwarded
//! events into a `Transcript` and decides persistence from the terminal
//! outcome. Truncated output must never be silently stored as a complete
//! answer, so only clean completion and explicit stop produce a message.

use ollactl_core::domain::{Message, StreamEvent};

use crate::relay::RelayPhase;

/// Marker appended when the operator stops a stream mid-answer.
pub const STOP_MARKER: &str = "\n\n[stopped]";

/// How a relay turn ended, from the caller's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Upstream signalled completion; the transcript is a full answer.
    Completed,
    /// The operator explicitly stopped the stream.
    Stopped,
    /// The downstream client went away mid-stream.
    Disconnected,
    /// The relay failed hard before or during streaming.
    Errored,
}

impl RelayOutcome {
    /// Derive the outcome from the relay's terminal phase.
    ///
    /// `explicit_stop` distinguishes an operator stop from a client
    /// disconnect; both abort the relay, only the former persists.
    #[must_use]
    pub const fn from_phase(phase: RelayPhase, explicit_stop: bool) -> Self {
        match phase {
            RelayPhase::Completed => Self::Completed,
            RelayPhase::Aborted => {
                if explicit_stop {
                    Self::Stopped
                } else {
                    Self::Disconnected
                }
            }
            _ => Self::Errored,
        }
    }
}

/// Accumulates forwarded token contents into the candidate assistant
/// message.
#[derive(Debug, Default)]
pub struct Transcript {
    text: String,
}

impl Transcript {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one forwarded event into the candidate message.
    pub fn observe(&mut self, event: &StreamEvent) {
        if let StreamEvent::Token(content) = event {
            self.text.push_str(content);
        }
    }

    /// The candidate message text so far.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Apply the persistence policy.
    ///
    /// Clean completion persists the concatenated tokens; explicit stop
    /// persists them with the stop marker appended; error and disconnect
    /// persist nothing.
    #[must_use]
    pub fn into_message(self, outcome: RelayOutcome) -> Option<Message> {
        match outcome {
            RelayOutcome::Completed => Some(Message::assistant(self.text)),
            RelayOutcome::Stopped => {
                if self.text.is_empty() {
                    None
                } else {
                    Some(Message::assistant(format!("{}{STOP_MARKER}", self.text)))
                }
            }
            RelayOutcome::Disconnected | RelayOutcome::Errored => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcript_of(events: &[StreamEvent]) -> Transcript {
        let mut transcript = Transcript::new();
        for event in events {
            transcript.observe(event);
        }
        transcript
    }

    #[test]
    fn completion_persists_concatenated_tokens() {
        let transcript = transcript_of(&[
            StreamEvent::Token("A".into()),
            StreamEvent::Token("B".into()),
            StreamEvent::Done,
        ]);
        let message = transcript
            .into_message(RelayOutcome::Completed)
            .expect("expected a message");
        assert_eq!(message.content, "AB");
    }

    #[test]
    fn explicit_stop_appends_marker() {
        let transcript = transcript_of(&[StreamEvent::Token("partial".into())]);
        let message = transcript
            .into_message(RelayOutcome::Stopped)
            .expect("expected a message");
        assert_eq!(message.content, format!("partial{STOP_MARKER}"));
    }

    #[test]
    fn error_and_disconnect_persist_nothing() {
        let transcript = transcript_of(&[StreamEvent::Token("trunc".into())]);
        assert!(transcript.into_message(RelayOutcome::Errored).is_none());

        let transcript = transcript_of(&[StreamEvent::Token("trunc".into())]);
        assert!(transcript.into_message(RelayOutcome::Disconnected).is_none());
    }

    #[test]
    fn error_events_do_not_pollute_the_transcript() {
        let transcript = transcript_of(&[
            StreamEvent::Token("ok".into()),
            StreamEvent::Error("one bad line".into()),
            StreamEvent::Token("!".into()),
        ]);
        assert_eq!(transcript.text(), "ok!");
    }
}
