//! The chat relay state machine.
//!
//! `Idle → AwaitingUpstream → Relaying → {Completed | Aborted | Errored}`.
//!
//! The relay is pull-based: it hands the caller a lazy, in-order,
//! finite-until-closed stream of parsed events, so cancellation is "stop
//! pulling" plus a token that synchronously releases the upstream
//! connection. Exactly one relay runs per turn.

use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use bytes::Bytes;
use futures_util::{Stream, StreamExt, pin_mut};
use reqwest::Client;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use ollactl_core::domain::StreamEvent;
use ollactl_core::ports::ServerHealth;

use crate::models::{ChatChunk, ChatRequest};
use crate::ndjson::LineDecoder;

/// Connect timeout for the upstream call. The call itself has no overall
/// timeout - a completion stream is open-ended by design.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Relay lifecycle phase, observable by the caller through a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayPhase {
    Idle,
    AwaitingUpstream,
    Relaying,
    Completed,
    Aborted,
    Errored,
}

/// Errors raised while constructing a relay.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Relay for streaming chat completions from one upstream server.
pub struct ChatRelay {
    base_url: String,
    client: Client,
    health: Arc<dyn ServerHealth>,
}

impl ChatRelay {
    /// Create a relay for the server at `base_url`, gating each turn on the
    /// given readiness port.
    pub fn new(
        base_url: impl Into<String>,
        health: Arc<dyn ServerHealth>,
    ) -> Result<Self, RelayError> {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        let client = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
        Ok(Self {
            base_url,
            client,
            health,
        })
    }

    /// Run one relay turn.
    ///
    /// Returns the lazy event stream plus a phase receiver for the terminal
    /// outcome. The stream always ends with exactly one `Done` except when
    /// aborted through `cancel`, in which case it simply ends and the
    /// upstream connection is released immediately.
    pub fn stream(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> (
        impl Stream<Item = StreamEvent> + Send + 'static,
        watch::Receiver<RelayPhase>,
    ) {
        let (phase_tx, phase_rx) = watch::channel(RelayPhase::Idle);
        let client = self.client.clone();
        let health = Arc::clone(&self.health);
        let url = format!("{}/api/chat", self.base_url);

        let events = stream! {
            let _ = phase_tx.send(RelayPhase::AwaitingUpstream);
            if !health.is_responsive().await {
                let _ = phase_tx.send(RelayPhase::Errored);
                warn!("Rejecting chat relay: inference server is not responsive");
                yield StreamEvent::Error(
                    "inference server is not responsive".to_string(),
                );
                yield StreamEvent::Done;
                return;
            }

            let response = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    let _ = phase_tx.send(RelayPhase::Aborted);
                    return;
                }
                r = client.post(&url).json(&request).send() => r,
            };
            let response = match response {
                Ok(r) if r.status().is_success() => r,
                Ok(r) => {
                    let _ = phase_tx.send(RelayPhase::Errored);
                    yield StreamEvent::Error(format!(
                        "upstream returned status {}",
                        r.status()
                    ));
                    yield StreamEvent::Done;
                    return;
                }
                Err(e) => {
                    let _ = phase_tx.send(RelayPhase::Errored);
                    yield StreamEvent::Error(format!("upstream request failed: {e}"));
                    yield StreamEvent::Done;
                    return;
                }
            };

            let inner = relay_upstream(response.bytes_stream(), cancel, phase_tx.clone());
            pin_mut!(inner);
            while let Some(event) = inner.next().await {
                yield event;
            }
        };

        (events, phase_rx)
    }
}

/// Relay a stream of upstream byte chunks as parsed events.
///
/// Generic over the byte source so the forwarding logic is testable without
/// a live server. Dropping the returned stream drops `upstream`, which is
/// what releases the HTTP connection.
fn relay_upstream<S, E>(
    upstream: S,
    cancel: CancellationToken,
    phase: watch::Sender<RelayPhase>,
) -> impl Stream<Item = StreamEvent> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send,
    E: std::fmt::Display + Send,
{
    stream! {
        let _ = phase.send(RelayPhase::Relaying);
        let mut decoder = LineDecoder::new();
        pin_mut!(upstream);

        loop {
            // Forward every complete line before reading more - arrival
            // order, no batching.
            while let Some(line) = decoder.next_line() {
                let (events, completed) = line_events(&line);
                if completed {
                    let _ = phase.send(RelayPhase::Completed);
                }
                for event in events {
                    yield event;
                }
                if completed {
                    return;
                }
            }

            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    let _ = phase.send(RelayPhase::Aborted);
                    debug!("Chat relay aborted, releasing upstream connection");
                    return;
                }
                item = upstream.next() => item,
            };

            match next {
                Some(Ok(chunk)) => decoder.feed(&chunk),
                Some(Err(e)) => {
                    let _ = phase.send(RelayPhase::Errored);
                    warn!(error = %e, "Upstream stream error");
                    yield StreamEvent::Error(format!("upstream stream error: {e}"));
                    yield StreamEvent::Done;
                    return;
                }
                None => {
                    // Upstream closed without a done flag - drain any
                    // trailing partial line, then still exactly one Done.
                    let mut completed = false;
                    if let Some(rest) = decoder.take_remainder() {
                        let (events, c) = line_events(&rest);
                        completed = c;
                        if completed {
                            let _ = phase.send(RelayPhase::Completed);
                        }
                        for event in events {
                            yield event;
                        }
                    }
                    if !completed {
                        let _ = phase.send(RelayPhase::Completed);
                        yield StreamEvent::Done;
                    }
                    return;
                }
            }
        }
    }
}

/// Parse one line into forwarded events.
///
/// A malformed line becomes a single downstream error event and does not
/// abort the relay. Returns whether the line carried the completion flag.
fn line_events(line: &str) -> (Vec<StreamEvent>, bool) {
    match serde_json::from_str::<ChatChunk>(line) {
        Ok(chunk) => {
            let mut events = Vec::new();
            if let Some(error) = chunk.error {
                events.push(StreamEvent::Error(error));
            }
            if let Some(message) = chunk.message
                && !message.content.is_empty()
            {
                events.push(StreamEvent::Token(message.content));
            }
            if chunk.done {
                events.push(StreamEvent::Done);
            }
            (events, chunk.done)
        }
        Err(_) => (
            vec![StreamEvent::Error(format!(
                "invalid data from upstream: {line}"
            ))],
            false,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::{RelayOutcome, Transcript};
    use futures_util::stream;
    use std::io;

    fn chunks(parts: &[&str]) -> Vec<Result<Bytes, io::Error>> {
        parts
            .iter()
            .map(|p| Ok(Bytes::copy_from_slice(p.as_bytes())))
            .collect()
    }

    async fn collect(
        upstream: Vec<Result<Bytes, io::Error>>,
    ) -> (Vec<StreamEvent>, RelayPhase) {
        let (phase_tx, phase_rx) = watch::channel(RelayPhase::Idle);
        let events = relay_upstream(stream::iter(upstream), CancellationToken::new(), phase_tx);
        pin_mut!(events);
        let mut collected = Vec::new();
        while let Some(event) = events.next().await {
            collected.push(event);
        }
        let phase = *phase_rx.borrow();
        (collected, phase)
    }

    #[tokio::test]
    async fn tokens_forward_in_arrival_order() {
        let upstream = chunks(&[
            "{\"message\":{\"role\":\"assistant\",\"content\":\"A\"},\"done\":false}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"B\"},\"done\":false}\n",
            "{\"done\":true}\n",
        ]);
        let (events, phase) = collect(upstream).await;

        assert_eq!(
            events,
            vec![
                StreamEvent::Token("A".into()),
                StreamEvent::Token("B".into()),
                StreamEvent::Done,
            ]
        );
        assert_eq!(phase, RelayPhase::Completed);

        let mut transcript = Transcript::new();
        for event in &events {
            transcript.observe(event);
        }
        let message = transcript
            .into_message(RelayOutcome::from_phase(phase, false))
            .expect("expected persisted message");
        assert_eq!(message.content, "AB");
    }

    #[tokio::test]
    async fn object_split_across_chunks_yields_one_event() {
        let upstream = chunks(&[
            "{\"message\":{\"conten",
            "t\":\"hi\"},\"done\":false}\n",
            "{\"done\":true}\n",
        ]);
        let (events, _) = collect(upstream).await;
        assert_eq!(
            events,
            vec![StreamEvent::Token("hi".into()), StreamEvent::Done]
        );
    }

    #[tokio::test]
    async fn many_tokens_none_skipped_or_duplicated() {
        let parts: Vec<String> = (0..50)
            .map(|i| format!("{{\"message\":{{\"content\":\"t{i}\"}},\"done\":false}}\n"))
            .collect();
        let mut upstream: Vec<Result<Bytes, io::Error>> = parts
            .iter()
            .map(|p| Ok(Bytes::copy_from_slice(p.as_bytes())))
            .collect();
        upstream.push(Ok(Bytes::from_static(b"{\"done\":true}\n")));

        let (events, _) = collect(upstream).await;
        let tokens: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Token(t) => Some(t.clone()),
                _ => None,
            })
            .collect();
        let expected: Vec<String> = (0..50).map(|i| format!("t{i}")).collect();
        assert_eq!(tokens, expected);
        assert_eq!(events.last(), Some(&StreamEvent::Done));
    }

    #[tokio::test]
    async fn malformed_line_is_forwarded_not_fatal() {
        let upstream = chunks(&[
            "this is not json\n",
            "{\"message\":{\"content\":\"ok\"},\"done\":false}\n",
            "{\"done\":true}\n",
        ]);
        let (events, phase) = collect(upstream).await;

        assert!(matches!(events[0], StreamEvent::Error(_)));
        assert_eq!(events[1], StreamEvent::Token("ok".into()));
        assert_eq!(events[2], StreamEvent::Done);
        assert_eq!(phase, RelayPhase::Completed);
    }

    #[tokio::test]
    async fn upstream_close_without_done_flag_still_completes() {
        let upstream = chunks(&["{\"message\":{\"content\":\"tail\"},\"done\":false}\n"]);
        let (events, phase) = collect(upstream).await;
        assert_eq!(
            events,
            vec![StreamEvent::Token("tail".into()), StreamEvent::Done]
        );
        assert_eq!(phase, RelayPhase::Completed);
    }

    #[tokio::test]
    async fn transport_error_emits_error_then_done() {
        let upstream = vec![
            Ok(Bytes::from_static(
                b"{\"message\":{\"content\":\"x\"},\"done\":false}\n",
            )),
            Err(io::Error::other("connection reset")),
        ];
        let (events, phase) = collect(upstream).await;
        assert_eq!(events.len(), 3);
        assert!(matches!(events[1], StreamEvent::Error(_)));
        assert_eq!(events[2], StreamEvent::Done);
        assert_eq!(phase, RelayPhase::Errored);
    }

    #[tokio::test]
    async fn cancellation_aborts_without_done_and_persists_nothing() {
        let cancel = CancellationToken::new();
        let (phase_tx, phase_rx) = watch::channel(RelayPhase::Idle);

        // One token, then an upstream that never produces more.
        let first = stream::iter(chunks(&[
            "{\"message\":{\"content\":\"partial\"},\"done\":false}\n",
        ]));
        let upstream = first.chain(stream::pending());

        let events = relay_upstream(upstream, cancel.clone(), phase_tx);
        pin_mut!(events);

        let mut transcript = Transcript::new();
        let first_event = events.next().await.expect("expected first token");
        transcript.observe(&first_event);
        assert_eq!(first_event, StreamEvent::Token("partial".into()));

        cancel.cancel();
        assert!(events.next().await.is_none(), "stream ends on abort");

        let phase = *phase_rx.borrow();
        assert_eq!(phase, RelayPhase::Aborted);
        assert!(
            transcript
                .into_message(RelayOutcome::from_phase(phase, false))
                .is_none(),
            "mid-stream disconnect must not persist the assistant message"
        );
    }

    #[tokio::test]
    async fn unresponsive_server_errors_before_relaying() {
        struct NeverHealthy;
        #[async_trait::async_trait]
        impl ServerHealth for NeverHealthy {
            async fn is_responsive(&self) -> bool {
                false
            }
        }

        let relay = ChatRelay::new("http://127.0.0.1:1", Arc::new(NeverHealthy))
            .expect("relay build failed");
        let request = ChatRequest::new("llama3:latest".into(), Vec::new());
        let (events, phase_rx) = relay.stream(request, CancellationToken::new());
        pin_mut!(events);

        let mut collected = Vec::new();
        while let Some(event) = events.next().await {
            collected.push(event);
        }

        assert_eq!(collected.len(), 2);
        assert!(matches!(collected[0], StreamEvent::Error(_)));
        assert_eq!(collected[1], StreamEvent::Done);
        assert_eq!(*phase_rx.borrow(), RelayPhase::Errored);
    }
}
