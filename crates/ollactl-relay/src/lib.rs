//! Streaming chat relay.
//!
//! Bridges the inference server's chunked NDJSON completion response to a
//! long-lived downstream push connection: incremental line reassembly,
//! in-order event forwarding, synchronous cancellation, and the
//! at-most-once persistence policy for the assistant transcript.

#[cfg(test)]
use tokio_test as _;

pub mod models;
pub mod ndjson;
pub mod relay;
pub mod transcript;

pub use models::{ChatChunk, ChatRequest};
pub use ndjson::LineDecoder;
pub use relay::{ChatRelay, RelayError, RelayPhase};
pub use transcript::{RelayOutcome, STOP_MARKER, Transcript};
