//! Domain types for the operator console core.
//!
//! These types represent the durable records and push-stream events of the
//! system, independent of any infrastructure concerns.

mod chat;
mod server;
mod stream;
mod task;

pub use chat::{ChatMetadata, ChatSession, Message, MessageRole, SessionSummary, SessionUpdate};
pub use server::{ServerHandle, ServerStatus};
pub use stream::StreamEvent;
pub use task::{TaskEvent, TaskRecord};
