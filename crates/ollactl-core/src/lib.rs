//! Core domain types and port definitions for ollactl.
//!
//! This crate holds everything the operator console core agrees on without
//! touching OS processes or HTTP: durable record types, the push-stream
//! event unions, path resolution for the data directory, and the chat
//! session store. Process and network concerns live in `ollactl-runtime`
//! and `ollactl-relay`.

pub mod chat_store;
pub mod domain;
pub mod paths;
pub mod ports;

// Re-export commonly used types for convenience
pub use chat_store::{ChatStore, ChatStoreError};
pub use domain::{
    ChatMetadata, ChatSession, Message, MessageRole, ServerHandle, ServerStatus, SessionSummary,
    SessionUpdate, StreamEvent, TaskEvent, TaskRecord,
};
pub use paths::{PathError, data_root};
pub use ports::{ProcessError, ServerHealth};
