//! Port definitions shared across the console crates.
//!
//! Ports express **intent**, not implementation detail: the relay crate
//! gates on server readiness through `ServerHealth` without knowing how the
//! probe works, and the runtime crate provides the real implementation.

use async_trait::async_trait;
use thiserror::Error;

/// Errors from process lifecycle operations.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The OS refused process creation. Fatal, surfaced verbatim, not
    /// retried.
    #[error("Failed to spawn {command}: {reason}")]
    SpawnFailed { command: String, reason: String },

    /// A spawned process yielded no usable identifier.
    #[error("Spawned {command} but obtained no process id")]
    NoPid { command: String },

    /// The process survived forced termination.
    #[error("Failed to stop process {pid}: {reason}")]
    StopFailed { pid: u32, reason: String },

    /// Durable record or capture log I/O failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Data directory resolution failed.
    #[error(transparent)]
    Path(#[from] crate::paths::PathError),
}

/// Readiness gate for the inference server.
///
/// Probe failures are transient and reflected only in status; callers
/// decide whether to gate task or chat submission on the result.
#[async_trait]
pub trait ServerHealth: Send + Sync {
    /// Whether the server currently accepts requests.
    async fn is_responsive(&self) -> bool;
}
