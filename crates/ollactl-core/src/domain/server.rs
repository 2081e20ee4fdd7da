//! Inference server handle and status types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durable handle to the managed inference server process.
///
/// Persisted as a small JSON record so process identity survives across
/// stateless invocations. A present `pid` must denote a live OS process;
/// otherwise the handle is stale and gets purged before any "running"
/// report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerHandle {
    /// OS process id of the spawned server, if one was obtained.
    pub pid: Option<u32>,
    /// When the server was started.
    pub started_at: DateTime<Utc>,
    /// Last time a liveness probe succeeded.
    pub last_responsive: Option<DateTime<Utc>>,
}

impl ServerHandle {
    /// Create a handle for a freshly spawned process.
    #[must_use]
    pub fn new(pid: u32) -> Self {
        Self {
            pid: Some(pid),
            started_at: Utc::now(),
            last_responsive: None,
        }
    }

    /// Record a successful liveness probe.
    pub fn mark_responsive(&mut self) {
        self.last_responsive = Some(Utc::now());
    }
}

/// Point-in-time server status as reported to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatus {
    /// Whether the recorded process is alive at the OS level.
    pub running: bool,
    /// Whether the server answered the liveness probe.
    pub responsive: bool,
    /// The recorded process id, when running.
    pub pid: Option<u32>,
}

impl ServerStatus {
    /// Status for a host with no live server process.
    #[must_use]
    pub const fn stopped() -> Self {
        Self {
            running: false,
            responsive: false,
            pid: None,
        }
    }
}
