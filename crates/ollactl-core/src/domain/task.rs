//! Background maintenance task types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Durable record of the single background maintenance task.
///
/// At most one record is running at any time; starting a new task retires
/// the old one first. Output is captured append-only to a sibling log file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// OS process id of the spawned command.
    pub pid: u32,
    /// Human-readable label, e.g. `pull llama3`.
    pub label: String,
    /// Whether the process is believed to be running.
    pub running: bool,
    /// When the task was started.
    pub started_at: DateTime<Utc>,
    /// Exit outcome once observed, `None` while running or unknown.
    pub exit_ok: Option<bool>,
}

impl TaskRecord {
    /// Record for a freshly spawned task process.
    pub fn new(pid: u32, label: impl Into<String>) -> Self {
        Self {
            pid,
            label: label.into(),
            running: true,
            started_at: Utc::now(),
            exit_ok: None,
        }
    }
}

/// One event on the task output push stream.
///
/// One `Line` per captured output line; `Done` is terminal and emitted
/// exactly once, after which the sender closes the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    /// One line of captured process output.
    Line(String),
    /// A runner-level error, e.g. the capture log became unreadable.
    Error(String),
    /// Terminal event; `success` is present when the exit was observed.
    Done { success: Option<bool> },
}

impl TaskEvent {
    /// Wire representation for the downstream push connection.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Line(line) => json!({ "log": line }),
            Self::Error(message) => json!({ "error": message }),
            Self::Done { success } => match success {
                Some(ok) => json!({ "done": true, "success": ok }),
                None => json!({ "done": true }),
            },
        }
    }

    /// Encode as a single push frame: `data: <json>\n\n`.
    #[must_use]
    pub fn to_frame(&self) -> String {
        format!("data: {}\n\n", self.to_json())
    }
}
