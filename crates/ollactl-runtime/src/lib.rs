//! Process runtime for the operator console.
//!
//! This crate owns every OS-level concern of the console core: spawning and
//! supervising the inference server, the durable handle record, liveness
//! probes, and the single background maintenance task with its output
//! capture.

#[cfg(test)]
use tokio_test as _;

pub mod health;
pub mod process;
pub mod store;
pub mod supervisor;
pub mod task;

pub use health::LivenessProbe;
pub use process::{OsProcess, sweep_by_name};
pub use store::RecordStore;
pub use supervisor::{StartOutcome, StopOutcome, Supervisor, SupervisorConfig};
pub use task::{TaskCommand, TaskPoll, TaskRunner};
