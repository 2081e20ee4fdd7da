//! Single background maintenance task runner.
//!
//! One task at a time: starting a new command retires the old one first
//! (best-effort terminate, logged on failure). The spawned process is
//! detached with stdout/stderr redirected to a capture log; consumers either
//! tail that log as a lazy event stream or poll it.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_stream::stream;
use futures_util::Stream;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use ollactl_core::domain::{TaskEvent, TaskRecord};
use ollactl_core::paths;
use ollactl_core::ports::ProcessError;

use crate::process::{OsProcess, sweep_by_name};
use crate::store::RecordStore;

/// Grace period when retiring or cancelling a task process.
const KILL_GRACE: Duration = Duration::from_secs(1);
/// Poll interval while tailing the capture log of a live process.
const TAIL_INTERVAL: Duration = Duration::from_millis(150);

/// A one-shot maintenance command with an operator-facing label.
#[derive(Debug, Clone)]
pub struct TaskCommand {
    pub label: String,
    pub program: String,
    pub args: Vec<String>,
}

impl TaskCommand {
    /// Arbitrary program + args.
    pub fn new(
        label: impl Into<String>,
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            label: label.into(),
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// `ollama pull <model>`
    #[must_use]
    pub fn pull(model: &str) -> Self {
        Self::new(format!("pull {model}"), "ollama", ["pull", model])
    }

    /// `ollama push <destination>`
    #[must_use]
    pub fn push(destination: &str) -> Self {
        Self::new(format!("push {destination}"), "ollama", ["push", destination])
    }

    /// `ollama create <name> -f <modelfile>`
    #[must_use]
    pub fn create(name: &str, modelfile: &Path) -> Self {
        Self::new(
            format!("create {name}"),
            "ollama",
            [
                "create".to_string(),
                name.to_string(),
                "-f".to_string(),
                modelfile.display().to_string(),
            ],
        )
    }
}

/// Snapshot returned by [`TaskRunner::poll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPoll {
    /// Full capture buffer so far.
    pub output: String,
    /// Whether the task process is still running.
    pub running: bool,
}

/// Runner for the single background maintenance task.
pub struct TaskRunner {
    store: RecordStore<TaskRecord>,
    log_path: PathBuf,
}

impl TaskRunner {
    /// Create a runner keeping `task.json` and `task.log` under `dir`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            store: RecordStore::new(dir.join("task.json")),
            log_path: dir.join("task.log"),
        }
    }

    /// Runner over the default data directory.
    pub fn open_default() -> Result<Self, paths::PathError> {
        Ok(Self::new(paths::data_root()?))
    }

    /// The current durable task record, if any.
    #[must_use]
    pub fn record(&self) -> Option<TaskRecord> {
        self.store.load()
    }

    /// Start a new task, superseding any running one.
    ///
    /// The old record is fully retired (terminated and deleted) before the
    /// new process is spawned, so two tasks never write to the capture log
    /// at the same time. Returns immediately once the new record is
    /// persisted; output arrives through [`stream`](Self::stream) or
    /// [`poll`](Self::poll).
    pub async fn run(&self, command: &TaskCommand) -> Result<TaskRecord, ProcessError> {
        self.retire_current().await;

        let log = std::fs::File::create(&self.log_path)?;
        let log_err = log.try_clone()?;
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(log)
            .stderr(log_err)
            .spawn()
            .map_err(|e| ProcessError::SpawnFailed {
                command: command.program.clone(),
                reason: e.to_string(),
            })?;
        let pid = child.id().ok_or_else(|| ProcessError::NoPid {
            command: command.program.clone(),
        })?;

        let record = TaskRecord::new(pid, &command.label);
        self.store.save(&record)?;
        info!(pid, label = %command.label, "Task started");

        // Reap in the background and fold the exit outcome into the record.
        let store = self.store.clone();
        tokio::spawn(async move {
            let status = child.wait().await;
            if let Some(mut rec) = store.load()
                && rec.pid == pid
            {
                rec.running = false;
                rec.exit_ok = status.as_ref().ok().map(ExitStatus::success);
                if let Err(e) = store.save(&rec) {
                    debug!(error = %e, "Failed to record task exit");
                }
            }
        });

        Ok(record)
    }

    /// Lazy event stream over the capture log.
    ///
    /// Yields one `Line` per completed output line as the process emits it.
    /// Once the process has exited the remainder is drained, exactly one
    /// `Done` is yielded, and the stream ends - the consumer closes its push
    /// connection right after.
    pub fn stream(&self) -> impl Stream<Item = TaskEvent> + Send + 'static {
        let store = self.store.clone();
        let log_path = self.log_path.clone();

        stream! {
            let file = match tokio::fs::File::open(&log_path).await {
                Ok(f) => f,
                Err(e) => {
                    yield TaskEvent::Error(format!("cannot open task log: {e}"));
                    yield TaskEvent::Done { success: None };
                    return;
                }
            };
            let mut reader = BufReader::new(file);
            // Carries a partial line across reads so a half-flushed line is
            // never emitted as two events.
            let mut pending: Vec<u8> = Vec::new();

            loop {
                let mut chunk = Vec::new();
                match reader.read_until(b'\n', &mut chunk).await {
                    Ok(0) => {
                        let record = store.load();
                        let alive = record
                            .as_ref()
                            .is_some_and(|r| r.running && OsProcess::new(r.pid).is_alive());
                        if alive {
                            sleep(TAIL_INTERVAL).await;
                            continue;
                        }

                        // Process gone: drain whatever was written between
                        // our last read and its exit.
                        loop {
                            let mut rest = Vec::new();
                            match reader.read_until(b'\n', &mut rest).await {
                                Ok(0) => break,
                                Ok(_) => {
                                    pending.extend_from_slice(&rest);
                                    if pending.last() == Some(&b'\n') {
                                        yield TaskEvent::Line(take_line(&mut pending));
                                    }
                                }
                                Err(e) => {
                                    yield TaskEvent::Error(format!("task log read failed: {e}"));
                                    break;
                                }
                            }
                        }
                        if !pending.is_empty() {
                            yield TaskEvent::Line(take_line(&mut pending));
                        }
                        yield TaskEvent::Done {
                            success: record.and_then(|r| r.exit_ok),
                        };
                        return;
                    }
                    Ok(_) => {
                        pending.extend_from_slice(&chunk);
                        if pending.last() == Some(&b'\n') {
                            yield TaskEvent::Line(take_line(&mut pending));
                        }
                    }
                    Err(e) => {
                        yield TaskEvent::Error(format!("task log read failed: {e}"));
                        yield TaskEvent::Done { success: None };
                        return;
                    }
                }
            }
        }
    }

    /// Current buffer plus liveness, for non-streaming callers.
    ///
    /// The first poll after process exit folds the record to not-running;
    /// repeat polls return the same final output without re-appending.
    pub fn poll(&self) -> Result<TaskPoll, ProcessError> {
        let output = match std::fs::read(&self.log_path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        let Some(mut record) = self.store.load() else {
            return Ok(TaskPoll {
                output,
                running: false,
            });
        };

        if record.running && !OsProcess::new(record.pid).is_alive() {
            record.running = false;
            self.store.save(&record)?;
        }

        Ok(TaskPoll {
            output,
            running: record.running,
        })
    }

    /// Forcefully terminate the recorded task and delete its record.
    ///
    /// With `sweep_name`, additionally broad-kills every process matching
    /// that executable name. Idempotent.
    pub async fn cancel(&self, sweep_name: Option<&str>) -> Result<(), ProcessError> {
        if let Some(record) = self.store.load() {
            let proc = OsProcess::new(record.pid);
            if record.running && proc.is_alive() {
                info!(pid = record.pid, label = %record.label, "Cancelling task");
                if let Err(e) = proc.force_kill() {
                    warn!(pid = record.pid, error = %e, "Failed to kill task process");
                }
                proc.wait_exit(KILL_GRACE).await;
            }
        }
        self.store.purge()?;

        if let Some(name) = sweep_name {
            let killed = sweep_by_name(name);
            info!(killed, name = %name, "Swept task processes by executable name");
        }
        Ok(())
    }

    /// Retire the current record before a new task may exist.
    async fn retire_current(&self) {
        if let Some(record) = self.store.load() {
            let proc = OsProcess::new(record.pid);
            if record.running && proc.is_alive() {
                info!(pid = record.pid, label = %record.label, "Superseding running task");
                if let Err(e) = proc.terminate_with_escalation(KILL_GRACE).await {
                    warn!(pid = record.pid, error = %e, "Failed to retire running task");
                }
            }
            if let Err(e) = self.store.purge() {
                warn!(error = %e, "Failed to delete superseded task record");
            }
        }
    }
}

/// Split off a completed line: lossy UTF-8, trailing `\n`/`\r\n` trimmed.
fn take_line(pending: &mut Vec<u8>) -> String {
    if pending.last() == Some(&b'\n') {
        pending.pop();
        if pending.last() == Some(&b'\r') {
            pending.pop();
        }
    }
    let line = String::from_utf8_lossy(pending).into_owned();
    pending.clear();
    line
}
