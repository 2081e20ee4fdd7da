//! Inference server lifecycle supervisor.
//!
//! The supervisor owns start/stop/status/kill-all for the single managed
//! server instance. It holds no in-process state: process identity lives in
//! the durable handle record, so every operation works the same after a
//! console restart.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, warn};

use ollactl_core::domain::{ServerHandle, ServerStatus};
use ollactl_core::paths;
use ollactl_core::ports::ProcessError;

use crate::health::LivenessProbe;
use crate::process::{OsProcess, sweep_by_name};
use crate::store::RecordStore;

/// Default loopback address of an Ollama server.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11434";

/// How the supervisor launches and reaches the inference server.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Server executable, e.g. `ollama`.
    pub command: String,
    /// Arguments for the serve invocation.
    pub args: Vec<String>,
    /// Base URL the liveness probe targets.
    pub base_url: String,
    /// Durable handle record location.
    pub handle_path: PathBuf,
    /// Capture file for server stdout/stderr.
    pub log_path: PathBuf,
    /// Boot-readiness probe budget.
    pub boot_budget: Duration,
    /// Graceful-exit wait before SIGKILL on stop.
    pub stop_grace: Duration,
}

impl SupervisorConfig {
    /// Standard configuration for a local Ollama server with records in the
    /// default data directory.
    pub fn ollama() -> Result<Self, paths::PathError> {
        Ok(Self {
            command: "ollama".to_string(),
            args: vec!["serve".to_string()],
            base_url: DEFAULT_BASE_URL.to_string(),
            handle_path: paths::server_handle_path()?,
            log_path: paths::server_log_path()?,
            boot_budget: Duration::from_secs(15),
            stop_grace: Duration::from_secs(15),
        })
    }
}

/// Result of a start request.
#[derive(Debug, Clone)]
pub enum StartOutcome {
    /// A live process was already bound; no second spawn happened.
    AlreadyRunning(ServerHandle),
    /// A process was spawned; `responsive` reports whether it answered the
    /// probe within the boot budget.
    Started {
        handle: ServerHandle,
        responsive: bool,
    },
}

/// Result of a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// No live process was recorded; the handle was purged if stale.
    AlreadyStopped,
    /// The recorded process was terminated.
    Stopped,
}

/// Lifecycle supervisor for the managed inference server.
pub struct Supervisor {
    config: SupervisorConfig,
    store: RecordStore<ServerHandle>,
    probe: LivenessProbe,
}

impl Supervisor {
    /// Create a supervisor from explicit configuration.
    #[must_use]
    pub fn new(config: SupervisorConfig) -> Self {
        let store = RecordStore::new(&config.handle_path);
        let probe = LivenessProbe::new(&config.base_url);
        Self {
            config,
            store,
            probe,
        }
    }

    /// Supervisor for a local Ollama server in the default data directory.
    pub fn open_default() -> Result<Self, paths::PathError> {
        Ok(Self::new(SupervisorConfig::ollama()?))
    }

    /// The probe bound to this server, for version/model queries.
    #[must_use]
    pub const fn probe(&self) -> &LivenessProbe {
        &self.probe
    }

    /// Start the server if it is not already running.
    ///
    /// Idempotent: a live recorded process short-circuits without a second
    /// spawn. After spawning, the liveness probe is polled for the boot
    /// budget; a timeout there is reported, not fatal - readiness shows up
    /// in later `status()` calls. Near-simultaneous starts resolve by
    /// last-successful-write-wins on the handle record.
    pub async fn start(&self) -> Result<StartOutcome, ProcessError> {
        if let Some(handle) = self.store.load() {
            if let Some(pid) = handle.pid
                && OsProcess::new(pid).is_alive()
            {
                info!(pid, "Server already running, skipping spawn");
                return Ok(StartOutcome::AlreadyRunning(handle));
            }
            debug!("Purging stale server handle before start");
            self.store.purge()?;
        }

        let log = std::fs::File::create(&self.config.log_path)?;
        let log_err = log.try_clone()?;
        let mut child = Command::new(&self.config.command)
            .args(&self.config.args)
            .stdin(Stdio::null())
            .stdout(log)
            .stderr(log_err)
            .spawn()
            .map_err(|e| ProcessError::SpawnFailed {
                command: self.config.command.clone(),
                reason: e.to_string(),
            })?;
        let pid = child.id().ok_or_else(|| ProcessError::NoPid {
            command: self.config.command.clone(),
        })?;

        // Detach: identity lives in the durable record, the child handle is
        // only kept around to reap the exit status.
        tokio::spawn(async move {
            let _ = child.wait().await;
        });

        let mut handle = ServerHandle::new(pid);
        self.store.save(&handle)?;
        info!(pid, command = %self.config.command, "Inference server launched");

        let responsive = self
            .probe
            .wait_until_responsive(self.config.boot_budget)
            .await;
        if responsive {
            handle.mark_responsive();
            self.store.save(&handle)?;
        } else {
            warn!(pid, "Server process is up but not yet responsive");
        }

        Ok(StartOutcome::Started { handle, responsive })
    }

    /// Stop the recorded server process.
    ///
    /// SIGTERM, wait up to the stop grace, escalate to SIGKILL. The handle
    /// is cleared unconditionally, even when the kill fails.
    pub async fn stop(&self) -> Result<StopOutcome, ProcessError> {
        let Some(handle) = self.store.load() else {
            return Ok(StopOutcome::AlreadyStopped);
        };
        let Some(pid) = handle.pid else {
            self.store.purge()?;
            return Ok(StopOutcome::AlreadyStopped);
        };

        let proc = OsProcess::new(pid);
        if !proc.is_alive() {
            debug!(pid, "Recorded server process already gone");
            self.store.purge()?;
            return Ok(StopOutcome::AlreadyStopped);
        }

        info!(pid, "Stopping inference server");
        let result = proc.terminate_with_escalation(self.config.stop_grace).await;
        self.store.purge()?;
        result.map_err(|e| ProcessError::StopFailed {
            pid,
            reason: e.to_string(),
        })?;
        Ok(StopOutcome::Stopped)
    }

    /// Report OS-level liveness plus probe responsiveness.
    ///
    /// A handle whose pid is no longer alive is stale: it is purged here and
    /// reported as stopped, never surfaced as an error.
    pub async fn status(&self) -> Result<ServerStatus, ProcessError> {
        let Some(mut handle) = self.store.load() else {
            return Ok(ServerStatus::stopped());
        };

        let alive = handle.pid.is_some_and(|pid| OsProcess::new(pid).is_alive());
        if !alive {
            debug!("Purging stale server handle");
            self.store.purge()?;
            return Ok(ServerStatus::stopped());
        }

        let responsive = self.probe.check().await;
        if responsive {
            handle.mark_responsive();
            if let Err(e) = self.store.save(&handle) {
                debug!(error = %e, "Failed to refresh handle after probe");
            }
        }

        Ok(ServerStatus {
            running: true,
            responsive,
            pid: handle.pid,
        })
    }

    /// System-wide sweep: kill every process matching the server executable
    /// name, tracked or not, then purge the handle. Idempotent.
    pub fn kill_all(&self) -> Result<usize, ProcessError> {
        let name = Path::new(&self.config.command)
            .file_name()
            .map_or_else(|| self.config.command.clone(), |n| n.to_string_lossy().into_owned());
        let killed = sweep_by_name(&name);
        self.store.purge()?;
        info!(killed, name = %name, "Swept server processes by executable name");
        Ok(killed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_config(dir: &Path) -> SupervisorConfig {
        SupervisorConfig {
            command: "sleep".to_string(),
            args: vec!["30".to_string()],
            // Nothing listens here, so probes always fail fast.
            base_url: "http://127.0.0.1:1".to_string(),
            handle_path: dir.join("server.json"),
            log_path: dir.join("server.log"),
            boot_budget: Duration::from_millis(10),
            stop_grace: Duration::from_secs(2),
        }
    }

    #[tokio::test]
    async fn status_purges_dead_pid_and_reports_stopped() {
        let dir = tempdir().expect("tempdir failed");
        let supervisor = Supervisor::new(test_config(dir.path()));

        // Plant a handle whose pid cannot be alive.
        supervisor
            .store
            .save(&ServerHandle::new(999_999))
            .expect("save failed");

        let status = supervisor.status().await.expect("status failed");
        assert!(!status.running);
        assert!(!status.responsive);
        assert!(supervisor.store.load().is_none(), "stale handle not purged");
    }

    #[tokio::test]
    async fn stop_with_dead_pid_reports_already_stopped() {
        let dir = tempdir().expect("tempdir failed");
        let supervisor = Supervisor::new(test_config(dir.path()));
        supervisor
            .store
            .save(&ServerHandle::new(999_999))
            .expect("save failed");

        let outcome = supervisor.stop().await.expect("stop failed");
        assert_eq!(outcome, StopOutcome::AlreadyStopped);
        assert!(supervisor.store.load().is_none());
    }

    #[tokio::test]
    async fn spawn_failure_is_fatal_and_verbatim() {
        let dir = tempdir().expect("tempdir failed");
        let mut config = test_config(dir.path());
        config.command = "ollactl-test-no-such-binary".to_string();
        let supervisor = Supervisor::new(config);

        let err = supervisor.start().await.unwrap_err();
        assert!(matches!(err, ProcessError::SpawnFailed { .. }));
        assert!(supervisor.store.load().is_none(), "no handle on spawn failure");
    }
}
