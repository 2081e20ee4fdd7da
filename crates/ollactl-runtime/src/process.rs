//! Typed handle over a raw OS process id.
//!
//! Everything above this module talks about processes through `OsProcess`
//! and never touches signal primitives directly. Known gap: a pid can be
//! reused after exit, so a stale id could alias an unrelated live process;
//! the kill-by-name sweep mitigates for the server binary.

use std::io;
use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

/// Poll interval while waiting for a signalled process to exit.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A process identified only by its pid, with no `Child` handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OsProcess {
    pid: u32,
}

impl OsProcess {
    #[must_use]
    pub const fn new(pid: u32) -> Self {
        Self { pid }
    }

    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Check existence with the null signal.
    ///
    /// A permission error means the process exists but belongs to someone
    /// else; that still counts as alive.
    #[cfg(unix)]
    #[must_use]
    pub fn is_alive(&self) -> bool {
        match signal::kill(Pid::from_raw(self.pid as i32), None) {
            Ok(()) => true,
            Err(Errno::ESRCH) => false,
            Err(_) => true,
        }
    }

    #[cfg(not(unix))]
    #[must_use]
    pub fn is_alive(&self) -> bool {
        false // Not implemented on non-Unix
    }

    /// Request graceful termination (SIGTERM). Already-gone is not an error.
    #[cfg(unix)]
    pub fn terminate(&self) -> io::Result<()> {
        match signal::kill(Pid::from_raw(self.pid as i32), Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(io::Error::other(e)),
        }
    }

    #[cfg(not(unix))]
    pub fn terminate(&self) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "signal-based termination not implemented on this platform",
        ))
    }

    /// Kill immediately (SIGKILL). Already-gone is not an error.
    #[cfg(unix)]
    pub fn force_kill(&self) -> io::Result<()> {
        match signal::kill(Pid::from_raw(self.pid as i32), Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(io::Error::other(e)),
        }
    }

    #[cfg(not(unix))]
    pub fn force_kill(&self) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "signal-based termination not implemented on this platform",
        ))
    }

    /// Poll until the process exits or the budget elapses.
    ///
    /// Returns `true` once the process is gone. Cannot reap - the caller
    /// never held a `Child` handle for these processes.
    pub async fn wait_exit(&self, budget: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + budget;
        while tokio::time::Instant::now() < deadline {
            if !self.is_alive() {
                return true;
            }
            sleep(EXIT_POLL_INTERVAL).await;
        }
        !self.is_alive()
    }

    /// SIGTERM with a grace period, escalating to SIGKILL.
    ///
    /// Returns `Ok` once the process is gone, `Err` if it survived SIGKILL.
    pub async fn terminate_with_escalation(&self, grace: Duration) -> io::Result<()> {
        self.terminate()?;
        if self.wait_exit(grace).await {
            return Ok(());
        }

        debug!(pid = %self.pid, "Process survived SIGTERM, escalating to SIGKILL");
        self.force_kill()?;
        if self.wait_exit(Duration::from_secs(2)).await {
            return Ok(());
        }

        Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("process {} did not exit after SIGKILL", self.pid),
        ))
    }
}

/// Kill every process whose executable name matches `name`, regardless of
/// any tracked pid. Returns how many processes were signalled.
///
/// This is the system-wide sweep behind "stop everything": it catches
/// orphans from previous crashes and servers started outside the console.
#[must_use]
pub fn sweep_by_name(name: &str) -> usize {
    let sys = sysinfo::System::new_all();
    let own_pid = std::process::id();
    let mut killed = 0;

    for (pid, process) in sys.processes() {
        if pid.as_u32() == own_pid {
            continue;
        }
        if process.name().to_string_lossy() == name {
            debug!(pid = %pid, %name, "Sweeping process by executable name");
            if process.kill() {
                killed += 1;
            }
        }
    }

    killed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(unix)]
    fn is_alive_for_self() {
        assert!(OsProcess::new(std::process::id()).is_alive());
    }

    #[test]
    #[cfg(unix)]
    fn is_alive_false_for_impossible_pid() {
        assert!(!OsProcess::new(999_999).is_alive());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn escalation_stops_a_sleeping_process() {
        let mut child = tokio::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .expect("failed to spawn sleep");
        let pid = child.id().expect("no pid");
        // Reap in the background so the pid does not linger as a zombie.
        tokio::spawn(async move {
            let _ = child.wait().await;
        });

        let proc = OsProcess::new(pid);
        proc.terminate_with_escalation(Duration::from_secs(2))
            .await
            .expect("escalation failed");
        assert!(!proc.is_alive());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn terminate_tolerates_already_exited() {
        let proc = OsProcess::new(999_999);
        proc.terminate().expect("terminate of gone pid failed");
        proc.force_kill().expect("kill of gone pid failed");
        assert!(proc.wait_exit(Duration::from_millis(100)).await);
    }
}
