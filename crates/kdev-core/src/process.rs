//! Process termination, the OS-facing seam of the supervisor and the
//! port-forward registry.

use crate::error::TerminateError;
use std::time::Duration;

/// Terminates OS processes by PID.
pub trait Terminator {
    /// Ask `pid` to exit. With `force`, escalate until it is gone.
    /// `label` names the process in log lines.
    fn terminate(&self, pid: u32, force: bool, label: &str) -> Result<(), TerminateError>;

    fn is_alive(&self, pid: u32) -> bool;
}

// ---------------------------------------------------------------------------
// SystemTerminator
// ---------------------------------------------------------------------------

/// Real terminator: signals on Unix, `taskkill` on Windows.
#[derive(Debug, Clone)]
pub struct SystemTerminator {
    /// Time between the polite request and the forced kill.
    grace: Duration,
}

const LIVENESS_POLL_INTERVAL: Duration = Duration::from_millis(100);

impl SystemTerminator {
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }
}

impl Default for SystemTerminator {
    fn default() -> Self {
        Self::new(Duration::from_secs(3))
    }
}

#[cfg(unix)]
impl Terminator for SystemTerminator {
    fn terminate(&self, pid: u32, force: bool, label: &str) -> Result<(), TerminateError> {
        use nix::errno::Errno;
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        let raw = i32::try_from(pid)
            .ok()
            .filter(|p| *p > 0)
            .ok_or_else(|| TerminateError::Other(format!("invalid pid {pid}")))?;
        let nix_pid = Pid::from_raw(raw);

        tracing::debug!(pid, label, "sending SIGTERM");
        match signal::kill(nix_pid, Signal::SIGTERM) {
            Ok(()) => {}
            Err(Errno::ESRCH) => return Err(TerminateError::NoSuchProcess),
            Err(Errno::EPERM) => return Err(TerminateError::AccessDenied),
            Err(e) => return Err(TerminateError::Other(e.to_string())),
        }

        if !force {
            return Ok(());
        }

        let deadline = std::time::Instant::now() + self.grace;
        while std::time::Instant::now() < deadline {
            if !self.is_alive(pid) {
                return Ok(());
            }
            std::thread::sleep(LIVENESS_POLL_INTERVAL);
        }

        tracing::warn!(pid, label, "process ignored SIGTERM, sending SIGKILL");
        match signal::kill(nix_pid, Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(Errno::EPERM) => Err(TerminateError::AccessDenied),
            Err(e) => Err(TerminateError::Other(e.to_string())),
        }
    }

    fn is_alive(&self, pid: u32) -> bool {
        use nix::errno::Errno;
        use nix::sys::signal;
        use nix::unistd::Pid;

        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        if raw <= 0 {
            return false;
        }
        // Signal 0 only checks existence; EPERM means it exists but is not ours.
        matches!(
            signal::kill(Pid::from_raw(raw), None),
            Ok(()) | Err(Errno::EPERM)
        )
    }
}

#[cfg(windows)]
impl Terminator for SystemTerminator {
    fn terminate(&self, pid: u32, force: bool, label: &str) -> Result<(), TerminateError> {
        let mut cmd = std::process::Command::new("taskkill");
        cmd.args(["/PID", &pid.to_string()]);
        if force {
            cmd.args(["/T", "/F"]);
        }
        tracing::debug!(pid, label, force, "running taskkill");
        let output = cmd
            .output()
            .map_err(|e| TerminateError::Other(e.to_string()))?;
        if output.status.success() {
            return Ok(());
        }
        let text = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        Err(classify_taskkill_output(&text))
    }

    fn is_alive(&self, pid: u32) -> bool {
        std::process::Command::new("tasklist")
            .args(["/FI", &format!("PID eq {pid}"), "/NH"])
            .output()
            .map(|o| String::from_utf8_lossy(&o.stdout).contains(&pid.to_string()))
            .unwrap_or(false)
    }
}

/// Map `taskkill` diagnostics onto [`TerminateError`].
#[cfg_attr(not(windows), allow(dead_code))]
fn classify_taskkill_output(text: &str) -> TerminateError {
    let lower = text.to_ascii_lowercase();
    if lower.contains("access is denied") {
        TerminateError::AccessDenied
    } else if lower.contains("not found") {
        TerminateError::NoSuchProcess
    } else {
        TerminateError::Other(text.trim().to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
