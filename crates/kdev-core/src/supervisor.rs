use crate::error::{KdevError, Result, TerminateError};
use crate::io::{atomic_write, remove_if_exists};
use crate::paths;
use crate::process::Terminator;
use crate::types::{ProcessKind, SyncMode};
use serde::Serialize;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// BackgroundProcess / StopOutcome
// ---------------------------------------------------------------------------

/// A helper process recorded in a PID file by an earlier invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundProcess {
    pub pid: u32,
    pub pid_file: PathBuf,
    pub kind: ProcessKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StopOutcome {
    /// Nothing recorded: never started, or already cleaned up.
    NoPid,
    Stopped { pid: u32 },
    /// The PID file pointed at a process that had already exited.
    AlreadyExited { pid: u32 },
    /// The OS refused in a way that usually still stops the process
    /// (Windows access-denied). Carries a command the user can run to check.
    Advisory { pid: u32, hint: String },
}

// ---------------------------------------------------------------------------
// ProcessSupervisor
// ---------------------------------------------------------------------------

/// Stops one service's background processes through their PID files.
pub struct ProcessSupervisor<'t, T: Terminator> {
    root: PathBuf,
    service: String,
    terminator: &'t T,
}

impl<'t, T: Terminator> ProcessSupervisor<'t, T> {
    pub fn new(root: impl Into<PathBuf>, service: impl Into<String>, terminator: &'t T) -> Self {
        Self {
            root: root.into(),
            service: service.into(),
            terminator,
        }
    }

    pub fn pid_file(&self, kind: ProcessKind) -> PathBuf {
        paths::pid_file_path(&self.root, &self.service, kind)
    }

    /// Record a freshly started process.
    pub fn record(&self, kind: ProcessKind, pid: u32) -> Result<()> {
        atomic_write(&self.pid_file(kind), pid.to_string().as_bytes())
    }

    /// `Ok(None)` when no PID file exists.
    pub fn read_pid(&self, kind: ProcessKind) -> Result<Option<BackgroundProcess>> {
        let pid_file = self.pid_file(kind);
        let data = match std::fs::read_to_string(&pid_file) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let pid = parse_pid(&data).ok_or_else(|| KdevError::InvalidPidFile {
            path: pid_file.clone(),
            reason: format!("expected a process id, found {:?}", data.trim()),
        })?;
        Ok(Some(BackgroundProcess {
            pid,
            pid_file,
            kind,
        }))
    }

    pub fn stop(&self, process: &BackgroundProcess, force: bool) -> Result<StopOutcome> {
        self.stop_pid(process.pid, &process.pid_file, process.kind.label(), force)
    }

    /// Terminate `pid` and remove `pid_file` once it is gone.
    pub fn stop_pid(&self, pid: u32, pid_file: &Path, label: &str, force: bool) -> Result<StopOutcome> {
        self.stop_pid_on(pid, pid_file, label, force, cfg!(windows))
    }

    fn stop_pid_on(
        &self,
        pid: u32,
        pid_file: &Path,
        label: &str,
        force: bool,
        windows: bool,
    ) -> Result<StopOutcome> {
        match self.terminator.terminate(pid, force, label) {
            Ok(()) => {
                remove_if_exists(pid_file)?;
                Ok(StopOutcome::Stopped { pid })
            }
            Err(TerminateError::NoSuchProcess) => {
                remove_if_exists(pid_file)?;
                Ok(StopOutcome::AlreadyExited { pid })
            }
            Err(TerminateError::AccessDenied) if windows => Ok(StopOutcome::Advisory {
                pid,
                hint: format!("tasklist | findstr {pid}"),
            }),
            Err(source) => Err(KdevError::Terminate {
                pid,
                label: label.to_string(),
                source,
            }),
        }
    }

    /// Read the PID file for `kind` and stop what it names.
    pub fn stop_background(&self, kind: ProcessKind, force: bool) -> Result<StopOutcome> {
        match self.read_pid(kind)? {
            Some(process) => self.stop(&process, force),
            None => Ok(StopOutcome::NoPid),
        }
    }
}

fn parse_pid(data: &str) -> Option<u32> {
    data.trim().parse::<u32>().ok().filter(|pid| *pid > 0)
}

// ---------------------------------------------------------------------------
// SyncSession
// ---------------------------------------------------------------------------

/// Handle on a service's file-sync daemon. Stopping processes only needs its
/// path conventions; constructing one never starts anything.
pub struct SyncSession<'t, T: Terminator> {
    service: String,
    local_sync_dir: PathBuf,
    mode: SyncMode,
    home: PathBuf,
    supervisor: ProcessSupervisor<'t, T>,
}

impl<'t, T: Terminator> SyncSession<'t, T> {
    pub fn new(
        root: &Path,
        service: &str,
        local_sync_dir: impl Into<PathBuf>,
        mode: SyncMode,
        terminator: &'t T,
    ) -> Result<Self> {
        paths::validate_service_name(service)?;
        Ok(Self {
            service: service.to_string(),
            local_sync_dir: local_sync_dir.into(),
            mode,
            home: paths::sync_home_dir(root, service),
            supervisor: ProcessSupervisor::new(root, service, terminator),
        })
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn local_sync_dir(&self) -> &Path {
        &self.local_sync_dir
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    pub fn home_dir(&self) -> &Path {
        &self.home
    }

    pub fn supervisor(&self) -> &ProcessSupervisor<'t, T> {
        &self.supervisor
    }

    pub fn stop(&self, pid: u32, pid_file: &Path, label: &str, force: bool) -> Result<StopOutcome> {
        self.supervisor.stop_pid(pid, pid_file, label, force)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
