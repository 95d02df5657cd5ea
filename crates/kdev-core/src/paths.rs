use crate::error::{KdevError, Result};
use crate::types::ProcessKind;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const KDEV_DIR: &str = ".kdev";
pub const PROFILES_DIR: &str = ".kdev/profiles";
pub const PIDS_DIR: &str = ".kdev/pids";
pub const LOCKS_DIR: &str = ".kdev/locks";
pub const SYNC_DIR: &str = ".kdev/sync";

pub const CONFIG_FILE: &str = ".kdev/config.yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn profiles_dir(root: &Path) -> PathBuf {
    root.join(PROFILES_DIR)
}

pub fn profile_path(root: &Path, service: &str) -> PathBuf {
    profiles_dir(root).join(format!("{service}.yaml"))
}

pub fn lock_path(root: &Path, service: &str) -> PathBuf {
    root.join(LOCKS_DIR).join(format!("{service}.lock"))
}

pub fn service_pid_dir(root: &Path, service: &str) -> PathBuf {
    root.join(PIDS_DIR).join(service)
}

pub fn pid_file_path(root: &Path, service: &str, kind: ProcessKind) -> PathBuf {
    service_pid_dir(root, service).join(format!("{}.pid", kind.file_stem()))
}

/// Working directory handed to the sync daemon (its home, logs and certs).
pub fn sync_home_dir(root: &Path, service: &str) -> PathBuf {
    root.join(SYNC_DIR).join(service)
}

// ---------------------------------------------------------------------------
// Service name validation
// ---------------------------------------------------------------------------

static SERVICE_RE: OnceLock<Regex> = OnceLock::new();

fn service_re() -> &'static Regex {
    SERVICE_RE.get_or_init(|| Regex::new(r"^[a-z0-9]([a-z0-9\-]*[a-z0-9])?$").unwrap())
}

/// Service names double as file names and Kubernetes object names, so they
/// must be DNS-1123 labels.
pub fn validate_service_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 63 || !service_re().is_match(name) {
        return Err(KdevError::InvalidServiceName(name.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
