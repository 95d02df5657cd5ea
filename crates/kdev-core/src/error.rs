use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KdevError {
    #[error("profile not found for service: {0}")]
    ProfileNotFound(String),

    #[error("profile for '{0}' is locked by another kdev process")]
    ProfileLocked(String),

    #[error("invalid service name '{0}': must be a lowercase DNS-1123 label")]
    InvalidServiceName(String),

    #[error("invalid port mapping '{0}': expected <local>:<remote>")]
    InvalidPortMapping(String),

    #[error("invalid port-forward record '{0}': expected <local>:<remote>-<pid>")]
    InvalidPortForwardRecord(String),

    #[error("invalid pid file {path}: {reason}")]
    InvalidPidFile { path: PathBuf, reason: String },

    #[error("no port-forward pid found")]
    NoPortForwardPid,

    #[error("\"{0}\" is not in developing status")]
    NotDeveloping(String),

    #[error("failed to terminate {label} process (pid {pid}): {source}")]
    Terminate {
        pid: u32,
        label: String,
        #[source]
        source: TerminateError,
    },

    #[error("failed to check a nil deployment")]
    NilDeployment,

    #[error("replica failure: {reason}: {message}")]
    ReplicaFailure { reason: String, message: String },

    #[error("timed out after {elapsed_secs}s waiting for '{deployment}' to reach {phase}")]
    RolloutTimeout {
        deployment: String,
        phase: String,
        elapsed_secs: u64,
    },

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, KdevError>;

/// Failure reported by the Kubernetes API collaborator.
#[derive(Debug, Clone, Error)]
pub enum ClusterError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("kubernetes API error: {0}")]
    Api(String),
}

impl ClusterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound(_))
    }
}

/// Failure reported by the process terminator.
#[derive(Debug, Clone, Error)]
pub enum TerminateError {
    #[error("no such process")]
    NoSuchProcess,

    #[error("access is denied")]
    AccessDenied,

    #[error("{0}")]
    Other(String),
}
