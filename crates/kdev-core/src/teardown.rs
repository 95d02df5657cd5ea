//! Ending a dev session: stop the helpers, release ports, remove the sync
//! secret, roll the workload back and mark the service not developing.
//!
//! `dev end` and `dev reset` share one routine and differ only in their
//! [`TeardownPolicy`].

use crate::cluster::ClusterClient;
use crate::error::{KdevError, Result};
use crate::port_forward;
use crate::process::Terminator;
use crate::profile::{ProfileGuard, ProfileStore};
use crate::rollout::{RollbackOutcome, RolloutWaiter, WaitPolicy};
use crate::supervisor::{StopOutcome, SyncSession};
use crate::types::{DevModeStatus, PortMapping, ProcessKind, SyncMode};
use serde::Serialize;
use tracing::{debug, error, info, warn};

// ---------------------------------------------------------------------------
// TeardownPolicy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeardownPolicy {
    /// Refuse to run unless the service is `developing` or an earlier end was
    /// interrupted while `ending`.
    pub require_developing: bool,
    /// Mark the service `ending` up front and propagate rollback and
    /// status-write failures.
    pub strict: bool,
    /// Block until the rolled-back workload has settled.
    pub wait_for_rollout: bool,
}

impl TeardownPolicy {
    /// `dev end`: the service must be developing and the rollback must land.
    pub const STRICT: TeardownPolicy = TeardownPolicy {
        require_developing: true,
        strict: true,
        wait_for_rollout: true,
    };

    /// `dev reset`: recover from any state, never fail.
    pub const LENIENT: TeardownPolicy = TeardownPolicy {
        require_developing: false,
        strict: false,
        wait_for_rollout: false,
    };
}

// ---------------------------------------------------------------------------
// TeardownReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    pub service: String,
    pub sync_port_forward: Option<StopOutcome>,
    pub sync_daemon: Option<StopOutcome>,
    pub dev_ports_ended: Vec<PortMapping>,
    pub secret_deleted: Option<String>,
    pub rolled_back: bool,
    pub status: DevModeStatus,
    pub warnings: Vec<String>,
}

impl TeardownReport {
    fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
            sync_port_forward: None,
            sync_daemon: None,
            dev_ports_ended: Vec::new(),
            secret_deleted: None,
            rolled_back: false,
            status: DevModeStatus::Developing,
            warnings: Vec::new(),
        }
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

// ---------------------------------------------------------------------------
// DevSession
// ---------------------------------------------------------------------------

/// Teardown orchestrator over a profile store, a cluster and the local OS.
pub struct DevSession<'a, C: ClusterClient, T: Terminator> {
    store: &'a ProfileStore,
    cluster: &'a C,
    terminator: &'a T,
    wait_policy: WaitPolicy,
}

impl<'a, C: ClusterClient, T: Terminator> DevSession<'a, C, T> {
    pub fn new(store: &'a ProfileStore, cluster: &'a C, terminator: &'a T) -> Self {
        Self {
            store,
            cluster,
            terminator,
            wait_policy: WaitPolicy::default(),
        }
    }

    pub fn with_wait_policy(mut self, policy: WaitPolicy) -> Self {
        self.wait_policy = policy;
        self
    }

    /// Strict teardown of a developing service.
    pub async fn end_develop_mode(&self, service: &str) -> Result<TeardownReport> {
        self.teardown(service, TeardownPolicy::STRICT).await
    }

    /// Best-effort teardown from any state. Failures end up in the report.
    pub async fn reset(&self, service: &str) -> TeardownReport {
        match self.teardown(service, TeardownPolicy::LENIENT).await {
            Ok(report) => report,
            Err(e) => {
                warn!(service, error = %e, "reset could not complete");
                let mut report = TeardownReport::new(service);
                report.warn(e.to_string());
                report
            }
        }
    }

    pub async fn teardown(&self, service: &str, policy: TeardownPolicy) -> Result<TeardownReport> {
        let mut guard = self.store.lock(service)?;
        if policy.require_developing && !guard.profile().can_end() {
            return Err(KdevError::NotDeveloping(service.to_string()));
        }

        if policy.strict {
            guard.profile_mut().set_status(DevModeStatus::Ending);
            guard.save()?;
        }

        let mut report = TeardownReport::new(service);
        report.status = guard.profile().status;

        info!(service, "Terminating file sync process...");
        self.stop_sync_processes(&guard, &mut report);
        self.stop_dev_ports(&mut guard, &mut report);
        self.delete_sync_secret(&mut guard, &mut report).await;
        guard.profile_mut().clear_sync_state();
        if let Err(e) = guard.save() {
            if policy.strict {
                self.restore_developing(&mut guard);
                return Err(e);
            }
            warn!(service, error = %e, "failed to save profile after stopping processes");
            report.warn(format!("failed to save profile: {e}"));
        }

        let workload = guard.profile().workload_name().to_string();
        let waiter = RolloutWaiter::new(self.cluster, self.wait_policy.clone());
        match waiter.rollback(&workload, policy.wait_for_rollout).await {
            Ok(RollbackOutcome::RolledBack(_)) => report.rolled_back = true,
            Ok(RollbackOutcome::NothingToRestore) => {}
            Err(e) if policy.strict => {
                error!(service, workload = %workload, error = %e, "failed to roll back workload");
                self.restore_developing(&mut guard);
                return Err(e);
            }
            Err(e) => {
                warn!(service, workload = %workload, error = %e, "failed to roll back workload, ignored");
                report.warn(format!("rollback of {workload} failed: {e}"));
            }
        }

        guard.profile_mut().mark_dev_ended();
        match guard.save() {
            Ok(()) => report.status = DevModeStatus::NotDeveloping,
            Err(e) if policy.strict => return Err(e),
            Err(e) => {
                warn!(service, error = %e, "failed to mark service not developing");
                report.warn(format!("failed to update status: {e}"));
            }
        }

        info!(service, "dev mode ended");
        Ok(report)
    }

    /// Kill the sync tunnel and the sync daemon through their PID files.
    fn stop_sync_processes(&self, guard: &ProfileGuard, report: &mut TeardownReport) {
        let profile = guard.profile();
        let local_dir = profile
            .local_sync_dirs
            .first()
            .cloned()
            .unwrap_or_else(|| self.store.root().to_path_buf());
        let session = match SyncSession::new(
            self.store.root(),
            guard.service(),
            local_dir,
            SyncMode::default(),
            self.terminator,
        ) {
            Ok(session) => session,
            Err(e) => {
                warn!(service = guard.service(), error = %e, "failed to prepare file sync session");
                report.warn(e.to_string());
                return;
            }
        };

        for kind in [ProcessKind::PortForward, ProcessKind::SyncDaemon] {
            let outcome = stop_one(&session, kind, report);
            match kind {
                ProcessKind::PortForward => report.sync_port_forward = outcome,
                ProcessKind::SyncDaemon => report.sync_daemon = outcome,
            }
        }
    }

    /// End every dev port-forward. Ports ended alongside a tunnel-mate are
    /// skipped.
    fn stop_dev_ports(&self, guard: &mut ProfileGuard, report: &mut TeardownReport) {
        let ports = guard.profile().dev_port_list.clone();
        for port in ports {
            if !guard.profile().dev_port_list.contains(&port) {
                continue;
            }
            match port_forward::stop_by_port(guard, port, self.terminator) {
                Ok(stopped) => {
                    info!(service = guard.service(), %port, "dev port-forward has been ended");
                    report.dev_ports_ended.extend(stopped.removed_ports);
                }
                Err(e) => {
                    warn!(service = guard.service(), %port, error = %e, "failed to end dev port-forward");
                    report.warn(format!("failed to end port-forward {port}: {e}"));
                }
            }
        }
    }

    async fn delete_sync_secret(&self, guard: &mut ProfileGuard, report: &mut TeardownReport) {
        let secret = guard.profile().syncthing_secret.clone();
        if secret.is_empty() {
            return;
        }
        debug!(service = guard.service(), secret = %secret, "deleting file sync secret");
        match self.cluster.delete_secret(&secret).await {
            Ok(()) => report.secret_deleted = Some(secret),
            Err(e) if e.is_not_found() => {
                debug!(secret = %secret, "file sync secret already gone");
            }
            Err(e) => {
                warn!(service = guard.service(), secret = %secret, error = %e, "failed to clean up file sync secret");
                report.warn(format!("failed to delete secret {secret}: {e}"));
                return;
            }
        }
        guard.profile_mut().syncthing_secret.clear();
    }

    fn restore_developing(&self, guard: &mut ProfileGuard) {
        guard.profile_mut().set_status(DevModeStatus::Developing);
        if let Err(e) = guard.save() {
            warn!(service = guard.service(), error = %e, "failed to restore developing status");
        }
    }
}

fn stop_one<T: Terminator>(
    session: &SyncSession<'_, T>,
    kind: ProcessKind,
    report: &mut TeardownReport,
) -> Option<StopOutcome> {
    let supervisor = session.supervisor();
    let process = match supervisor.read_pid(kind) {
        Ok(Some(process)) => process,
        Ok(None) => {
            debug!(service = session.service(), %kind, "no background process recorded");
            return Some(StopOutcome::NoPid);
        }
        Err(e) => {
            warn!(service = session.service(), %kind, error = %e, "failed to read background pid file, ignored");
            report.warn(e.to_string());
            return None;
        }
    };

    match session.stop(process.pid, &process.pid_file, kind.label(), true) {
        Ok(StopOutcome::Advisory { pid, hint }) => {
            warn!(
                service = session.service(),
                pid,
                "{kind} may not have been terminated, check with `{hint}`"
            );
            report.warn(format!("{kind} (pid {pid}) may still be running, check with `{hint}`"));
            Some(StopOutcome::Advisory { pid, hint })
        }
        Ok(outcome) => {
            info!(service = session.service(), pid = process.pid, "{kind} process terminated");
            Some(outcome)
        }
        Err(e) => {
            warn!(
                service = session.service(),
                pid = process.pid,
                error = %e,
                "failed to terminate {kind}, please run `kill -9 {}` manually",
                process.pid
            );
            report.warn(e.to_string());
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
