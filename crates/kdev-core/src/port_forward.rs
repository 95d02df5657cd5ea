//! Registry of port-forward tunnels recorded in a service profile.
//!
//! A tunnel process often serves several local ports, so kills are batched by
//! PID: stopping one port stops every port that shares its tunnel.

use crate::error::{KdevError, Result, TerminateError};
use crate::process::Terminator;
use crate::profile::ProfileGuard;
use crate::types::PortMapping;
use serde::Serialize;
use tracing::{debug, warn};

const LABEL: &str = "port-forward";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StopAllReport {
    pub terminated: Vec<u32>,
    pub failed: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StopByPortReport {
    pub port: PortMapping,
    /// Tunnel PID found for the port, if any was recorded.
    pub pid: Option<u32>,
    pub terminated: bool,
    /// Every port dropped from the profile: the requested one plus any that
    /// shared its tunnel.
    pub removed_ports: Vec<PortMapping>,
}

/// Kill every recorded tunnel once and clear all port-forward bookkeeping.
///
/// Returns [`KdevError::NoPortForwardPid`] without writing anything when no
/// tunnel is recorded.
pub fn stop_all<T: Terminator>(guard: &mut ProfileGuard, terminator: &T) -> Result<StopAllReport> {
    let pids = guard.profile().distinct_pids();
    if pids.is_empty() {
        return Err(KdevError::NoPortForwardPid);
    }

    let mut report = StopAllReport::default();
    for pid in pids {
        match terminator.terminate(pid, true, LABEL) {
            Ok(()) | Err(TerminateError::NoSuchProcess) => report.terminated.push(pid),
            Err(e) => {
                warn!(service = guard.service(), pid, error = %e, "failed to terminate port-forward, continuing");
                report.failed.push(pid);
            }
        }
    }

    guard.profile_mut().clear_port_forwards();
    guard.save()?;
    Ok(report)
}

/// Stop the tunnel serving `port` and drop the port (and its tunnel-mates)
/// from the profile.
///
/// When no PID is recorded for `port` the port is still removed from the
/// lists. Termination failures are logged; a failed save is returned.
pub fn stop_by_port<T: Terminator>(
    guard: &mut ProfileGuard,
    port: PortMapping,
    terminator: &T,
) -> Result<StopByPortReport> {
    let pid = guard.profile().pid_for_port(port);

    let mut removed_ports = match pid {
        Some(pid) => guard.profile().ports_for_pid(pid),
        None => Vec::new(),
    };
    if removed_ports.is_empty() {
        debug!(service = guard.service(), %port, "no port-forward pid recorded for port");
        removed_ports.push(port);
    }

    let mut terminated = false;
    if let Some(pid) = pid {
        match terminator.terminate(pid, true, LABEL) {
            Ok(()) | Err(TerminateError::NoSuchProcess) => terminated = true,
            Err(e) => {
                warn!(service = guard.service(), %port, pid, error = %e, "failed to terminate port-forward");
            }
        }
    }

    let profile = guard.profile_mut();
    profile.delete_dev_ports(&removed_ports);
    profile.delete_port_forward_statuses(&removed_ports);
    profile.delete_port_forward_records(&removed_ports);
    guard.save()?;

    Ok(StopByPortReport {
        port,
        pid,
        terminated,
        removed_ports,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
