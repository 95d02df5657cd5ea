use crate::output::{print_json, print_table};
use clap::Subcommand;
use kdev_core::config::Config;
use kdev_core::port_forward;
use kdev_core::process::SystemTerminator;
use kdev_core::profile::ProfileStore;
use kdev_core::types::PortMapping;
use std::path::Path;

#[derive(Subcommand)]
pub enum PortForwardSubcommand {
    /// Stop a service's port-forwards
    Stop {
        service: String,
        /// Port to stop, as <local>:<remote> or <port>. Ports sharing its
        /// tunnel are stopped too.
        #[arg(long, required_unless_present = "all", conflicts_with = "all")]
        port: Option<PortMapping>,
        /// Stop every recorded tunnel
        #[arg(long)]
        all: bool,
    },
    /// List a service's recorded port-forwards
    List { service: String },
}

pub fn run(root: &Path, subcmd: PortForwardSubcommand, json: bool) -> anyhow::Result<()> {
    let store = ProfileStore::new(root);
    match subcmd {
        PortForwardSubcommand::Stop { service, port, .. } => {
            let config = Config::load(root)?;
            let terminator = SystemTerminator::new(config.terminate_grace());
            let mut guard = store.lock(&service)?;
            match port {
                Some(port) => {
                    let report = port_forward::stop_by_port(&mut guard, port, &terminator)?;
                    if json {
                        return print_json(&report);
                    }
                    match report.pid {
                        Some(pid) if report.terminated => println!("Stopped port-forward pid {pid}"),
                        Some(pid) => println!("Could not stop port-forward pid {pid}"),
                        None => println!("No port-forward pid recorded for {port}"),
                    }
                    for removed in &report.removed_ports {
                        println!("Removed {removed}");
                    }
                }
                None => {
                    let report = port_forward::stop_all(&mut guard, &terminator)?;
                    if json {
                        return print_json(&report);
                    }
                    for pid in &report.terminated {
                        println!("Stopped port-forward pid {pid}");
                    }
                    for pid in &report.failed {
                        println!("Could not stop port-forward pid {pid}");
                    }
                }
            }
            Ok(())
        }
        PortForwardSubcommand::List { service } => {
            let profile = store.load(&service)?;
            if json {
                return print_json(&serde_json::json!({
                    "service": profile.name,
                    "port_forwards": profile.port_forward_pid_list,
                    "dev_ports": profile.dev_port_list,
                    "statuses": profile.port_forward_status_list,
                }));
            }
            if profile.dev_port_list.is_empty() {
                println!("No port-forwards recorded for {service}.");
                return Ok(());
            }
            let rows = profile
                .dev_port_list
                .iter()
                .map(|port| {
                    let pid = profile
                        .pid_for_port(*port)
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "-".into());
                    let status = profile
                        .port_forward_status_list
                        .iter()
                        .find(|s| s.port == *port)
                        .map(|s| s.status.clone())
                        .unwrap_or_else(|| "-".into());
                    vec![port.to_string(), pid, status]
                })
                .collect();
            print_table(&["PORT", "PID", "STATUS"], rows);
            Ok(())
        }
    }
}
