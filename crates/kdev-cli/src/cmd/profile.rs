use crate::output::{print_json, print_table};
use clap::Subcommand;
use kdev_core::profile::ProfileStore;
use std::path::Path;

#[derive(Subcommand)]
pub enum ProfileSubcommand {
    /// Show one service's dev profile
    Show { service: String },
    /// List every service with a dev profile
    List,
}

pub fn run(root: &Path, subcmd: ProfileSubcommand, json: bool) -> anyhow::Result<()> {
    let store = ProfileStore::new(root);
    match subcmd {
        ProfileSubcommand::Show { service } => {
            let profile = store.load(&service)?;
            if json {
                return print_json(&profile);
            }
            println!("Service:   {}", profile.name);
            println!("Workload:  {}", profile.workload_name());
            println!("Status:    {}", profile.status);
            println!("Syncing:   {}", if profile.sync.syncing { "yes" } else { "no" });
            if !profile.syncthing_secret.is_empty() {
                println!("Secret:    {}", profile.syncthing_secret);
            }
            for dir in &profile.local_sync_dirs {
                println!("Sync dir:  {}", dir.display());
            }
            if !profile.port_forward_pid_list.is_empty() {
                println!();
                let rows = profile
                    .port_forward_pid_list
                    .iter()
                    .map(|r| vec![r.port.to_string(), r.pid.to_string()])
                    .collect();
                print_table(&["PORT", "PID"], rows);
            }
            println!("Updated:   {}", profile.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
            Ok(())
        }
        ProfileSubcommand::List => {
            let profiles = store.list()?;
            if json {
                return print_json(&profiles);
            }
            if profiles.is_empty() {
                println!("No dev profiles.");
                return Ok(());
            }
            let rows = profiles
                .iter()
                .map(|p| {
                    vec![
                        p.name.clone(),
                        p.status.to_string(),
                        p.dev_port_list.len().to_string(),
                        p.distinct_pids().len().to_string(),
                    ]
                })
                .collect();
            print_table(&["SERVICE", "STATUS", "PORTS", "TUNNELS"], rows);
            Ok(())
        }
    }
}
