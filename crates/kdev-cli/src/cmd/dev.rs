use super::{connect, ClusterArgs};
use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
use k8s_openapi::api::core::v1::Event;
use kdev_core::cluster::ClusterClient;
use kdev_core::config::Config;
use kdev_core::process::SystemTerminator;
use kdev_core::profile::ProfileStore;
use kdev_core::rollout::WaitPolicy;
use kdev_core::supervisor::StopOutcome;
use kdev_core::teardown::{DevSession, TeardownReport};
use kdev_core::{ClusterError, KdevError};
use std::path::Path;
use tracing::warn;

#[derive(Subcommand)]
pub enum DevSubcommand {
    /// Leave dev mode: stop sync and port-forwards, roll the workload back
    End { service: String },
    /// Force a service out of dev mode from any state, ignoring failures
    Reset { service: String },
}

pub fn run(root: &Path, subcmd: DevSubcommand, args: &ClusterArgs, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load .kdev/config.yaml")?;
    let store = ProfileStore::new(root);
    let terminator = SystemTerminator::new(config.terminate_grace());
    let policy = WaitPolicy::from(&config.rollout);

    match subcmd {
        DevSubcommand::End { service } => {
            let profile = store.load(&service)?;
            if !profile.can_end() {
                return Err(KdevError::NotDeveloping(service).into());
            }

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(async {
                let cluster = connect(args, &config).await?;
                let session =
                    DevSession::new(&store, &cluster, &terminator).with_wait_policy(policy);

                tokio::select! {
                    result = session.end_develop_mode(&service) => {
                        let report = result?;
                        print_report(&report, json)
                    }
                    _ = tokio::signal::ctrl_c() => {
                        eprintln!("interrupted, resetting {service}...");
                        let report = session.reset(&service).await;
                        print_report(&report, json)?;
                        anyhow::bail!("dev end of {service} was interrupted")
                    }
                }
            })
        }
        DevSubcommand::Reset { service } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(async {
                let report = match connect(args, &config).await {
                    Ok(cluster) => {
                        DevSession::new(&store, &cluster, &terminator)
                            .with_wait_policy(policy)
                            .reset(&service)
                            .await
                    }
                    Err(e) => {
                        warn!(error = %format!("{e:#}"), "cluster unreachable, resetting local state only");
                        let offline = Unreachable(format!("{e:#}"));
                        DevSession::new(&store, &offline, &terminator)
                            .with_wait_policy(policy)
                            .reset(&service)
                            .await
                    }
                };
                print_report(&report, json)
            })
        }
    }
}

fn print_report(report: &TeardownReport, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(report);
    }

    println!("{}: {}", report.service, report.status);
    for (label, outcome) in [
        ("sync port-forward", &report.sync_port_forward),
        ("file sync", &report.sync_daemon),
    ] {
        match outcome {
            Some(StopOutcome::Stopped { pid }) => println!("  stopped {label} (pid {pid})"),
            Some(StopOutcome::AlreadyExited { pid }) => {
                println!("  {label} (pid {pid}) had already exited")
            }
            Some(StopOutcome::Advisory { pid, hint }) => {
                println!("  {label} (pid {pid}) may still be running, check with `{hint}`")
            }
            Some(StopOutcome::NoPid) | None => {}
        }
    }
    for port in &report.dev_ports_ended {
        println!("  ended port-forward {port}");
    }
    if let Some(secret) = &report.secret_deleted {
        println!("  deleted secret {secret}");
    }
    if report.rolled_back {
        println!("  rolled back workload");
    }
    for warning in &report.warnings {
        println!("  warning: {warning}");
    }
    Ok(())
}

/// Stand-in cluster for `dev reset` when the API server cannot be reached:
/// every call fails, so only local state is cleaned up.
struct Unreachable(String);

impl Unreachable {
    fn err<T>(&self) -> Result<T, ClusterError> {
        Err(ClusterError::Api(self.0.clone()))
    }
}

impl ClusterClient for Unreachable {
    async fn list_deployments(&self) -> Result<Vec<Deployment>, ClusterError> {
        self.err()
    }

    async fn get_deployment(&self, _name: &str) -> Result<Deployment, ClusterError> {
        self.err()
    }

    async fn update_deployment(&self, _deployment: &Deployment) -> Result<Deployment, ClusterError> {
        self.err()
    }

    async fn list_replica_sets(&self, _deployment: &str) -> Result<Vec<ReplicaSet>, ClusterError> {
        self.err()
    }

    async fn list_events_for_replica_set(
        &self,
        _replica_set: &str,
    ) -> Result<Vec<Event>, ClusterError> {
        self.err()
    }

    async fn delete_event(&self, _name: &str) -> Result<(), ClusterError> {
        self.err()
    }

    async fn delete_secret(&self, _name: &str) -> Result<(), ClusterError> {
        self.err()
    }
}
