use super::{connect, ClusterArgs};
use crate::output::{print_json, print_table};
use anyhow::Context;
use kdev_core::cluster::ClusterClient;
use kdev_core::config::Config;
use kdev_core::profile::ProfileStore;
use kdev_core::rollout::{check_replica_failure, is_deployment_ready};
use kdev_core::types::DevModeStatus;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Serialize)]
struct DeploymentRow {
    name: String,
    desired: i32,
    ready: i32,
    updated: i32,
    available: i32,
    settled: bool,
    replica_failure: Option<String>,
    dev_status: DevModeStatus,
}

pub fn run(root: &Path, args: &ClusterArgs, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load .kdev/config.yaml")?;
    let dev_status: HashMap<String, DevModeStatus> = ProfileStore::new(root)
        .list()?
        .into_iter()
        .map(|p| (p.workload_name().to_string(), p.status))
        .collect();

    let rt = tokio::runtime::Runtime::new()?;
    let deployments = rt.block_on(async {
        let cluster = connect(args, &config).await?;
        cluster
            .list_deployments()
            .await
            .context("failed to list deployments")
    })?;

    let mut rows = Vec::with_capacity(deployments.len());
    for d in &deployments {
        let name = d.metadata.name.clone().unwrap_or_default();
        let status = d.status.clone().unwrap_or_default();
        rows.push(DeploymentRow {
            desired: d.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1),
            ready: status.ready_replicas.unwrap_or(0),
            updated: status.updated_replicas.unwrap_or(0),
            available: status.available_replicas.unwrap_or(0),
            settled: is_deployment_ready(d),
            replica_failure: check_replica_failure(Some(d))?.map(|f| f.reason),
            dev_status: dev_status.get(&name).copied().unwrap_or_default(),
            name,
        });
    }
    rows.sort_by(|a, b| a.name.cmp(&b.name));

    if json {
        return print_json(&rows);
    }
    if rows.is_empty() {
        println!("No deployments.");
        return Ok(());
    }
    let table = rows
        .iter()
        .map(|r| {
            vec![
                r.name.clone(),
                format!("{}/{}", r.ready, r.desired),
                r.updated.to_string(),
                r.available.to_string(),
                match (&r.replica_failure, r.settled) {
                    (Some(reason), _) => format!("failing ({reason})"),
                    (None, true) => "settled".to_string(),
                    (None, false) => "rolling".to_string(),
                },
                r.dev_status.to_string(),
            ]
        })
        .collect();
    print_table(&["NAME", "READY", "UP-TO-DATE", "AVAILABLE", "ROLLOUT", "DEV"], table);
    Ok(())
}
