pub mod deployments;
pub mod dev;
pub mod port_forward;
pub mod profile;

use anyhow::Context;
use clap::Args;
use kdev_core::config::Config;
use kdev_kube::KubeCluster;

/// Cluster selection shared by the commands that talk to Kubernetes.
#[derive(Args, Debug, Clone, Default)]
pub struct ClusterArgs {
    /// Namespace (default: `namespace` in .kdev/config.yaml, then the kubeconfig's)
    #[arg(long, short = 'n', global = true, env = "KDEV_NAMESPACE")]
    pub namespace: Option<String>,

    /// Kubeconfig context (default: `context` in .kdev/config.yaml, then the current one)
    #[arg(long, global = true, env = "KDEV_CONTEXT")]
    pub context: Option<String>,
}

impl ClusterArgs {
    /// Flags win over the config file.
    pub fn resolve(&self, config: &Config) -> (Option<String>, Option<String>) {
        (
            self.namespace.clone().or_else(|| config.namespace.clone()),
            self.context.clone().or_else(|| config.context.clone()),
        )
    }
}

pub async fn connect(args: &ClusterArgs, config: &Config) -> anyhow::Result<KubeCluster> {
    let (namespace, context) = args.resolve(config);
    KubeCluster::connect(namespace.as_deref(), context.as_deref())
        .await
        .context("failed to connect to the cluster")
}
