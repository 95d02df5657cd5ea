//! [`ClusterClient`] over the Kubernetes API.

use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
use k8s_openapi::api::core::v1::{Event, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kdev_core::cluster::ClusterClient;
use kdev_core::ClusterError;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::config::{InferConfigError, KubeConfigOptions, KubeconfigError};
use kube::{Client, Config};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("failed to load kubeconfig: {0}")]
    Kubeconfig(#[from] KubeconfigError),

    #[error("failed to infer cluster configuration: {0}")]
    Infer(#[from] InferConfigError),

    #[error("failed to build kubernetes client: {0}")]
    Client(#[from] kube::Error),
}

// ---------------------------------------------------------------------------
// KubeCluster
// ---------------------------------------------------------------------------

/// Namespace-bound handles on the resources a dev session touches.
#[derive(Clone)]
pub struct KubeCluster {
    namespace: String,
    deployments: Api<Deployment>,
    replica_sets: Api<ReplicaSet>,
    events: Api<Event>,
    secrets: Api<Secret>,
}

impl KubeCluster {
    /// Connect using the kubeconfig (or in-cluster config when no context is
    /// named). `namespace` falls back to the context's default namespace.
    pub async fn connect(
        namespace: Option<&str>,
        context: Option<&str>,
    ) -> Result<Self, ConnectError> {
        let config = match context {
            Some(context) => {
                Config::from_kubeconfig(&KubeConfigOptions {
                    context: Some(context.to_string()),
                    ..Default::default()
                })
                .await?
            }
            None => Config::infer().await?,
        };
        let namespace = namespace
            .map(str::to_string)
            .unwrap_or_else(|| config.default_namespace.clone());
        debug!(cluster = %config.cluster_url, namespace = %namespace, "connecting to cluster");
        let client = Client::try_from(config)?;
        Ok(Self::new(client, &namespace))
    }

    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            deployments: Api::namespaced(client.clone(), namespace),
            replica_sets: Api::namespaced(client.clone(), namespace),
            events: Api::namespaced(client.clone(), namespace),
            secrets: Api::namespaced(client, namespace),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl ClusterClient for KubeCluster {
    async fn list_deployments(&self) -> Result<Vec<Deployment>, ClusterError> {
        let list = self
            .deployments
            .list(&ListParams::default())
            .await
            .map_err(|e| cluster_error("deployments", &self.namespace, e))?;
        Ok(list.items)
    }

    async fn get_deployment(&self, name: &str) -> Result<Deployment, ClusterError> {
        self.deployments
            .get(name)
            .await
            .map_err(|e| cluster_error("deployment", name, e))
    }

    async fn update_deployment(&self, deployment: &Deployment) -> Result<Deployment, ClusterError> {
        let name = deployment.metadata.name.as_deref().unwrap_or_default();
        self.deployments
            .replace(name, &PostParams::default(), deployment)
            .await
            .map_err(|e| cluster_error("deployment", name, e))
    }

    async fn list_replica_sets(&self, deployment: &str) -> Result<Vec<ReplicaSet>, ClusterError> {
        let owner = self.get_deployment(deployment).await?;
        let mut params = ListParams::default();
        if let Some(selector) = owner.spec.as_ref().and_then(|s| selector_string(&s.selector)) {
            params = params.labels(&selector);
        }
        let list = self
            .replica_sets
            .list(&params)
            .await
            .map_err(|e| cluster_error("replicasets of", deployment, e))?;

        let uid = owner.metadata.uid.as_deref();
        Ok(list
            .items
            .into_iter()
            .filter(|rs| is_owned_by(rs, deployment, uid))
            .collect())
    }

    async fn list_events_for_replica_set(
        &self,
        replica_set: &str,
    ) -> Result<Vec<Event>, ClusterError> {
        let params = ListParams::default().fields(&replica_set_event_selector(replica_set));
        let list = self
            .events
            .list(&params)
            .await
            .map_err(|e| cluster_error("events of", replica_set, e))?;
        Ok(list.items)
    }

    async fn delete_event(&self, name: &str) -> Result<(), ClusterError> {
        self.events
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| cluster_error("event", name, e))
    }

    async fn delete_secret(&self, name: &str) -> Result<(), ClusterError> {
        self.secrets
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| cluster_error("secret", name, e))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn cluster_error(kind: &str, name: &str, err: kube::Error) -> ClusterError {
    match err {
        kube::Error::Api(resp) if resp.code == 404 => ClusterError::NotFound(format!("{kind} {name}")),
        other => ClusterError::Api(format!("{kind} {name}: {other}")),
    }
}

/// Render a label selector in the API's query syntax. `None` when it selects
/// everything.
fn selector_string(selector: &LabelSelector) -> Option<String> {
    let mut terms: Vec<String> = selector
        .match_labels
        .iter()
        .flatten()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();

    for expr in selector.match_expressions.iter().flatten() {
        let values = expr.values.clone().unwrap_or_default().join(",");
        let term = match expr.operator.as_str() {
            "In" => format!("{} in ({values})", expr.key),
            "NotIn" => format!("{} notin ({values})", expr.key),
            "Exists" => expr.key.clone(),
            "DoesNotExist" => format!("!{}", expr.key),
            _ => continue,
        };
        terms.push(term);
    }

    (!terms.is_empty()).then(|| terms.join(","))
}

/// Owner check by UID, or by name when the Deployment carries none.
fn is_owned_by(rs: &ReplicaSet, deployment: &str, uid: Option<&str>) -> bool {
    rs.metadata
        .owner_references
        .iter()
        .flatten()
        .any(|owner| {
            owner.kind == "Deployment"
                && match uid {
                    Some(uid) => owner.uid == uid,
                    None => owner.name == deployment,
                }
        })
}

fn replica_set_event_selector(replica_set: &str) -> String {
    format!("involvedObject.kind=ReplicaSet,involvedObject.name={replica_set}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
