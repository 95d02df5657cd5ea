use crate::error::ClusterError;
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
use k8s_openapi::api::core::v1::Event;

/// The slice of the Kubernetes API a dev session needs, bound to one
/// namespace. `NotFound` is reported distinctly from other failures.
#[allow(async_fn_in_trait)]
pub trait ClusterClient {
    async fn list_deployments(&self) -> Result<Vec<Deployment>, ClusterError>;

    async fn get_deployment(&self, name: &str) -> Result<Deployment, ClusterError>;

    async fn update_deployment(&self, deployment: &Deployment) -> Result<Deployment, ClusterError>;

    /// ReplicaSets owned by the named Deployment, in no particular order.
    async fn list_replica_sets(&self, deployment: &str) -> Result<Vec<ReplicaSet>, ClusterError>;

    /// Events whose involved object is the named ReplicaSet.
    async fn list_events_for_replica_set(
        &self,
        replica_set: &str,
    ) -> Result<Vec<Event>, ClusterError>;

    async fn delete_event(&self, name: &str) -> Result<(), ClusterError>;

    async fn delete_secret(&self, name: &str) -> Result<(), ClusterError>;
}
