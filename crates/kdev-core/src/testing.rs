//! In-memory collaborators for unit tests.

use crate::cluster::ClusterClient;
use crate::error::{ClusterError, TerminateError};
use crate::process::Terminator;
use k8s_openapi::api::apps::v1::{
    Deployment, DeploymentSpec, DeploymentStatus, ReplicaSet, ReplicaSetSpec, ReplicaSetStatus,
};
use k8s_openapi::api::core::v1::Event;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Ordered record of calls across fakes, for asserting step order.
pub type Journal = Arc<Mutex<Vec<String>>>;

fn push(journal: &Journal, entry: String) {
    journal.lock().unwrap().push(entry);
}

// ---------------------------------------------------------------------------
// FakeTerminator
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeTerminator {
    calls: Mutex<Vec<(u32, bool, String)>>,
    failures: HashMap<u32, TerminateError>,
    journal: Journal,
}

impl FakeTerminator {
    pub fn with_failure(mut self, pid: u32, error: TerminateError) -> Self {
        self.failures.insert(pid, error);
        self
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    pub fn calls(&self) -> Vec<(u32, bool, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn pids(&self) -> Vec<u32> {
        self.calls().into_iter().map(|(pid, _, _)| pid).collect()
    }
}

impl Terminator for FakeTerminator {
    fn terminate(&self, pid: u32, force: bool, label: &str) -> Result<(), TerminateError> {
        self.calls.lock().unwrap().push((pid, force, label.to_string()));
        push(&self.journal, format!("terminate:{pid}"));
        match self.failures.get(&pid) {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn is_alive(&self, pid: u32) -> bool {
        !self.calls().iter().any(|(p, _, _)| *p == pid)
    }
}

// ---------------------------------------------------------------------------
// FakeCluster
// ---------------------------------------------------------------------------

/// Scripted cluster. Poll queues hand out one entry per call and keep
/// repeating the last one.
#[derive(Default)]
pub struct FakeCluster {
    deployments: Mutex<BTreeMap<String, Deployment>>,
    deployment_polls: Mutex<VecDeque<Deployment>>,
    replica_set_lists: Mutex<VecDeque<Vec<ReplicaSet>>>,
    update_response: Option<Deployment>,
    failing_updates: Mutex<u32>,
    updates: Mutex<Vec<Deployment>>,
    events: HashMap<String, Vec<String>>,
    event_delete_failures: BTreeSet<String>,
    deleted_events: Mutex<Vec<String>>,
    secrets: Mutex<BTreeSet<String>>,
    secret_failures: BTreeSet<String>,
    journal: Journal,
}

impl FakeCluster {
    pub fn with_deployment(self, deployment: Deployment) -> Self {
        let name = deployment.metadata.name.clone().unwrap_or_default();
        self.deployments.lock().unwrap().insert(name, deployment);
        self
    }

    pub fn with_deployment_polls(self, polls: Vec<Deployment>) -> Self {
        *self.deployment_polls.lock().unwrap() = polls.into();
        self
    }

    pub fn with_replica_set_lists(self, lists: Vec<Vec<ReplicaSet>>) -> Self {
        *self.replica_set_lists.lock().unwrap() = lists.into();
        self
    }

    pub fn with_update_response(mut self, deployment: Deployment) -> Self {
        self.update_response = Some(deployment);
        self
    }

    /// Reject the next `n` updates with an API error.
    pub fn with_failing_updates(self, n: u32) -> Self {
        *self.failing_updates.lock().unwrap() = n;
        self
    }

    pub fn with_events(mut self, replica_set: &str, names: &[&str]) -> Self {
        self.events.insert(
            replica_set.to_string(),
            names.iter().map(|n| n.to_string()).collect(),
        );
        self
    }

    pub fn with_event_delete_failure(mut self, name: &str) -> Self {
        self.event_delete_failures.insert(name.to_string());
        self
    }

    pub fn with_secret(self, name: &str) -> Self {
        self.secrets.lock().unwrap().insert(name.to_string());
        self
    }

    pub fn with_secret_failure(mut self, name: &str) -> Self {
        self.secret_failures.insert(name.to_string());
        self
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    pub fn count(&self, entry: &str) -> usize {
        self.journal.lock().unwrap().iter().filter(|e| *e == entry).count()
    }

    pub fn updates(&self) -> Vec<Deployment> {
        self.updates.lock().unwrap().clone()
    }

    pub fn deleted_events(&self) -> Vec<String> {
        self.deleted_events.lock().unwrap().clone()
    }

    pub fn has_secret(&self, name: &str) -> bool {
        self.secrets.lock().unwrap().contains(name)
    }

    fn next_sticky<T: Clone>(queue: &Mutex<VecDeque<T>>) -> Option<T> {
        let mut queue = queue.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

impl ClusterClient for FakeCluster {
    async fn list_deployments(&self) -> Result<Vec<Deployment>, ClusterError> {
        push(&self.journal, "list_deployments".into());
        Ok(self.deployments.lock().unwrap().values().cloned().collect())
    }

    async fn get_deployment(&self, name: &str) -> Result<Deployment, ClusterError> {
        push(&self.journal, format!("get_deployment:{name}"));
        if let Some(d) = Self::next_sticky(&self.deployment_polls) {
            return Ok(d);
        }
        self.deployments
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| ClusterError::NotFound(format!("deployment {name}")))
    }

    async fn update_deployment(&self, deployment: &Deployment) -> Result<Deployment, ClusterError> {
        let name = deployment.metadata.name.clone().unwrap_or_default();
        push(&self.journal, format!("update_deployment:{name}"));
        {
            let mut failing = self.failing_updates.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                return Err(ClusterError::Api("admission webhook denied the request".into()));
            }
        }
        self.updates.lock().unwrap().push(deployment.clone());
        self.deployments
            .lock()
            .unwrap()
            .insert(name, deployment.clone());
        Ok(self
            .update_response
            .clone()
            .unwrap_or_else(|| deployment.clone()))
    }

    async fn list_replica_sets(&self, deployment: &str) -> Result<Vec<ReplicaSet>, ClusterError> {
        push(&self.journal, format!("list_replica_sets:{deployment}"));
        Ok(Self::next_sticky(&self.replica_set_lists).unwrap_or_default())
    }

    async fn list_events_for_replica_set(
        &self,
        replica_set: &str,
    ) -> Result<Vec<Event>, ClusterError> {
        push(&self.journal, format!("list_events:{replica_set}"));
        let names = self.events.get(replica_set).cloned().unwrap_or_default();
        Ok(names
            .into_iter()
            .map(|name| Event {
                metadata: ObjectMeta {
                    name: Some(name),
                    ..Default::default()
                },
                ..Default::default()
            })
            .collect())
    }

    async fn delete_event(&self, name: &str) -> Result<(), ClusterError> {
        push(&self.journal, format!("delete_event:{name}"));
        if self.event_delete_failures.contains(name) {
            return Err(ClusterError::Api("forbidden".into()));
        }
        self.deleted_events.lock().unwrap().push(name.to_string());
        Ok(())
    }

    async fn delete_secret(&self, name: &str) -> Result<(), ClusterError> {
        push(&self.journal, format!("delete_secret:{name}"));
        if self.secret_failures.contains(name) {
            return Err(ClusterError::Api("forbidden".into()));
        }
        if self.secrets.lock().unwrap().remove(name) {
            Ok(())
        } else {
            Err(ClusterError::NotFound(format!("secret {name}")))
        }
    }
}

// ---------------------------------------------------------------------------
// Object builders
// ---------------------------------------------------------------------------

/// `counts` is `[replicas, updated, ready, available]` from the status.
pub fn deployment(
    name: &str,
    desired: i32,
    generation: i64,
    observed: i64,
    counts: [i32; 4],
) -> Deployment {
    let [replicas, updated, ready, available] = counts;
    Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            generation: Some(generation),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(desired),
            ..Default::default()
        }),
        status: Some(DeploymentStatus {
            observed_generation: Some(observed),
            replicas: Some(replicas),
            updated_replicas: Some(updated),
            ready_replicas: Some(ready),
            available_replicas: Some(available),
            ..Default::default()
        }),
    }
}

pub fn replica_set(name: &str, revision: i64, desired: i32, ready: i32) -> ReplicaSet {
    ReplicaSet {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            annotations: Some(
                [(
                    crate::rollout::REVISION_ANNOTATION.to_string(),
                    revision.to_string(),
                )]
                .into(),
            ),
            ..Default::default()
        },
        spec: Some(ReplicaSetSpec {
            replicas: Some(desired),
            ..Default::default()
        }),
        status: Some(ReplicaSetStatus {
            replicas: desired,
            ready_replicas: Some(ready),
            ..Default::default()
        }),
    }
}
