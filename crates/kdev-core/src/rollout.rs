//! Deployment updates that wait for the rollout to settle.
//!
//! An update is not finished when the Deployment's aggregate counters look
//! right: during a rollout the old ReplicaSet can keep them satisfied while
//! the new one is still starting. [`RolloutWaiter::update_deployment`]
//! therefore waits for both the aggregate and the latest revision.

use crate::cluster::ClusterClient;
use crate::config::RolloutConfig;
use crate::error::{KdevError, Result};
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
use k8s_openapi::api::core::v1::PodTemplateSpec;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Revision number the Deployment controller stamps on each ReplicaSet.
pub const REVISION_ANNOTATION: &str = "deployment.kubernetes.io/revision";
/// JSON `PodTemplateSpec` saved when dev mode replaced the workload's template.
pub const ORIGIN_SPEC_ANNOTATION: &str = "kdev.dev/origin-spec";
/// Replica count saved alongside the origin spec.
pub const ORIGIN_REPLICAS_ANNOTATION: &str = "kdev.dev/origin-replicas";

const REPLICA_FAILURE: &str = "ReplicaFailure";

// ---------------------------------------------------------------------------
// WaitPolicy
// ---------------------------------------------------------------------------

/// Polling schedule for rollout waits: exponential backoff capped at
/// `max_interval`, bounded overall by `timeout`.
#[derive(Debug, Clone, PartialEq)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
}

impl WaitPolicy {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.min(32) as i32);
        let millis = self.initial_interval.as_millis() as f64 * factor;
        Duration::from_millis(millis.min(self.max_interval.as_millis() as f64) as u64)
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self::from(&RolloutConfig::default())
    }
}

impl From<&RolloutConfig> for WaitPolicy {
    fn from(config: &RolloutConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            initial_interval: Duration::from_millis(config.initial_interval_ms),
            max_interval: Duration::from_millis(config.max_interval_ms),
            multiplier: config.multiplier,
        }
    }
}

// ---------------------------------------------------------------------------
// RolloutPhase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloutPhase {
    /// The API server accepted the new spec.
    Updated,
    /// Deployment-level replica counts match the desired count.
    AggregateReady,
    /// The newest ReplicaSet has all its replicas ready.
    LatestRevisionReady,
    Done,
}

impl RolloutPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            RolloutPhase::Updated => "updated",
            RolloutPhase::AggregateReady => "aggregate-ready",
            RolloutPhase::LatestRevisionReady => "latest-revision-ready",
            RolloutPhase::Done => "done",
        }
    }
}

impl fmt::Display for RolloutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Readiness predicates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaFailure {
    pub reason: String,
    pub message: String,
}

/// The Deployment's `ReplicaFailure` condition, if present.
///
/// Errors with [`KdevError::NilDeployment`] when given nothing to check.
pub fn check_replica_failure(deployment: Option<&Deployment>) -> Result<Option<ReplicaFailure>> {
    let deployment = deployment.ok_or(KdevError::NilDeployment)?;
    let failure = deployment
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .into_iter()
        .flatten()
        .find(|c| c.type_ == REPLICA_FAILURE)
        .map(|c| ReplicaFailure {
            reason: c.reason.clone().unwrap_or_default(),
            message: c.message.clone().unwrap_or_default(),
        });
    Ok(failure)
}

fn desired_replicas(deployment: &Deployment) -> i32 {
    deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1)
}

/// True when the controller has observed the current generation and every
/// aggregate replica counter equals the desired count.
pub fn is_deployment_ready(deployment: &Deployment) -> bool {
    let Some(status) = deployment.status.as_ref() else {
        return false;
    };
    let desired = desired_replicas(deployment);
    let generation = deployment.metadata.generation.unwrap_or(0);

    status.observed_generation.unwrap_or(0) >= generation
        && status.updated_replicas.unwrap_or(0) == desired
        && status.ready_replicas.unwrap_or(0) == desired
        && status.available_replicas.unwrap_or(0) == desired
        && status.replicas.unwrap_or(0) == desired
}

pub fn is_replica_set_ready(rs: &ReplicaSet) -> bool {
    let desired = rs.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
    let Some(status) = rs.status.as_ref() else {
        return desired == 0;
    };
    if let (Some(generation), Some(observed)) = (rs.metadata.generation, status.observed_generation) {
        if observed < generation {
            return false;
        }
    }
    status.ready_replicas.unwrap_or(0) >= desired
}

/// Revision from the controller's annotation; 0 when absent or malformed.
pub fn revision_of(rs: &ReplicaSet) -> i64 {
    rs.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(REVISION_ANNOTATION))
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

/// Oldest revision first. Ties fall back to creation time, then name.
pub fn sort_by_revision(mut replica_sets: Vec<ReplicaSet>) -> Vec<ReplicaSet> {
    replica_sets.sort_by(|a, b| {
        revision_of(a)
            .cmp(&revision_of(b))
            .then_with(|| {
                let created = |rs: &ReplicaSet| rs.metadata.creation_timestamp.as_ref().map(|t| t.0);
                created(a).cmp(&created(b))
            })
            .then_with(|| a.metadata.name.cmp(&b.metadata.name))
    });
    replica_sets
}

// ---------------------------------------------------------------------------
// RolloutWaiter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum RollbackOutcome {
    RolledBack(Deployment),
    /// The workload carries no origin spec: it was never modified, or an
    /// earlier rollback already restored it.
    NothingToRestore,
}

pub struct RolloutWaiter<'c, C: ClusterClient> {
    client: &'c C,
    policy: WaitPolicy,
}

impl<'c, C: ClusterClient> RolloutWaiter<'c, C> {
    pub fn new(client: &'c C, policy: WaitPolicy) -> Self {
        Self { client, policy }
    }

    pub fn policy(&self) -> &WaitPolicy {
        &self.policy
    }

    /// The Deployment's ReplicaSets, oldest revision first.
    pub async fn sorted_replica_sets(&self, deployment: &str) -> Result<Vec<ReplicaSet>> {
        let replica_sets = self.client.list_replica_sets(deployment).await?;
        Ok(sort_by_revision(replica_sets))
    }

    /// Submit `deployment` and, with `wait`, block until the rollout settles.
    ///
    /// Settling means the aggregate counters are ready and then the newest
    /// ReplicaSet is ready. Between the two, events left on the previous
    /// revision's ReplicaSet are deleted. One deadline covers both waits.
    pub async fn update_deployment(&self, deployment: &Deployment, wait: bool) -> Result<Deployment> {
        let name = deployment.metadata.name.clone().unwrap_or_default();
        let previous = if wait {
            self.sorted_replica_sets(&name).await?.pop()
        } else {
            None
        };

        let updated = self.client.update_deployment(deployment).await?;
        if !wait {
            return Ok(updated);
        }

        let started = Instant::now();
        let mut phase = RolloutPhase::Updated;
        loop {
            phase = match phase {
                RolloutPhase::Updated => {
                    if !is_deployment_ready(&updated) {
                        self.poll_deployment(&name, started).await?;
                    }
                    RolloutPhase::AggregateReady
                }
                RolloutPhase::AggregateReady => {
                    if let Some(rs_name) = previous.as_ref().and_then(|rs| rs.metadata.name.as_deref()) {
                        self.cleanup_events(rs_name).await;
                    }
                    self.poll_latest_revision(&name, started).await?;
                    RolloutPhase::LatestRevisionReady
                }
                RolloutPhase::LatestRevisionReady => RolloutPhase::Done,
                RolloutPhase::Done => {
                    info!(deployment = %name, "rollout complete");
                    return Ok(updated);
                }
            };
            debug!(deployment = %name, %phase, "rollout advanced");
        }
    }

    /// Poll until the aggregate counters are ready.
    pub async fn wait_deployment_ready(&self, name: &str) -> Result<Deployment> {
        self.poll_deployment(name, Instant::now()).await
    }

    /// Poll until the newest ReplicaSet is ready.
    pub async fn wait_latest_revision_ready(&self, name: &str) -> Result<ReplicaSet> {
        self.poll_latest_revision(name, Instant::now()).await
    }

    /// Restore the pod template saved in the origin-spec annotation and
    /// submit it through [`update_deployment`](Self::update_deployment).
    pub async fn rollback(&self, name: &str, wait: bool) -> Result<RollbackOutcome> {
        let mut deployment = self.client.get_deployment(name).await?;
        let annotations = deployment.metadata.annotations.get_or_insert_with(Default::default);
        let Some(origin) = annotations.remove(ORIGIN_SPEC_ANNOTATION) else {
            info!(deployment = name, "no origin spec recorded, nothing to roll back");
            return Ok(RollbackOutcome::NothingToRestore);
        };
        let replicas = annotations
            .remove(ORIGIN_REPLICAS_ANNOTATION)
            .and_then(|r| r.parse::<i32>().ok());
        let template: PodTemplateSpec = serde_json::from_str(&origin)?;

        let spec = deployment.spec.get_or_insert_with(Default::default);
        spec.template = template;
        if let Some(replicas) = replicas {
            spec.replicas = Some(replicas);
        }

        info!(deployment = name, wait, "rolling back workload");
        let restored = self.update_deployment(&deployment, wait).await?;
        Ok(RollbackOutcome::RolledBack(restored))
    }

    async fn poll_deployment(&self, name: &str, started: Instant) -> Result<Deployment> {
        let client = self.client;
        self.poll_until(name, RolloutPhase::AggregateReady, started, move || async move {
            let deployment = client.get_deployment(name).await?;
            if let Some(failure) = check_replica_failure(Some(&deployment))? {
                return Err(KdevError::ReplicaFailure {
                    reason: failure.reason,
                    message: failure.message,
                });
            }
            let ready = is_deployment_ready(&deployment).then_some(deployment);
            Ok::<_, KdevError>(ready)
        })
        .await
    }

    async fn poll_latest_revision(&self, name: &str, started: Instant) -> Result<ReplicaSet> {
        self.poll_until(name, RolloutPhase::LatestRevisionReady, started, move || async move {
            let latest = self.sorted_replica_sets(name).await?.pop();
            Ok::<_, KdevError>(latest.filter(is_replica_set_ready))
        })
        .await
    }

    async fn poll_until<T, F, Fut>(
        &self,
        name: &str,
        phase: RolloutPhase,
        started: Instant,
        mut check: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let deadline = started + self.policy.timeout;
        let mut attempt = 0u32;
        loop {
            if let Some(value) = check().await? {
                return Ok(value);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(KdevError::RolloutTimeout {
                    deployment: name.to_string(),
                    phase: phase.to_string(),
                    elapsed_secs: now.duration_since(started).as_secs(),
                });
            }
            let delay = self.policy.delay_for_attempt(attempt).min(deadline - now);
            debug!(deployment = name, %phase, attempt, ?delay, "waiting for rollout");
            tokio::time::sleep(delay).await;
            attempt = attempt.saturating_add(1);
        }
    }

    /// Best effort: stale events on the superseded ReplicaSet are noise.
    async fn cleanup_events(&self, replica_set: &str) {
        let events = match self.client.list_events_for_replica_set(replica_set).await {
            Ok(events) => events,
            Err(e) => {
                warn!(replica_set, error = %e, "failed to list replica set events");
                return;
            }
        };
        for event in events {
            let Some(name) = event.metadata.name.as_deref() else {
                continue;
            };
            if let Err(e) = self.client.delete_event(name).await {
                warn!(replica_set, event = name, error = %e, "failed to delete event");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClusterError;
    use crate::testing::{deployment, replica_set, FakeCluster};
    use k8s_openapi::api::apps::v1::DeploymentCondition;

    fn fast_policy() -> WaitPolicy {
        WaitPolicy {
            timeout: Duration::from_secs(30),
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = fast_policy();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(500), Duration::from_secs(1));
    }

    #[test]
    fn policy_from_config() {
        let policy = WaitPolicy::default();
        assert_eq!(policy.timeout, Duration::from_secs(600));
        assert_eq!(policy.initial_interval, Duration::from_secs(1));
        assert_eq!(policy.max_interval, Duration::from_secs(10));
    }

    #[test]
    fn deployment_readiness() {
        assert!(is_deployment_ready(&deployment("web", 2, 2, 2, [2, 2, 2, 2])));
        // Controller has not seen the latest generation.
        assert!(!is_deployment_ready(&deployment("web", 2, 2, 1, [2, 2, 2, 2])));
        // Surplus old pods during a rollout.
        assert!(!is_deployment_ready(&deployment("web", 2, 2, 2, [3, 2, 2, 2])));
        assert!(!is_deployment_ready(&deployment("web", 2, 2, 2, [2, 1, 2, 2])));

        let mut no_status = deployment("web", 1, 1, 1, [1, 1, 1, 1]);
        no_status.status = None;
        assert!(!is_deployment_ready(&no_status));
    }

    #[test]
    fn deployment_without_replicas_defaults_to_one() {
        let mut d = deployment("web", 1, 1, 1, [1, 1, 1, 1]);
        d.spec.as_mut().unwrap().replicas = None;
        assert!(is_deployment_ready(&d));
    }

    #[test]
    fn replica_set_readiness() {
        assert!(is_replica_set_ready(&replica_set("web-a", 1, 2, 2)));
        assert!(!is_replica_set_ready(&replica_set("web-a", 1, 2, 1)));

        let mut stale = replica_set("web-a", 1, 1, 1);
        stale.metadata.generation = Some(3);
        stale.status.as_mut().unwrap().observed_generation = Some(2);
        assert!(!is_replica_set_ready(&stale));
    }

    #[test]
    fn sorts_by_numeric_revision() {
        let sorted = sort_by_revision(vec![
            replica_set("web-c", 10, 1, 1),
            replica_set("web-a", 2, 1, 1),
            replica_set("web-b", 9, 1, 1),
        ]);
        let names: Vec<_> = sorted
            .iter()
            .map(|rs| rs.metadata.name.clone().unwrap())
            .collect();
        assert_eq!(names, vec!["web-a", "web-b", "web-c"]);
    }

    #[test]
    fn replica_failure_condition_is_reported() {
        let mut d = deployment("web", 1, 1, 1, [1, 0, 0, 0]);
        d.status.as_mut().unwrap().conditions = Some(vec![DeploymentCondition {
            type_: "ReplicaFailure".into(),
            status: "True".into(),
            reason: Some("FailedCreate".into()),
            message: Some("quota exceeded".into()),
            ..Default::default()
        }]);

        let failure = check_replica_failure(Some(&d)).unwrap().unwrap();
        assert_eq!(failure.reason, "FailedCreate");
        assert_eq!(failure.message, "quota exceeded");

        let healthy = deployment("web", 1, 1, 1, [1, 1, 1, 1]);
        assert_eq!(check_replica_failure(Some(&healthy)).unwrap(), None);
    }

    #[test]
    fn replica_failure_check_rejects_nothing() {
        let err = check_replica_failure(None).unwrap_err();
        assert!(matches!(err, KdevError::NilDeployment));
        assert_eq!(err.to_string(), "failed to check a nil deployment");
    }

    #[tokio::test(start_paused = true)]
    async fn update_waits_for_aggregate_and_latest_revision() {
        let rolling = deployment("web", 2, 2, 1, [2, 1, 1, 1]);
        let cluster = FakeCluster::default()
            .with_update_response(rolling.clone())
            .with_deployment_polls(vec![
                deployment("web", 2, 2, 2, [3, 2, 2, 2]),
                deployment("web", 2, 2, 2, [2, 2, 2, 2]),
            ])
            .with_replica_set_lists(vec![
                vec![replica_set("web-old", 1, 2, 2)],
                // New revision present but not ready while the old one still
                // keeps the aggregate satisfied.
                vec![replica_set("web-old", 1, 0, 0), replica_set("web-new", 2, 2, 1)],
                vec![replica_set("web-old", 1, 0, 0), replica_set("web-new", 2, 2, 2)],
            ])
            .with_events("web-old", &["ev-1", "ev-2"]);

        let waiter = RolloutWaiter::new(&cluster, fast_policy());
        let result = waiter.update_deployment(&rolling, true).await.unwrap();

        assert_eq!(result, rolling);
        assert_eq!(cluster.count("get_deployment:web"), 2);
        assert_eq!(cluster.count("list_replica_sets:web"), 3);
        assert_eq!(cluster.deleted_events(), vec!["ev-1", "ev-2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn ready_update_skips_aggregate_polling() {
        let ready = deployment("web", 1, 1, 1, [1, 1, 1, 1]);
        let cluster = FakeCluster::default()
            .with_update_response(ready.clone())
            .with_replica_set_lists(vec![vec![replica_set("web-a", 1, 1, 1)]]);

        let waiter = RolloutWaiter::new(&cluster, fast_policy());
        waiter.update_deployment(&ready, true).await.unwrap();

        assert_eq!(cluster.count("get_deployment:web"), 0);
        assert_eq!(cluster.count("update_deployment:web"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn update_without_wait_returns_immediately() {
        let rolling = deployment("web", 2, 2, 1, [2, 0, 0, 0]);
        let cluster = FakeCluster::default();

        let waiter = RolloutWaiter::new(&cluster, fast_policy());
        waiter.update_deployment(&rolling, false).await.unwrap();

        assert_eq!(cluster.count("update_deployment:web"), 1);
        assert_eq!(cluster.count("list_replica_sets:web"), 0);
        assert_eq!(cluster.count("get_deployment:web"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_latest_revision_times_out() {
        let ready = deployment("web", 1, 1, 1, [1, 1, 1, 1]);
        let cluster = FakeCluster::default()
            .with_update_response(ready.clone())
            .with_replica_set_lists(vec![vec![replica_set("web-a", 1, 1, 0)]]);

        let waiter = RolloutWaiter::new(&cluster, fast_policy());
        let err = waiter.update_deployment(&ready, true).await.unwrap_err();

        match err {
            KdevError::RolloutTimeout {
                deployment, phase, ..
            } => {
                assert_eq!(deployment, "web");
                assert_eq!(phase, "latest-revision-ready");
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn replica_failure_aborts_wait() {
        let mut failing = deployment("web", 1, 2, 2, [1, 0, 0, 0]);
        failing.status.as_mut().unwrap().conditions = Some(vec![DeploymentCondition {
            type_: "ReplicaFailure".into(),
            status: "True".into(),
            reason: Some("FailedCreate".into()),
            message: Some("pods forbidden".into()),
            ..Default::default()
        }]);
        let cluster = FakeCluster::default()
            .with_update_response(deployment("web", 1, 2, 1, [1, 0, 0, 0]))
            .with_deployment_polls(vec![failing]);

        let waiter = RolloutWaiter::new(&cluster, fast_policy());
        let err = waiter
            .update_deployment(&deployment("web", 1, 2, 1, [1, 0, 0, 0]), true)
            .await
            .unwrap_err();
        assert!(matches!(err, KdevError::ReplicaFailure { reason, .. } if reason == "FailedCreate"));
    }

    #[tokio::test(start_paused = true)]
    async fn standalone_waits_poll_until_ready() {
        let cluster = FakeCluster::default()
            .with_deployment_polls(vec![
                deployment("web", 1, 2, 1, [1, 1, 1, 1]),
                deployment("web", 1, 2, 2, [1, 1, 1, 1]),
            ])
            .with_replica_set_lists(vec![
                vec![],
                vec![replica_set("web-b", 2, 1, 1), replica_set("web-a", 1, 0, 0)],
            ]);

        let waiter = RolloutWaiter::new(&cluster, fast_policy());
        let ready = waiter.wait_deployment_ready("web").await.unwrap();
        assert_eq!(ready.status.unwrap().observed_generation, Some(2));

        let latest = waiter.wait_latest_revision_ready("web").await.unwrap();
        assert_eq!(latest.metadata.name.as_deref(), Some("web-b"));
        assert_eq!(cluster.count("list_replica_sets:web"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn event_cleanup_failure_does_not_fail_update() {
        let ready = deployment("web", 1, 1, 1, [1, 1, 1, 1]);
        let cluster = FakeCluster::default()
            .with_update_response(ready.clone())
            .with_replica_set_lists(vec![vec![replica_set("web-a", 1, 1, 1)]])
            .with_events("web-a", &["ev-1"])
            .with_event_delete_failure("ev-1");

        let waiter = RolloutWaiter::new(&cluster, fast_policy());
        assert!(waiter.update_deployment(&ready, true).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn rollback_restores_origin_template() {
        let mut current = deployment("web", 1, 3, 3, [1, 1, 1, 1]);
        let mut origin = PodTemplateSpec::default();
        origin.metadata = Some(Default::default());
        origin.metadata.as_mut().unwrap().labels =
            Some([("app".to_string(), "web".to_string())].into());
        current.metadata.annotations = Some(
            [
                (ORIGIN_SPEC_ANNOTATION.to_string(), serde_json::to_string(&origin).unwrap()),
                (ORIGIN_REPLICAS_ANNOTATION.to_string(), "3".to_string()),
                ("team".to_string(), "payments".to_string()),
            ]
            .into(),
        );
        let cluster = FakeCluster::default().with_deployment(current);

        let waiter = RolloutWaiter::new(&cluster, fast_policy());
        let outcome = waiter.rollback("web", false).await.unwrap();
        assert!(matches!(outcome, RollbackOutcome::RolledBack(_)));

        let submitted = cluster.updates().pop().unwrap();
        let annotations = submitted.metadata.annotations.unwrap();
        assert!(!annotations.contains_key(ORIGIN_SPEC_ANNOTATION));
        assert!(!annotations.contains_key(ORIGIN_REPLICAS_ANNOTATION));
        assert_eq!(annotations.get("team").map(String::as_str), Some("payments"));
        let spec = submitted.spec.unwrap();
        assert_eq!(spec.replicas, Some(3));
        assert_eq!(spec.template, origin);
    }

    #[tokio::test(start_paused = true)]
    async fn rollback_without_origin_is_a_no_op() {
        let cluster = FakeCluster::default().with_deployment(deployment("web", 1, 1, 1, [1, 1, 1, 1]));

        let waiter = RolloutWaiter::new(&cluster, fast_policy());
        let outcome = waiter.rollback("web", true).await.unwrap();

        assert_eq!(outcome, RollbackOutcome::NothingToRestore);
        assert!(cluster.updates().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rollback_of_missing_deployment_is_not_found() {
        let cluster = FakeCluster::default();
        let waiter = RolloutWaiter::new(&cluster, fast_policy());
        let err = waiter.rollback("ghost", false).await.unwrap_err();
        assert!(matches!(err, KdevError::Cluster(ClusterError::NotFound(_))));
    }
}
