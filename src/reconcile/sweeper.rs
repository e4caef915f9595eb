//! Lazy timeout sweep over hosts returned by read paths.
//!
//! # Responsibilities
//! - Find hosts stuck in `operating` past their class's operating timeout
//! - Find occupied test hosts whose occupancy timed out
//! - Correct both in the background so the read path never waits
//!
//! # Design Decisions
//! - Runs on every listing/query instead of on a schedule
//! - Each correction re-checks its condition on the fresh record before writing
//! - A timed-out test host is flagged occupied; a deploy host is not

use arc_swap::ArcSwap;
use std::sync::Arc;

use crate::config::schema::{ReconcileConfig, ReconcilerConfig};
use crate::host::model::{unix_millis, Host, HostClass, HostId, ProjectId};
use crate::host::status::StatusEvent;
use crate::observability::metrics;
use crate::reconcile::executor::HostStatusExecutor;
use crate::resilience::retries::RetryPolicy;
use crate::store::{update_with_retry, HostStore, StoreError, UpdateOutcome};

/// Error message stored on hosts failed by the sweep.
pub const TIMEOUT_ERROR: &str = "timeout";

/// Corrections a sweep will make.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepPlan {
    pub timed_out: Vec<HostId>,
    pub released: Vec<HostId>,
}

impl SweepPlan {
    pub fn is_empty(&self) -> bool {
        self.timed_out.is_empty() && self.released.is_empty()
    }
}

fn occupancy_expired(host: &Host, config: &ReconcileConfig, now_ms: u64) -> bool {
    host.occupied && host.idle_ms(now_ms) > config.occupancy_timeout().as_millis() as u64
}

/// Decide which hosts need correcting. Pure.
pub fn plan_sweep(hosts: &[Host], config: &ReconcileConfig, now_ms: u64) -> SweepPlan {
    let mut plan = SweepPlan::default();
    for host in hosts {
        if host.is_operating_timed_out(config.operating_timeout(host.class), now_ms) {
            plan.timed_out.push(host.id);
        } else if occupancy_expired(host, config, now_ms) {
            plan.released.push(host.id);
        }
    }
    plan
}

/// Force a timed-out operating host to `failed`.
///
/// Test hosts are flagged occupied. No-op if the fresh record no longer qualifies.
pub async fn mark_timeout_failed(
    store: &dyn HostStore,
    host_id: HostId,
    config: &ReconcileConfig,
    policy: &RetryPolicy,
) -> Result<UpdateOutcome, StoreError> {
    let now = unix_millis();
    update_with_retry(store, host_id, policy, |host| {
        if !host.is_operating_timed_out(config.operating_timeout(host.class), now) {
            return false;
        }
        let Ok(status) = host.status.apply(StatusEvent::TimedOut) else {
            return false;
        };
        host.status = status;
        host.check_error = Some(TIMEOUT_ERROR.to_string());
        host.occupied = host.class == HostClass::Test;
        host.touch(None, now);
        true
    })
    .await
}

/// Clear the occupied flag of a test host whose lease timed out.
pub async fn release_occupancy(
    store: &dyn HostStore,
    host_id: HostId,
    config: &ReconcileConfig,
    policy: &RetryPolicy,
) -> Result<UpdateOutcome, StoreError> {
    let now = unix_millis();
    update_with_retry(store, host_id, policy, |host| {
        if !occupancy_expired(host, config, now) {
            return false;
        }
        host.occupied = false;
        host.touch(None, now);
        true
    })
    .await
}

/// Background sweep bound to the host store and the status executor.
#[derive(Clone)]
pub struct TimeoutSweeper {
    store: Arc<dyn HostStore>,
    executor: HostStatusExecutor,
    config: Arc<ArcSwap<ReconcilerConfig>>,
}

impl TimeoutSweeper {
    pub fn new(
        store: Arc<dyn HostStore>,
        executor: HostStatusExecutor,
        config: Arc<ArcSwap<ReconcilerConfig>>,
    ) -> Self {
        Self { store, executor, config }
    }

    /// Plan corrections for `hosts` and run them in the background.
    pub fn sweep(&self, project_id: ProjectId, hosts: &[Host]) -> SweepPlan {
        let config = self.config.load_full();
        let plan = plan_sweep(hosts, &config.reconcile, unix_millis());
        if plan.is_empty() {
            return plan;
        }

        tracing::info!(
            project_id,
            timed_out = ?plan.timed_out,
            released = ?plan.released,
            "Sweeping hosts"
        );
        let store = self.store.clone();
        let task_plan = plan.clone();
        self.executor.spawn(async move {
            let reconcile = &config.reconcile;
            let policy = RetryPolicy::from_config(reconcile);
            for host_id in task_plan.timed_out {
                match mark_timeout_failed(store.as_ref(), host_id, reconcile, &policy).await {
                    Ok(UpdateOutcome::Updated(host)) => {
                        metrics::record_sweep("timeout");
                        tracing::info!(project_id, host_id, occupied = host.occupied, "Operating host timed out, marked failed");
                    }
                    Ok(_) => tracing::debug!(project_id, host_id, "Host no longer timed out, sweep skipped"),
                    Err(e) => tracing::warn!(project_id, host_id, error = %e, "Failed to mark timed-out host"),
                }
            }
            for host_id in task_plan.released {
                match release_occupancy(store.as_ref(), host_id, reconcile, &policy).await {
                    Ok(UpdateOutcome::Updated(_)) => {
                        metrics::record_sweep("release");
                        tracing::info!(project_id, host_id, "Occupied host released");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(project_id, host_id, error = %e, "Failed to release occupied host"),
                }
            }
        });
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::model::{AuthMode, NewHost};
    use crate::host::status::HostStatus;
    use crate::store::InMemoryHostStore;

    const NOW: u64 = 10_000_000_000;

    fn host(id: HostId, class: HostClass, status: HostStatus, age_ms: u64) -> Host {
        Host {
            project_id: 1,
            id,
            name: format!("h{id}"),
            host_ip: format!("10.0.0.{id}"),
            ssh_port: 22,
            private_ip: None,
            private_port: None,
            auth_mode: AuthMode::Password,
            username: "root".into(),
            secret: "pw".into(),
            token: "t".into(),
            class,
            app_port: Some(1099),
            status,
            check_error: None,
            occupied: false,
            version: 1,
            last_update_ms: NOW - age_ms,
            last_updated_by: None,
        }
    }

    #[test]
    fn test_plan_respects_threshold() {
        let config = ReconcileConfig::default();
        let hosts = vec![
            host(1, HostClass::Deploy, HostStatus::Operating, 299_000),
            host(2, HostClass::Deploy, HostStatus::Operating, 300_000),
            host(3, HostClass::Test, HostStatus::Operating, 301_000),
            host(4, HostClass::Test, HostStatus::Success, 900_000),
        ];
        let plan = plan_sweep(&hosts, &config, NOW);
        assert_eq!(plan.timed_out, vec![2, 3]);
        assert!(plan.released.is_empty());
    }

    #[test]
    fn test_plan_uses_class_timeouts() {
        let config = ReconcileConfig { deploy_operating_timeout_secs: 60, ..ReconcileConfig::default() };
        let hosts = vec![
            host(1, HostClass::Deploy, HostStatus::Operating, 61_000),
            host(2, HostClass::Test, HostStatus::Operating, 61_000),
        ];
        assert_eq!(plan_sweep(&hosts, &config, NOW).timed_out, vec![1]);
    }

    #[test]
    fn test_plan_releases_expired_occupancy() {
        let config = ReconcileConfig { occupancy_timeout_hours: 1, ..ReconcileConfig::default() };
        let mut stale = host(1, HostClass::Test, HostStatus::Failed, 3_600_001);
        stale.occupied = true;
        let mut fresh = host(2, HostClass::Test, HostStatus::Failed, 3_599_000);
        fresh.occupied = true;
        let plan = plan_sweep(&[stale, fresh], &config, NOW);
        assert_eq!(plan.released, vec![1]);
    }

    async fn insert(store: &InMemoryHostStore, name: &str, class: HostClass, age_ms: u64) -> Host {
        store
            .insert(NewHost {
                project_id: 1,
                name: name.into(),
                host_ip: format!("10.9.0.{}", name.len()),
                ssh_port: 22,
                private_ip: None,
                private_port: None,
                auth_mode: AuthMode::Password,
                username: "root".into(),
                secret: "pw".into(),
                token: "t".into(),
                class,
                app_port: Some(1099),
                last_update_ms: unix_millis() - age_ms,
                last_updated_by: Some(5),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_mark_timeout_failed_sets_occupancy_by_class() {
        let store = InMemoryHostStore::new();
        let config = ReconcileConfig::default();
        let policy = RetryPolicy::from_config(&config);
        let test_host = insert(&store, "t", HostClass::Test, 301_000).await;
        let deploy_host = insert(&store, "dd", HostClass::Deploy, 301_000).await;

        for (id, occupied) in [(test_host.id, true), (deploy_host.id, false)] {
            let outcome = mark_timeout_failed(&store, id, &config, &policy).await.unwrap();
            let UpdateOutcome::Updated(updated) = outcome else {
                panic!("host {id} not updated");
            };
            assert_eq!(updated.status, HostStatus::Failed);
            assert_eq!(updated.check_error.as_deref(), Some(TIMEOUT_ERROR));
            assert_eq!(updated.occupied, occupied);
            assert_eq!(updated.last_updated_by, Some(5));
        }
    }

    #[tokio::test]
    async fn test_mark_timeout_failed_skips_fresh_host() {
        let store = InMemoryHostStore::new();
        let config = ReconcileConfig::default();
        let fresh = insert(&store, "f", HostClass::Test, 10_000).await;
        let outcome = mark_timeout_failed(&store, fresh.id, &config, &RetryPolicy::default()).await.unwrap();
        assert!(matches!(outcome, UpdateOutcome::Skipped(h) if h.status == HostStatus::Operating));
    }
}
