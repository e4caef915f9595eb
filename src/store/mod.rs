//! Durable host store seam.
//!
//! # Data Flow
//! ```text
//! host service / reconcile engine
//!     → HostStore (read by id, list by project or id set)
//!     → update(): compare-and-swap on Host::version
//!         - match    → write, version + 1
//!         - mismatch → StoreError::StaleVersion
//!     → update_with_retry(): re-read, re-apply, bounded backoff
//! ```
//!
//! # Design Decisions
//! - Optimistic concurrency only; no row locks
//! - Mutations are closures so a retry re-applies them to the fresh record
//! - The relational store is external; `memory.rs` is the in-process backend

pub mod memory;

use async_trait::async_trait;
use std::collections::BTreeSet;
use thiserror::Error;

use crate::host::model::{Host, HostId, NewHost, ProjectId};
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;
use crate::resilience::retries::RetryPolicy;

pub use memory::{InMemoryDeploymentRefs, InMemoryHostStore};

/// Errors raised by the durable host store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The record changed since it was read.
    #[error("stale version for host {id}: expected {expected}, found {actual}")]
    StaleVersion { id: HostId, expected: u64, actual: u64 },

    #[error("host {0} not found")]
    NotFound(HostId),

    /// A uniqueness constraint rejected the write.
    #[error("duplicate {0}")]
    Duplicate(String),

    #[error("host store unavailable: {0}")]
    Unavailable(String),
}

/// Access to host records.
#[async_trait]
pub trait HostStore: Send + Sync {
    /// Insert a new host; the store assigns the id and version 1.
    async fn insert(&self, host: NewHost) -> Result<Host, StoreError>;

    async fn get(&self, id: HostId) -> Result<Option<Host>, StoreError>;

    /// Hosts of a project ordered by id. `search` matches name or IP substrings.
    async fn list_by_project(
        &self,
        project_id: ProjectId,
        search: Option<&str>,
    ) -> Result<Vec<Host>, StoreError>;

    /// Hosts of a project restricted to `ids`; unknown ids are ignored.
    async fn list_by_ids(
        &self,
        project_id: ProjectId,
        ids: &BTreeSet<HostId>,
    ) -> Result<Vec<Host>, StoreError>;

    async fn find_by_name(&self, project_id: ProjectId, name: &str) -> Result<Option<Host>, StoreError>;

    async fn find_by_address(
        &self,
        project_id: ProjectId,
        host_ip: &str,
        ssh_port: u16,
    ) -> Result<Option<Host>, StoreError>;

    /// Compare-and-swap on `host.version`. Returns the stored record with the bumped version.
    async fn update(&self, host: &Host) -> Result<Host, StoreError>;

    /// Returns true if a record was removed.
    async fn delete(&self, id: HostId) -> Result<bool, StoreError>;
}

/// Knows whether deployment jobs point at a host.
#[async_trait]
pub trait DeploymentRefs: Send + Sync {
    async fn is_referenced(&self, project_id: ProjectId, host_id: HostId) -> Result<bool, StoreError>;
}

/// Result of [`update_with_retry`].
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// The mutation was written; carries the stored record.
    Updated(Host),
    /// The mutation declined to write; carries the record it saw.
    Skipped(Host),
    /// No record with that id.
    Missing,
}

/// Read-modify-write a host under optimistic concurrency.
///
/// `mutate` returns false to leave the record untouched. On a stale version the
/// record is re-read and `mutate` re-applied, up to `policy.attempts` times.
pub async fn update_with_retry<F>(
    store: &dyn HostStore,
    id: HostId,
    policy: &RetryPolicy,
    mut mutate: F,
) -> Result<UpdateOutcome, StoreError>
where
    F: FnMut(&mut Host) -> bool + Send,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let Some(mut host) = store.get(id).await? else {
            return Ok(UpdateOutcome::Missing);
        };
        if !mutate(&mut host) {
            return Ok(UpdateOutcome::Skipped(host));
        }

        match store.update(&host).await {
            Ok(updated) => return Ok(UpdateOutcome::Updated(updated)),
            Err(StoreError::StaleVersion { expected, actual, .. }) if attempt < policy.attempts => {
                metrics::record_version_conflict();
                let delay = calculate_backoff(attempt, policy.base_delay_ms, policy.max_delay_ms);
                tracing::debug!(
                    host_id = id,
                    attempt,
                    expected,
                    actual,
                    delay = ?delay,
                    "Stale host version, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::model::{unix_millis, AuthMode, HostClass};
    use crate::host::status::HostStatus;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn new_host(name: &str) -> NewHost {
        NewHost {
            project_id: 1,
            name: name.into(),
            host_ip: "10.1.0.1".into(),
            ssh_port: 22,
            private_ip: None,
            private_port: None,
            auth_mode: AuthMode::Password,
            username: "root".into(),
            secret: "pw".into(),
            token: "t".into(),
            class: HostClass::Deploy,
            app_port: None,
            last_update_ms: unix_millis(),
            last_updated_by: None,
        }
    }

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy { attempts, base_delay_ms: 1, max_delay_ms: 5 }
    }

    /// Lets a concurrent writer win the race on the first `races` updates.
    struct RacingStore {
        inner: InMemoryHostStore,
        races: AtomicU32,
    }

    #[async_trait]
    impl HostStore for RacingStore {
        async fn insert(&self, host: NewHost) -> Result<Host, StoreError> {
            self.inner.insert(host).await
        }
        async fn get(&self, id: HostId) -> Result<Option<Host>, StoreError> {
            self.inner.get(id).await
        }
        async fn list_by_project(&self, p: ProjectId, s: Option<&str>) -> Result<Vec<Host>, StoreError> {
            self.inner.list_by_project(p, s).await
        }
        async fn list_by_ids(&self, p: ProjectId, ids: &BTreeSet<HostId>) -> Result<Vec<Host>, StoreError> {
            self.inner.list_by_ids(p, ids).await
        }
        async fn find_by_name(&self, p: ProjectId, n: &str) -> Result<Option<Host>, StoreError> {
            self.inner.find_by_name(p, n).await
        }
        async fn find_by_address(&self, p: ProjectId, ip: &str, port: u16) -> Result<Option<Host>, StoreError> {
            self.inner.find_by_address(p, ip, port).await
        }
        async fn update(&self, host: &Host) -> Result<Host, StoreError> {
            let race = self
                .races
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if race {
                let mut concurrent = self.inner.get(host.id).await?.ok_or(StoreError::NotFound(host.id))?;
                concurrent.check_error = Some("concurrent".into());
                self.inner.update(&concurrent).await?;
            }
            self.inner.update(host).await
        }
        async fn delete(&self, id: HostId) -> Result<bool, StoreError> {
            self.inner.delete(id).await
        }
    }

    #[tokio::test]
    async fn test_retry_reapplies_on_stale_version() {
        let store = RacingStore { inner: InMemoryHostStore::new(), races: AtomicU32::new(1) };
        let host = store.insert(new_host("a")).await.unwrap();

        let calls = AtomicU32::new(0);
        let outcome = update_with_retry(&store, host.id, &policy(3), |h| {
            calls.fetch_add(1, Ordering::SeqCst);
            h.status = HostStatus::Success;
            true
        })
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        match outcome {
            UpdateOutcome::Updated(h) => {
                assert_eq!(h.status, HostStatus::Success);
                assert_eq!(h.check_error.as_deref(), Some("concurrent"));
                assert_eq!(h.version, 3);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_budget() {
        let store = RacingStore { inner: InMemoryHostStore::new(), races: AtomicU32::new(10) };
        let host = store.insert(new_host("a")).await.unwrap();

        let result = update_with_retry(&store, host.id, &policy(2), |_| true).await;

        assert!(matches!(result, Err(StoreError::StaleVersion { .. })));
    }

    #[tokio::test]
    async fn test_skip_and_missing() {
        let store = InMemoryHostStore::new();
        let host = store.insert(new_host("a")).await.unwrap();

        let skipped = update_with_retry(&store, host.id, &policy(1), |_| false).await.unwrap();
        assert!(matches!(skipped, UpdateOutcome::Skipped(h) if h.version == 1));

        let missing = update_with_retry(&store, 999, &policy(1), |_| true).await.unwrap();
        assert_eq!(missing, UpdateOutcome::Missing);
    }
}
