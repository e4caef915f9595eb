//! Batch correction: select hosts, flip them to `operating`, probe in the background.

use arc_swap::ArcSwap;
use std::collections::BTreeSet;
use std::sync::Arc;

use uuid::Uuid;

use crate::config::schema::{ReconcileConfig, ReconcilerConfig};
use crate::host::model::{unix_millis, Host, HostId, ProjectId, UserId};
use crate::host::status::{HostStatus, StatusEvent};
use crate::ledger::{BatchEntry, LedgerStore, ProgressLedger};
use crate::observability::metrics;
use crate::probe::{run_probe, Prober, ProbeReport};
use crate::reconcile::checks::{CheckClaim, CheckRegistry};
use crate::reconcile::executor::HostStatusExecutor;
use crate::reconcile::progress::{aggregate, CheckingProgress};
use crate::reconcile::slot::BatchSlot;
use crate::reconcile::sweeper::{mark_timeout_failed, TimeoutSweeper};
use crate::reconcile::ReconcileError;
use crate::resilience::retries::RetryPolicy;
use crate::store::{update_with_retry, HostStore, UpdateOutcome};

/// True if a host may start a new check cycle at `now_ms`.
///
/// An `operating` host is only re-selected once its check went stale.
pub fn is_eligible(host: &Host, config: &ReconcileConfig, now_ms: u64) -> bool {
    host.status != HostStatus::Operating
        || host.is_operating_timed_out(config.operating_timeout(host.class), now_ms)
}

/// Entry point of the reconciliation engine.
#[derive(Clone)]
pub struct BatchCorrector {
    store: Arc<dyn HostStore>,
    ledger: Arc<dyn LedgerStore>,
    prober: Arc<dyn Prober>,
    executor: HostStatusExecutor,
    checks: CheckRegistry,
    sweeper: TimeoutSweeper,
    config: Arc<ArcSwap<ReconcilerConfig>>,
}

impl BatchCorrector {
    pub fn new(
        store: Arc<dyn HostStore>,
        ledger: Arc<dyn LedgerStore>,
        prober: Arc<dyn Prober>,
        config: Arc<ArcSwap<ReconcilerConfig>>,
    ) -> Self {
        let executor = HostStatusExecutor::new(config.load().reconcile.max_concurrent_probes);
        let sweeper = TimeoutSweeper::new(store.clone(), executor.clone(), config.clone());
        Self { store, ledger, prober, executor, checks: CheckRegistry::new(), sweeper, config }
    }

    pub fn executor(&self) -> &HostStatusExecutor {
        &self.executor
    }

    /// Checks owned by running probe tasks.
    pub fn checks(&self) -> &CheckRegistry {
        &self.checks
    }

    pub fn sweeper(&self) -> &TimeoutSweeper {
        &self.sweeper
    }

    pub fn prober(&self) -> &Arc<dyn Prober> {
        &self.prober
    }

    pub fn config(&self) -> Arc<ReconcilerConfig> {
        self.config.load_full()
    }

    fn progress_ledger(&self, config: &ReconcilerConfig) -> ProgressLedger {
        ProgressLedger::new(self.ledger.clone(), &config.ledger)
    }

    /// Flip every eligible host in `ids` to `operating` and return them.
    ///
    /// Eligibility is re-checked on the fresh record inside the compare-and-swap,
    /// so concurrent requests never both select the same host.
    pub async fn batch_set_operating(
        &self,
        project_id: ProjectId,
        ids: &BTreeSet<HostId>,
        actor: Option<UserId>,
    ) -> Result<Vec<Host>, ReconcileError> {
        let config = self.config.load_full();
        let policy = RetryPolicy::from_config(&config.reconcile);
        let now = unix_millis();

        let mut selected = Vec::new();
        for host in self.store.list_by_ids(project_id, ids).await? {
            if !is_eligible(&host, &config.reconcile, now) {
                tracing::info!(project_id, host_id = host.id, "Check already in flight, skipping host");
                continue;
            }
            let outcome = update_with_retry(self.store.as_ref(), host.id, &policy, |h| {
                if h.project_id != project_id || !is_eligible(h, &config.reconcile, now) {
                    return false;
                }
                let Ok(status) = h.status.apply(StatusEvent::CheckStarted) else {
                    return false;
                };
                h.status = status;
                h.check_error = None;
                h.touch(actor, now);
                true
            })
            .await?;

            match outcome {
                UpdateOutcome::Updated(host) => selected.push(host),
                UpdateOutcome::Skipped(host) => {
                    tracing::info!(project_id, host_id = host.id, "Host selected concurrently, skipping")
                }
                UpdateOutcome::Missing => {
                    tracing::debug!(project_id, host_id = host.id, "Host deleted during selection")
                }
            }
        }

        tracing::info!(
            project_id,
            requested = ids.len(),
            selected = selected.len(),
            "Hosts set to operating"
        );
        Ok(selected)
    }

    /// Select hosts and probe them in the background. Returns the selected ids.
    pub async fn request_correction(
        &self,
        project_id: ProjectId,
        ids: &BTreeSet<HostId>,
        actor: Option<UserId>,
    ) -> Result<BTreeSet<HostId>, ReconcileError> {
        metrics::record_batch("plain");
        let selected = self.batch_set_operating(project_id, ids, actor).await?;
        let selected_ids = selected.iter().map(|h| h.id).collect();

        for host in selected {
            let Some(claim) = self.checks.claim(host.id) else {
                tracing::info!(project_id, host_id = host.id, "Check owned by another task, skipping probe");
                continue;
            };
            let this = self.clone();
            self.executor.spawn(async move {
                this.correct_host(project_id, claim, actor, None).await;
            });
        }
        Ok(selected_ids)
    }

    /// Start a progress-tracked correction and return its correlation key.
    ///
    /// Every requested id ends with a terminal entry: unknown ids fail at once,
    /// hosts a running task is probing are followed until that check settles or
    /// times out, and every other host is probed.
    pub async fn request_correction_with_progress(
        &self,
        project_id: ProjectId,
        ids: &BTreeSet<HostId>,
        actor: Option<UserId>,
    ) -> Result<String, ReconcileError> {
        metrics::record_batch("progress");
        let config = self.config.load_full();
        let ledger = self.progress_ledger(&config);
        let key = Uuid::new_v4().simple().to_string();

        ledger.init_batch(&key, ids.iter().copied()).await?;

        let known: BTreeSet<HostId> = self
            .store
            .list_by_ids(project_id, ids)
            .await?
            .into_iter()
            .map(|h| h.id)
            .collect();
        for unknown in ids.difference(&known) {
            tracing::info!(project_id, correct_key = %key, host_id = unknown, "Host not in project, marking failed");
            ledger.record_result(&key, *unknown, BatchEntry::Failed).await?;
        }

        let selected = self.batch_set_operating(project_id, &known, actor).await?;
        let selected_ids: BTreeSet<HostId> = selected.iter().map(|h| h.id).collect();

        let mut following = 0;
        for host_id in known.iter().copied() {
            let slot = BatchSlot::new(ledger.clone(), key.clone(), host_id);
            match self.checks.claim(host_id) {
                Some(claim) if selected_ids.contains(&host_id) => {
                    let this = self.clone();
                    self.executor.spawn(async move {
                        this.correct_host(project_id, claim, actor, Some(slot)).await;
                    });
                }
                Some(claim) => self.spawn_adopted(project_id, claim, actor, slot),
                None => {
                    following += 1;
                    let this = self.clone();
                    self.executor.spawn_unbounded(async move {
                        this.follow_host(project_id, actor, slot).await;
                    });
                }
            }
        }

        tracing::info!(
            project_id,
            correct_key = %key,
            requested = ids.len(),
            probing = known.len() - following,
            following,
            "Correction batch started"
        );
        Ok(key)
    }

    /// Aggregate progress of a batch.
    pub async fn checking_progress(&self, correct_key: &str) -> Result<CheckingProgress, ReconcileError> {
        let config = self.config.load_full();
        let map = self.progress_ledger(&config).read_batch(correct_key).await?;
        Ok(aggregate(map.as_ref()))
    }

    /// Host ids of a live batch.
    pub async fn batch_host_ids(&self, correct_key: &str) -> Result<Option<BTreeSet<HostId>>, ReconcileError> {
        let config = self.config.load_full();
        let map = self.progress_ledger(&config).read_batch(correct_key).await?;
        Ok(map.map(|m| m.into_keys().collect()))
    }

    /// Restart and probe a host whose check no live task owns.
    fn spawn_adopted(&self, project_id: ProjectId, claim: CheckClaim, actor: Option<UserId>, slot: BatchSlot) {
        let this = self.clone();
        self.executor.spawn(async move {
            match this.restart_check(project_id, claim.host_id(), actor).await {
                Ok(true) => this.correct_host(project_id, claim, actor, Some(slot)).await,
                Ok(false) => slot.complete(BatchEntry::Failed).await,
                Err(e) => {
                    tracing::warn!(project_id, host_id = claim.host_id(), error = %e, "Failed to restart host check");
                    slot.complete(BatchEntry::Failed).await;
                }
            }
        });
    }

    /// Start a new check cycle on a host regardless of its eligibility.
    ///
    /// Returns false if the host is gone or belongs to another project.
    async fn restart_check(
        &self,
        project_id: ProjectId,
        host_id: HostId,
        actor: Option<UserId>,
    ) -> Result<bool, ReconcileError> {
        let config = self.config.load_full();
        let policy = RetryPolicy::from_config(&config.reconcile);
        let now = unix_millis();
        let outcome = update_with_retry(self.store.as_ref(), host_id, &policy, |h| {
            if h.project_id != project_id {
                return false;
            }
            let Ok(status) = h.status.apply(StatusEvent::CheckStarted) else {
                return false;
            };
            h.status = status;
            h.check_error = None;
            h.touch(actor, now);
            true
        })
        .await?;

        if matches!(outcome, UpdateOutcome::Updated(_)) {
            tracing::info!(project_id, host_id, "Adopted unowned host check");
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Probe one host whose check `claim` owns and record the verdict.
    async fn correct_host(&self, project_id: ProjectId, claim: CheckClaim, actor: Option<UserId>, slot: Option<BatchSlot>) {
        let host_id = claim.host_id();
        let host = match self.store.get(host_id).await {
            Ok(Some(host)) if host.project_id == project_id => host,
            Ok(_) => {
                tracing::info!(project_id, host_id, "Host vanished before probe");
                complete(slot, BatchEntry::Failed).await;
                return;
            }
            Err(e) => {
                tracing::warn!(project_id, host_id, error = %e, "Failed to load host for probe");
                complete(slot, BatchEntry::Failed).await;
                return;
            }
        };

        let report = run_probe(self.prober.as_ref(), &host.connection_params()).await;
        let entry = self.apply_verdict(project_id, host_id, &report, actor).await;
        drop(claim);
        complete(slot, entry).await;
    }

    /// Write a probe verdict, unless the host already left `operating`.
    ///
    /// A passing check also ends a timed-out test host's lease.
    async fn apply_verdict(
        &self,
        project_id: ProjectId,
        host_id: HostId,
        report: &ProbeReport,
        actor: Option<UserId>,
    ) -> BatchEntry {
        let config = self.config.load_full();
        let policy = RetryPolicy::from_config(&config.reconcile);
        let event = if report.passed() { StatusEvent::ProbePassed } else { StatusEvent::ProbeFailed };
        let check_error = report.error_message();

        let outcome = update_with_retry(self.store.as_ref(), host_id, &policy, |h| {
            let Ok(status) = h.status.apply(event) else {
                return false;
            };
            h.status = status;
            h.check_error = check_error.clone();
            if event == StatusEvent::ProbePassed {
                h.occupied = false;
            }
            h.touch(actor, unix_millis());
            true
        })
        .await;

        match outcome {
            Ok(UpdateOutcome::Updated(host)) => {
                tracing::info!(project_id, host_id, status = %host.status, "Host status corrected");
                BatchEntry::from_status(host.status).unwrap_or(BatchEntry::Failed)
            }
            Ok(UpdateOutcome::Skipped(host)) => {
                tracing::info!(
                    project_id,
                    host_id,
                    status = %host.status,
                    "Host left operating before verdict, discarding late result"
                );
                BatchEntry::from_status(host.status).unwrap_or(BatchEntry::Failed)
            }
            Ok(UpdateOutcome::Missing) => {
                tracing::info!(project_id, host_id, "Host deleted before verdict");
                BatchEntry::Failed
            }
            Err(e) => {
                tracing::warn!(project_id, host_id, error = %e, "Failed to store probe verdict");
                BatchEntry::from_status(report.host_status()).unwrap_or(BatchEntry::Failed)
            }
        }
    }

    /// Wait for a check another task owns and record how it ended.
    ///
    /// If the owner gives up while the host is still `operating`, the follower
    /// adopts the check and probes the host itself.
    async fn follow_host(&self, project_id: ProjectId, actor: Option<UserId>, slot: BatchSlot) {
        let host_id = slot.host_id();
        loop {
            let config = self.config.load_full();
            // Read ownership before the record: an owner writes its verdict first.
            let owner_gone = !self.checks.is_claimed(host_id);
            let host = match self.store.get(host_id).await {
                Ok(Some(host)) if host.project_id == project_id => host,
                Ok(_) => {
                    slot.complete(BatchEntry::Failed).await;
                    return;
                }
                Err(e) => {
                    tracing::warn!(project_id, host_id, error = %e, "Failed to poll followed host");
                    tokio::time::sleep(config.reconcile.follow_poll_interval()).await;
                    continue;
                }
            };

            if let Some(entry) = BatchEntry::from_status(host.status) {
                slot.complete(entry).await;
                return;
            }

            if owner_gone {
                if let Some(claim) = self.checks.claim(host_id) {
                    tracing::info!(project_id, host_id, "Followed check lost its owner, adopting");
                    self.spawn_adopted(project_id, claim, actor, slot);
                    return;
                }
            }

            let timeout = config.reconcile.operating_timeout(host.class);
            if host.is_operating_timed_out(timeout, unix_millis()) {
                let policy = RetryPolicy::from_config(&config.reconcile);
                if let Err(e) = mark_timeout_failed(self.store.as_ref(), host_id, &config.reconcile, &policy).await {
                    tracing::warn!(project_id, host_id, error = %e, "Failed to mark followed host timed out");
                }
                tracing::info!(project_id, host_id, "Followed check timed out");
                slot.complete(BatchEntry::Failed).await;
                return;
            }

            tokio::time::sleep(config.reconcile.follow_poll_interval()).await;
        }
    }
}

async fn complete(slot: Option<BatchSlot>, entry: BatchEntry) {
    if let Some(slot) = slot {
        slot.complete(entry).await;
    }
}
