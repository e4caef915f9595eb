//! Correction batch entries kept in the ledger.
//!
//! A batch is a JSON object keyed by host id, e.g. `{"3":"checking","7":"success"}`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::schema::LedgerConfig;
use crate::host::model::HostId;
use crate::host::status::HostStatus;
use crate::ledger::lock::LedgerLock;
use crate::ledger::{LedgerError, LedgerStore};

/// Interim per-host state within a correction batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchEntry {
    Checking,
    Success,
    Failed,
}

impl BatchEntry {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BatchEntry::Checking)
    }

    /// Entry for a host status; `None` while the host is still operating.
    pub fn from_status(status: HostStatus) -> Option<BatchEntry> {
        match status {
            HostStatus::Operating => None,
            HostStatus::Success => Some(BatchEntry::Success),
            HostStatus::Failed => Some(BatchEntry::Failed),
        }
    }
}

pub type BatchMap = BTreeMap<HostId, BatchEntry>;

/// Reads and writes batch maps under the batch lock.
#[derive(Clone)]
pub struct ProgressLedger {
    store: Arc<dyn LedgerStore>,
    lock: LedgerLock,
    batch_ttl: Duration,
}

impl ProgressLedger {
    pub fn new(store: Arc<dyn LedgerStore>, config: &LedgerConfig) -> Self {
        Self {
            lock: LedgerLock::from_config(store.clone(), config),
            store,
            batch_ttl: config.batch_ttl(),
        }
    }

    /// Create a batch with every host `checking`.
    pub async fn init_batch(&self, key: &str, host_ids: impl IntoIterator<Item = HostId>) -> Result<(), LedgerError> {
        let map: BatchMap = host_ids.into_iter().map(|id| (id, BatchEntry::Checking)).collect();
        self.write(key, &map).await
    }

    /// Current batch map, or `None` once the batch expired or never existed.
    pub async fn read_batch(&self, key: &str) -> Result<Option<BatchMap>, LedgerError> {
        match self.store.get(key).await? {
            None => Ok(None),
            Some(raw) => serde_json::from_str(&raw).map(Some).map_err(|e| LedgerError::Serialization {
                key: key.to_string(),
                message: e.to_string(),
            }),
        }
    }

    /// Merge one host's result into the batch under the batch lock.
    ///
    /// Returns false when the batch has already expired; it is not recreated.
    pub async fn record_result(&self, key: &str, host_id: HostId, entry: BatchEntry) -> Result<bool, LedgerError> {
        let guard = self.lock.acquire(key).await?;
        let merged = self.merge(key, host_id, entry).await;
        let released = guard.release().await;
        let merged = merged?;
        released?;

        tracing::debug!(correct_key = %key, host_id, entry = ?entry, written = merged, "Batch entry recorded");
        Ok(merged)
    }

    async fn merge(&self, key: &str, host_id: HostId, entry: BatchEntry) -> Result<bool, LedgerError> {
        let Some(mut map) = self.read_batch(key).await? else {
            tracing::warn!(correct_key = %key, host_id, "Batch expired before result was recorded");
            return Ok(false);
        };
        map.insert(host_id, entry);
        self.write(key, &map).await?;
        Ok(true)
    }

    async fn write(&self, key: &str, map: &BatchMap) -> Result<(), LedgerError> {
        let raw = serde_json::to_string(map).map_err(|e| LedgerError::Serialization {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        self.store.set_ex(key, &raw, self.batch_ttl).await
    }
}
