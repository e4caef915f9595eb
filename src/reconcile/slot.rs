//! Per-host reservation in a progress-tracked batch.

use crate::host::model::HostId;
use crate::ledger::{BatchEntry, ProgressLedger};

/// Guarantees a terminal ledger entry for one host.
///
/// `complete` writes the given entry. Dropping the slot without completing it,
/// whether through an early return or a panic, records `failed`.
pub struct BatchSlot {
    ledger: ProgressLedger,
    key: String,
    host_id: HostId,
    done: bool,
}

impl BatchSlot {
    pub fn new(ledger: ProgressLedger, key: impl Into<String>, host_id: HostId) -> Self {
        Self { ledger, key: key.into(), host_id, done: false }
    }

    pub fn host_id(&self) -> HostId {
        self.host_id
    }

    pub async fn complete(mut self, entry: BatchEntry) {
        self.done = true;
        record(&self.ledger, &self.key, self.host_id, entry).await;
    }
}

async fn record(ledger: &ProgressLedger, key: &str, host_id: HostId, entry: BatchEntry) {
    if let Err(e) = ledger.record_result(key, host_id, entry).await {
        // The batch TTL bounds how long this host reads as checking.
        tracing::warn!(correct_key = %key, host_id, error = %e, "Failed to record batch result");
    }
}

impl Drop for BatchSlot {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(correct_key = %self.key, host_id = self.host_id, "No runtime to record abandoned batch slot");
            return;
        };
        tracing::warn!(correct_key = %self.key, host_id = self.host_id, "Batch slot abandoned, recording failed");
        let ledger = self.ledger.clone();
        let key = std::mem::take(&mut self.key);
        let host_id = self.host_id;
        handle.spawn(async move {
            record(&ledger, &key, host_id, BatchEntry::Failed).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::LedgerConfig;
    use crate::ledger::InMemoryLedger;
    use std::sync::Arc;
    use std::time::Duration;

    fn ledger() -> ProgressLedger {
        let config = LedgerConfig { lock_retry_interval_ms: 5, ..LedgerConfig::default() };
        ProgressLedger::new(Arc::new(InMemoryLedger::new()), &config)
    }

    async fn entry_eventually(ledger: &ProgressLedger, host_id: HostId) -> BatchEntry {
        for _ in 0..100 {
            let map = ledger.read_batch("k").await.unwrap().unwrap();
            if map[&host_id].is_terminal() {
                return map[&host_id];
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("host {host_id} never reached a terminal entry");
    }

    #[tokio::test]
    async fn test_complete_writes_entry() {
        let ledger = ledger();
        ledger.init_batch("k", [1]).await.unwrap();
        BatchSlot::new(ledger.clone(), "k", 1).complete(BatchEntry::Success).await;
        assert_eq!(entry_eventually(&ledger, 1).await, BatchEntry::Success);
    }

    #[tokio::test]
    async fn test_dropped_slot_records_failed() {
        let ledger = ledger();
        ledger.init_batch("k", [1, 2]).await.unwrap();
        drop(BatchSlot::new(ledger.clone(), "k", 2));
        assert_eq!(entry_eventually(&ledger, 2).await, BatchEntry::Failed);
    }

    #[tokio::test]
    async fn test_panicking_task_records_failed() {
        let ledger = ledger();
        ledger.init_batch("k", [3]).await.unwrap();
        let slot = BatchSlot::new(ledger.clone(), "k", 3);
        let handle = tokio::spawn(async move {
            let _slot = slot;
            panic!("probe task crashed");
        });
        assert!(handle.await.is_err());
        assert_eq!(entry_eventually(&ledger, 3).await, BatchEntry::Failed);
    }
}
