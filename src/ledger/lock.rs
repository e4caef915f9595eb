//! Named mutual-exclusion lock on top of the ledger store.
//!
//! # Responsibilities
//! - Acquire `lock:{key}` via set-if-absent with a TTL, polling until it succeeds
//! - Release on every exit path through a scoped guard
//!
//! # Design Decisions
//! - The TTL bounds how long a crashed holder can block everyone else
//! - Polling uses a fixed interval plus jitter; contention windows are short
//! - Each acquisition stores a holder token; release is a single compare-and-delete
//!   on that token, so an expired-then-reacquired lock survives

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use crate::config::schema::LedgerConfig;
use crate::ledger::{LedgerError, LedgerStore};
use crate::observability::metrics;
use crate::resilience::backoff::jittered;

/// Lock key guarding a ledger entry.
pub fn lock_key(key: &str) -> String {
    format!("lock:{key}")
}

/// Lock factory bound to a ledger store.
#[derive(Clone)]
pub struct LedgerLock {
    store: Arc<dyn LedgerStore>,
    ttl: Duration,
    retry_interval_ms: u64,
}

impl LedgerLock {
    pub fn new(store: Arc<dyn LedgerStore>, ttl: Duration, retry_interval_ms: u64) -> Self {
        Self { store, ttl, retry_interval_ms }
    }

    pub fn from_config(store: Arc<dyn LedgerStore>, config: &LedgerConfig) -> Self {
        Self::new(store, config.lock_ttl(), config.lock_retry_interval_ms)
    }

    /// Single set-if-absent attempt.
    pub async fn try_acquire(&self, key: &str) -> Result<Option<LockGuard>, LedgerError> {
        let lock_key = lock_key(key);
        let token = Uuid::new_v4().simple().to_string();
        if self.store.set_nx_ex(&lock_key, &token, self.ttl).await? {
            debug!(key = %lock_key, "Ledger lock acquired");
            Ok(Some(LockGuard {
                store: self.store.clone(),
                key: lock_key,
                token,
                released: false,
            }))
        } else {
            Ok(None)
        }
    }

    /// Poll until the lock is ours. Only store errors end the wait.
    pub async fn acquire(&self, key: &str) -> Result<LockGuard, LedgerError> {
        let mut attempts: u64 = 0;
        loop {
            if let Some(guard) = self.try_acquire(key).await? {
                return Ok(guard);
            }
            attempts += 1;
            metrics::record_lock_contention();
            let delay = jittered(self.retry_interval_ms);
            debug!(key = %key, attempts, delay = ?delay, "Ledger lock busy, waiting");
            tokio::time::sleep(delay).await;
        }
    }
}

/// Held lock. Dropping it releases the lock in the background.
pub struct LockGuard {
    store: Arc<dyn LedgerStore>,
    key: String,
    token: String,
    released: bool,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release now and report the outcome.
    pub async fn release(mut self) -> Result<(), LedgerError> {
        self.released = true;
        release_if_held(self.store.as_ref(), &self.key, &self.token).await
    }
}

async fn release_if_held(store: &dyn LedgerStore, key: &str, token: &str) -> Result<(), LedgerError> {
    if store.delete_if_eq(key, token).await? {
        debug!(key = %key, "Ledger lock released");
    } else {
        debug!(key = %key, "Ledger lock already expired or taken over");
    }
    Ok(())
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        // Best-effort release; the TTL covers the case where no runtime is left.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let store = self.store.clone();
        let key = std::mem::take(&mut self.key);
        let token = std::mem::take(&mut self.token);
        handle.spawn(async move {
            if let Err(e) = release_if_held(store.as_ref(), &key, &token).await {
                debug!(key = %key, error = %e, "Lock release on drop failed (will expire via TTL)");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn lock(ledger: Arc<InMemoryLedger>) -> LedgerLock {
        LedgerLock::new(ledger, Duration::from_secs(5), 5)
    }

    #[tokio::test]
    async fn test_exclusive_until_released() {
        let ledger = Arc::new(InMemoryLedger::new());
        let lock = lock(ledger.clone());

        let guard = lock.try_acquire("batch").await.unwrap().unwrap();
        assert_eq!(guard.key(), "lock:batch");
        assert!(lock.try_acquire("batch").await.unwrap().is_none());
        assert!(lock.try_acquire("other").await.unwrap().is_some());

        guard.release().await.unwrap();
        assert!(lock.try_acquire("batch").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_drop_releases() {
        let ledger = Arc::new(InMemoryLedger::new());
        let lock = lock(ledger.clone());
        {
            let _guard = lock.acquire("batch").await.unwrap();
        }
        // acquire() polls until the spawned release lands.
        let again = tokio::time::timeout(Duration::from_secs(1), lock.acquire("batch")).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn test_expired_lock_is_taken_over() {
        let ledger = Arc::new(InMemoryLedger::new());
        let short = LedgerLock::new(ledger.clone(), Duration::from_millis(20), 5);
        let stale = short.acquire("batch").await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        let fresh = short.acquire("batch").await.unwrap();
        // The stale holder must not delete the new holder's lock.
        stale.release().await.unwrap();
        assert!(short.try_acquire("batch").await.unwrap().is_none());
        fresh.release().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_critical_sections_do_not_overlap() {
        let ledger = Arc::new(InMemoryLedger::new());
        let lock = lock(ledger);
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let (lock, inside, max_seen) = (lock.clone(), inside.clone(), max_seen.clone());
            handles.push(tokio::spawn(async move {
                let guard = lock.acquire("batch").await.unwrap();
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
                guard.release().await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }
}
