//! Progress ledger: a shared, TTL-bounded key/value store for batch results.
//!
//! # Data Flow
//! ```text
//! correct_with_progress
//!     → ProgressLedger::init_batch() key → {"1":"checking","2":"checking"}
//!
//! per-host task completes
//!     → lock::LedgerLock::acquire("lock:" + key)   set-if-absent + TTL, poll
//!     → ProgressLedger::record_result() read map, set one entry, write back + TTL
//!     → guard dropped / released   delete lock key if it still holds our token
//!
//! progress poll
//!     → ProgressLedger::read_batch() → reconcile::progress::aggregate()
//! ```
//!
//! # Design Decisions
//! - One coarse lock per batch map; batches are small and critical sections short
//! - Entries are never deleted explicitly; the TTL bounds their lifetime
//! - The store is a trait so the lock discipline is testable against `InMemoryLedger`

pub mod batch;
pub mod lock;
pub mod memory;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use batch::{BatchEntry, BatchMap, ProgressLedger};
pub use lock::{LedgerLock, LockGuard};
pub use memory::InMemoryLedger;

/// Errors raised by the ledger store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("ledger store unavailable: {0}")]
    Unavailable(String),

    /// A stored batch value could not be decoded or encoded.
    #[error("ledger value for {key} is malformed: {message}")]
    Serialization { key: String, message: String },
}

/// String key/value store with expiry.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, LedgerError>;

    /// Set `key`, replacing any value, expiring after `ttl`.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), LedgerError>;

    /// Set `key` only if absent. Returns true when this call created it.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, LedgerError>;

    /// Returns true if a live key was removed.
    async fn delete(&self, key: &str) -> Result<bool, LedgerError>;

    /// Delete `key` only while it holds `expected`, as one atomic step.
    /// Returns true if the key was removed.
    async fn delete_if_eq(&self, key: &str, expected: &str) -> Result<bool, LedgerError>;
}
