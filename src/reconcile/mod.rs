//! Host status reconciliation engine.
//!
//! # Data Flow
//! ```text
//! request_correction[_with_progress](project, ids)
//!     → coordinator.rs  filter eligible hosts, CAS each to `operating`
//!     → (progress)      ledger batch: every id `checking`, unknown ids `failed`
//!     → checks.rs       claim each host's check; owned checks are followed
//!     → executor.rs     one task per host, bounded concurrency
//!         → probe       SSH (+ app port for test hosts)
//!         → store       verdict applied only while still `operating`
//!         → slot.rs     terminal ledger entry on every exit path
//!     ← correlation key / selected ids returned immediately
//!
//! checking_progress(key) → progress.rs aggregate
//! list / query           → sweeper.rs  fail stale `operating` hosts in background
//! ```
//!
//! # Design Decisions
//! - Hosts a live task is probing are followed rather than probed twice
//! - Operating hosts nobody is probing are adopted and probed
//! - Followers wait outside the probe pool
//! - Thresholds are read from the live config on every call
//! - No cancellation of running probes; the sweeper bounds how long a host stays `operating`

pub mod checks;
pub mod coordinator;
pub mod executor;
pub mod progress;
pub mod slot;
pub mod sweeper;

use thiserror::Error;

use crate::ledger::LedgerError;
use crate::store::StoreError;

pub use checks::{CheckClaim, CheckRegistry};
pub use coordinator::BatchCorrector;
pub use executor::HostStatusExecutor;
pub use progress::{CheckingProgress, ProgressStatus};
pub use sweeper::TimeoutSweeper;

/// Errors surfaced by correction requests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
