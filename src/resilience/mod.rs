//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Store write rejected with a stale version:
//!     → retries.rs (bounded attempt budget)
//!     → backoff.rs (exponential delay with jitter)
//!     → re-read, re-apply, write again
//!
//! Ledger lock busy:
//!     → backoff.rs::jittered (fixed interval + jitter), poll again
//! ```
//!
//! # Design Decisions
//! - Retries are always bounded; an exhausted budget surfaces the conflict
//! - Jitter keeps concurrent probe completions from retrying in lockstep

pub mod backoff;
pub mod retries;
