//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → HTTP server stops accepting, drains in-flight requests
//!             → status executor drained with a deadline
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accepting, finish requests, then background checks
//! - Background checks get a bounded drain; hosts left `operating` are
//!   recovered by the timeout sweep after restart

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_termination;
