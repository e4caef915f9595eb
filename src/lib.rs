//! Host connectivity reconciler library.
//!
//! Keeps the stored status of managed hosts in line with their real SSH (and
//! application port) reachability: batch corrections, progress tracking through
//! a shared ledger, and lazy timeout sweeps on every read.

pub mod config;
pub mod host;
pub mod http;
pub mod ledger;
pub mod lifecycle;
pub mod observability;
pub mod probe;
pub mod reconcile;
pub mod resilience;
pub mod store;

pub use config::schema::ReconcilerConfig;
pub use host::HostService;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use reconcile::BatchCorrector;
