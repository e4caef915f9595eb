//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (fmt layer, filter from RUST_LOG or config)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields (project_id, host_id, correct_key) on every engine event
//! - Request ID flows from the HTTP layer into handler spans
//! - Metrics are cheap (atomic increments); recording works with no exporter installed

pub mod logging;
pub mod metrics;
