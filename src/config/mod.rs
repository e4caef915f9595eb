//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ReconcilerConfig (validated, immutable)
//!     → shared via Arc<ArcSwap<_>> with the engine and HTTP layer
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → atomic swap of the shared ReconcilerConfig
//!     → next batch / sweep reads the new thresholds
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Listener address and worker pool size are read once at startup

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::ReconcilerConfig;
pub use schema::{AppProbeMode, LedgerConfig, ProbeConfig, ReconcileConfig};
