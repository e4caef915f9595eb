//! Managed hosts.
//!
//! # Data Flow
//! ```text
//! HTTP handlers
//!     → service.rs     validation, uniqueness, CRUD, direct connection tests
//!     → install.rs     agent install command and token-gated install script
//!     → validation.rs  field checks (all errors reported)
//!     → status.rs      state machine for every status write
//!     → store          versioned records
//! ```

pub mod install;
pub mod model;
pub mod service;
pub mod status;
pub mod validation;

pub use model::{Host, HostClass, HostId, HostView, ProjectId, UserId};
pub use service::{HostError, HostService};
pub use status::{HostStatus, StatusEvent};
