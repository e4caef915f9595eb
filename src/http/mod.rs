//! REST surface of the reconciler.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs        axum router, request id, trace, timeout, body limit
//!     → middleware/auth  bearer API key (live config), x-user-id actor
//!     → handlers.rs      host service / reconciliation engine
//!     → error.rs         HostError / ReconcileError → status + {code, message}
//! ```

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod server;

pub use error::ApiError;
pub use server::{AppState, HttpServer};
