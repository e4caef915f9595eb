//! Rust client for the host reconciler API.

pub mod client;
pub mod types;

pub use client::{ApiFailure, HostClient};
pub use types::*;
