//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the reconciler.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::host::model::HostClass;

/// Root configuration for the host reconciler.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// API authentication and request limits.
    pub security: SecurityConfig,

    /// HTTP timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Status reconciliation thresholds and worker pool sizing.
    pub reconcile: ReconcileConfig,

    /// Progress ledger TTLs and lock polling.
    pub ledger: LedgerConfig,

    /// Connectivity probe settings.
    pub probe: ProbeConfig,

    /// Host agent install settings.
    pub agent: AgentConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Security configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SecurityConfig {
    /// Bearer token required on the host API. Empty disables authentication.
    pub api_key: String,
    /// Maximum body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Timeout configuration for the HTTP layer.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Reconciliation engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ReconcileConfig {
    /// How long a deploy host may stay `operating` before it is re-checkable and swept.
    pub deploy_operating_timeout_secs: u64,

    /// Same threshold for test hosts.
    pub test_operating_timeout_secs: u64,

    /// After this long an occupied test host is released.
    pub occupancy_timeout_hours: u64,

    /// Upper bound on concurrently running host-status tasks.
    pub max_concurrent_probes: usize,

    /// Attempts for a read-modify-write that hits a stale version.
    pub version_retry_attempts: u32,

    /// Base delay for version-conflict backoff in milliseconds.
    pub retry_base_delay_ms: u64,

    /// Maximum delay for version-conflict backoff in milliseconds.
    pub retry_max_delay_ms: u64,

    /// Poll interval for followers of checks already in flight.
    pub follow_poll_interval_ms: u64,
}

impl ReconcileConfig {
    /// Operating timeout for a host class.
    pub fn operating_timeout(&self, class: HostClass) -> Duration {
        match class {
            HostClass::Deploy => Duration::from_secs(self.deploy_operating_timeout_secs),
            HostClass::Test => Duration::from_secs(self.test_operating_timeout_secs),
        }
    }

    pub fn occupancy_timeout(&self) -> Duration {
        Duration::from_secs(self.occupancy_timeout_hours.saturating_mul(3600))
    }

    pub fn follow_poll_interval(&self) -> Duration {
        Duration::from_millis(self.follow_poll_interval_ms)
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            deploy_operating_timeout_secs: 300,
            test_operating_timeout_secs: 300,
            occupancy_timeout_hours: 24,
            max_concurrent_probes: 16,
            version_retry_attempts: 5,
            retry_base_delay_ms: 20,
            retry_max_delay_ms: 500,
            follow_poll_interval_ms: 1000,
        }
    }
}

/// Progress ledger configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LedgerConfig {
    /// Expiry of a correction batch entry in seconds.
    pub batch_ttl_secs: u64,

    /// Expiry of a batch lock in seconds; bounds how long a crashed holder blocks peers.
    pub lock_ttl_secs: u64,

    /// Sleep between lock acquisition attempts in milliseconds.
    pub lock_retry_interval_ms: u64,
}

impl LedgerConfig {
    pub fn batch_ttl(&self) -> Duration {
        Duration::from_secs(self.batch_ttl_secs)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            batch_ttl_secs: 600,
            lock_ttl_secs: 600,
            lock_retry_interval_ms: 1000,
        }
    }
}

/// How the secondary application probe talks to a test host.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AppProbeMode {
    /// TCP connect to the application port.
    Tcp,
    /// HTTP GET against `app_probe_path`; any non-5xx answer counts as alive.
    Http,
}

/// Connectivity probe configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ProbeConfig {
    /// Deadline for the SSH connect + handshake + auth, in seconds.
    pub ssh_timeout_secs: u64,

    /// Deadline for the application probe, in seconds.
    pub app_timeout_secs: u64,

    pub app_probe: AppProbeMode,

    /// Path requested by the HTTP application probe.
    pub app_probe_path: String,
}

impl ProbeConfig {
    pub fn ssh_timeout(&self) -> Duration {
        Duration::from_secs(self.ssh_timeout_secs)
    }

    pub fn app_timeout(&self) -> Duration {
        Duration::from_secs(self.app_timeout_secs)
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            ssh_timeout_secs: 10,
            app_timeout_secs: 5,
            app_probe: AppProbeMode::Tcp,
            app_probe_path: "/".to_string(),
        }
    }
}

/// Host agent install configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Public base URL of this API, used in the agent install command.
    pub download_api_url: String,

    /// Where the install script fetches the agent binary from.
    pub binary_url: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            download_api_url: "http://localhost:8080".to_string(),
            binary_url: "https://downloads.example.com/host-agent/latest/host-agent".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
