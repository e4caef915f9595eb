//! Connectivity probing.
//!
//! # Data Flow
//! ```text
//! ConnectionParams
//!     → ssh.rs    TCP connect → SSH handshake → auth → disconnect   (blocking pool)
//!     → app.rs    test hosts only: TCP connect or HTTP GET on app_port
//!     → ProbeReport { ssh, app }
//!     → passed() = ssh ok && (deploy || app ok)
//! ```
//!
//! # Design Decisions
//! - Probers never fail past their boundary; every failure is a `ProbeFailure` value
//! - Each check has its own deadline so a wedged host cannot hold a worker forever
//! - `Prober` is a trait so the engine runs against scripted probers in tests

pub mod app;
pub mod ssh;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;

use crate::host::model::{AuthMode, HostClass};
use crate::host::status::HostStatus;
use crate::observability::metrics;

pub use ssh::SshProber;

/// Everything needed to reach and authenticate against a host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub host_ip: String,
    pub ssh_port: u16,
    pub auth_mode: AuthMode,
    pub username: String,
    pub secret: String,
    #[serde(default = "default_class")]
    pub class: HostClass,
    #[serde(default)]
    pub app_port: Option<u16>,
}

fn default_class() -> HostClass {
    HostClass::Deploy
}

/// Why a check failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeFailure {
    #[error("network unreachable: {0}")]
    Unreachable(String),

    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("application port {port} not responding: {reason}")]
    AppUnreachable { port: u16, reason: String },

    #[error("probe error: {0}")]
    Internal(String),
}

/// Outcome of probing one host.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub ssh: Result<(), ProbeFailure>,
    /// Only present for test hosts.
    pub app: Option<Result<(), ProbeFailure>>,
}

impl ProbeReport {
    pub fn passed(&self) -> bool {
        self.ssh.is_ok() && self.app.as_ref().map_or(true, Result::is_ok)
    }

    /// Terminal status this report maps to.
    pub fn host_status(&self) -> HostStatus {
        if self.passed() {
            HostStatus::Success
        } else {
            HostStatus::Failed
        }
    }

    /// Joined failure messages, `None` when the report passed.
    pub fn error_message(&self) -> Option<String> {
        let mut messages = Vec::new();
        if let Err(e) = &self.ssh {
            messages.push(e.to_string());
        }
        if let Some(Err(e)) = &self.app {
            messages.push(e.to_string());
        }
        if messages.is_empty() {
            None
        } else {
            Some(messages.join("; "))
        }
    }
}

/// Serializable probe verdict returned by direct connection tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionTestResult {
    pub passed: bool,
    pub ssh_ok: bool,
    pub app_ok: Option<bool>,
    pub error: Option<String>,
}

impl From<&ProbeReport> for ConnectionTestResult {
    fn from(report: &ProbeReport) -> Self {
        Self {
            passed: report.passed(),
            ssh_ok: report.ssh.is_ok(),
            app_ok: report.app.as_ref().map(Result::is_ok),
            error: report.error_message(),
        }
    }
}

/// Checks whether a host is reachable and its credentials are valid.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, params: &ConnectionParams) -> ProbeReport;
}

/// Probe with timing, logging and metrics.
pub async fn run_probe(prober: &dyn Prober, params: &ConnectionParams) -> ProbeReport {
    let started = Instant::now();
    let report = prober.probe(params).await;
    let passed = report.passed();
    metrics::record_probe(params.class.as_str(), passed, started);

    if passed {
        tracing::debug!(
            host_ip = %params.host_ip,
            ssh_port = params.ssh_port,
            class = params.class.as_str(),
            elapsed = ?started.elapsed(),
            "Probe passed"
        );
    } else {
        tracing::warn!(
            host_ip = %params.host_ip,
            ssh_port = params.ssh_port,
            class = params.class.as_str(),
            error = report.error_message().unwrap_or_default(),
            "Probe failed"
        );
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_test_hosts_need_both_checks() {
        let deploy = ProbeReport { ssh: Ok(()), app: None };
        assert!(deploy.passed());
        assert_eq!(deploy.host_status(), HostStatus::Success);
        assert_eq!(deploy.error_message(), None);

        let test_app_down = ProbeReport {
            ssh: Ok(()),
            app: Some(Err(ProbeFailure::AppUnreachable { port: 1099, reason: "refused".into() })),
        };
        assert!(!test_app_down.passed());
        assert_eq!(test_app_down.host_status(), HostStatus::Failed);
    }

    #[test]
    fn test_error_message_joins_failures() {
        let report = ProbeReport {
            ssh: Err(ProbeFailure::Timeout(Duration::from_secs(10))),
            app: Some(Err(ProbeFailure::AppUnreachable { port: 80, reason: "refused".into() })),
        };
        assert_eq!(
            report.error_message().unwrap(),
            "timed out after 10s; application port 80 not responding: refused"
        );
        let result = ConnectionTestResult::from(&report);
        assert!(!result.passed);
        assert_eq!(result.app_ok, Some(false));
    }

    #[test]
    fn test_params_default_to_deploy() {
        let params: ConnectionParams = serde_json::from_str(
            r#"{"host_ip":"10.0.0.1","ssh_port":22,"auth_mode":"password","username":"root","secret":"x"}"#,
        )
        .unwrap();
        assert_eq!(params.class, HostClass::Deploy);
        assert_eq!(params.app_port, None);
    }
}
