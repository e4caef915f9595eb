//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts and TTLs > 0, pool size > 0)
//! - Check addresses parse and lock polling fits inside the lock TTL
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ReconcilerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::ReconcilerConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending key, e.g. `ledger.lock_ttl_secs`.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self { field, message: message.into() }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &ReconcilerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    let non_zero: [(&'static str, u64); 10] = [
        ("timeouts.request_secs", config.timeouts.request_secs),
        ("reconcile.deploy_operating_timeout_secs", config.reconcile.deploy_operating_timeout_secs),
        ("reconcile.test_operating_timeout_secs", config.reconcile.test_operating_timeout_secs),
        ("reconcile.occupancy_timeout_hours", config.reconcile.occupancy_timeout_hours),
        ("reconcile.follow_poll_interval_ms", config.reconcile.follow_poll_interval_ms),
        ("ledger.batch_ttl_secs", config.ledger.batch_ttl_secs),
        ("ledger.lock_ttl_secs", config.ledger.lock_ttl_secs),
        ("ledger.lock_retry_interval_ms", config.ledger.lock_retry_interval_ms),
        ("probe.ssh_timeout_secs", config.probe.ssh_timeout_secs),
        ("probe.app_timeout_secs", config.probe.app_timeout_secs),
    ];
    for (field, value) in non_zero {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than zero"));
        }
    }

    if config.reconcile.max_concurrent_probes == 0 {
        errors.push(ValidationError::new("reconcile.max_concurrent_probes", "must be greater than zero"));
    }
    if config.reconcile.version_retry_attempts == 0 {
        errors.push(ValidationError::new("reconcile.version_retry_attempts", "must be greater than zero"));
    }
    if config.reconcile.retry_base_delay_ms > config.reconcile.retry_max_delay_ms {
        errors.push(ValidationError::new(
            "reconcile.retry_base_delay_ms",
            "must not exceed reconcile.retry_max_delay_ms",
        ));
    }

    if config.ledger.lock_retry_interval_ms >= config.ledger.lock_ttl_secs.saturating_mul(1000) {
        errors.push(ValidationError::new(
            "ledger.lock_retry_interval_ms",
            "must be shorter than ledger.lock_ttl_secs",
        ));
    }

    if !config.probe.app_probe_path.starts_with('/') {
        errors.push(ValidationError::new("probe.app_probe_path", "must start with '/'"));
    }

    for (field, url) in [
        ("agent.download_api_url", &config.agent.download_api_url),
        ("agent.binary_url", &config.agent.binary_url),
    ] {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push(ValidationError::new(field, "must be an http(s) URL"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate_config(&ReconcilerConfig::default()).is_ok());
    }

    #[test]
    fn test_reports_every_error() {
        let mut config = ReconcilerConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.reconcile.max_concurrent_probes = 0;
        config.ledger.lock_ttl_secs = 1;
        config.ledger.lock_retry_interval_ms = 1000;
        config.probe.app_probe_path = "health".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "reconcile.max_concurrent_probes",
                "ledger.lock_retry_interval_ms",
                "probe.app_probe_path",
            ]
        );
    }

    #[test]
    fn test_agent_urls_must_be_http() {
        let mut config = ReconcilerConfig::default();
        config.agent.binary_url = "ftp://mirror/host-agent".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "agent.binary_url");
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = ReconcilerConfig::default();
        config.reconcile.test_operating_timeout_secs = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].to_string(), "reconcile.test_operating_timeout_secs: must be greater than zero");
    }
}
