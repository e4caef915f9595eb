//! Retry policy for optimistic-concurrency conflicts.
//!
//! # Responsibilities
//! - Carry the attempt budget and backoff bounds for version-conflict retries
//! - Build the policy from the live reconcile configuration
//!
//! # Design Decisions
//! - Only stale-version conflicts are retried; every other store error is final

use crate::config::schema::ReconcileConfig;

/// Bounded retry policy with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn from_config(config: &ReconcileConfig) -> Self {
        Self {
            attempts: config.version_retry_attempts.max(1),
            base_delay_ms: config.retry_base_delay_ms,
            max_delay_ms: config.retry_max_delay_ms,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ReconcileConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_from_config() {
        let mut config = ReconcileConfig::default();
        config.version_retry_attempts = 0;
        config.retry_base_delay_ms = 7;
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.attempts, 1);
        assert_eq!(policy.base_delay_ms, 7);
        assert_eq!(RetryPolicy::default().attempts, 5);
    }
}
