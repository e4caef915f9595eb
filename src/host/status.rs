//! Host status state machine.
//!
//! # States
//! - Operating: a check is in flight, or the host was just created/edited
//! - Success: the last check passed
//! - Failed: the last check failed or timed out
//!
//! # State Transitions
//! ```text
//! (create)              → Operating
//! any  ── CheckStarted  → Operating
//! any  ── Edited        → Operating
//! Operating ── ProbePassed → Success
//! Operating ── ProbeFailed → Failed
//! Operating ── TimedOut    → Failed
//! ```
//!
//! A verdict arriving for a host that already left `Operating` belongs to an
//! abandoned check cycle and is rejected.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Authoritative per-host health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    Operating,
    Success,
    Failed,
}

impl HostStatus {
    /// Status of a freshly created host.
    pub const INITIAL: HostStatus = HostStatus::Operating;

    pub fn as_str(&self) -> &'static str {
        match self {
            HostStatus::Operating => "operating",
            HostStatus::Success => "success",
            HostStatus::Failed => "failed",
        }
    }

    /// True for `Success` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, HostStatus::Operating)
    }

    /// Apply an event, returning the next status.
    pub fn apply(self, event: StatusEvent) -> Result<HostStatus, TransitionError> {
        match (self, event) {
            (_, StatusEvent::CheckStarted) | (_, StatusEvent::Edited) => Ok(HostStatus::Operating),
            (HostStatus::Operating, StatusEvent::ProbePassed) => Ok(HostStatus::Success),
            (HostStatus::Operating, StatusEvent::ProbeFailed) => Ok(HostStatus::Failed),
            (HostStatus::Operating, StatusEvent::TimedOut) => Ok(HostStatus::Failed),
            (from, event) => Err(TransitionError::NotOperating { from, event }),
        }
    }
}

impl std::fmt::Display for HostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events driving the host status machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    /// A re-check was requested and accepted for this host.
    CheckStarted,
    /// The user changed connection parameters.
    Edited,
    /// The probe (and secondary probe for test hosts) succeeded.
    ProbePassed,
    /// The probe failed.
    ProbeFailed,
    /// The host stayed operating past its operating timeout.
    TimedOut,
}

/// Illegal status transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot apply {event:?} to a host in status {from}")]
    NotOperating { from: HostStatus, event: StatusEvent },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdicts_only_leave_operating() {
        assert_eq!(HostStatus::Operating.apply(StatusEvent::ProbePassed), Ok(HostStatus::Success));
        assert_eq!(HostStatus::Operating.apply(StatusEvent::ProbeFailed), Ok(HostStatus::Failed));
        assert_eq!(HostStatus::Operating.apply(StatusEvent::TimedOut), Ok(HostStatus::Failed));

        for terminal in [HostStatus::Success, HostStatus::Failed] {
            for event in [StatusEvent::ProbePassed, StatusEvent::ProbeFailed, StatusEvent::TimedOut] {
                assert!(terminal.apply(event).is_err(), "{terminal} accepted {event:?}");
            }
        }
    }

    #[test]
    fn test_new_cycle_from_any_state() {
        for status in [HostStatus::Operating, HostStatus::Success, HostStatus::Failed] {
            assert_eq!(status.apply(StatusEvent::CheckStarted), Ok(HostStatus::Operating));
            assert_eq!(status.apply(StatusEvent::Edited), Ok(HostStatus::Operating));
        }
    }

    #[test]
    fn test_serde_representation() {
        assert_eq!(serde_json::to_string(&HostStatus::Operating).unwrap(), "\"operating\"");
        let parsed: HostStatus = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(parsed, HostStatus::Failed);
        assert!(HostStatus::Success.is_terminal());
        assert!(!HostStatus::INITIAL.is_terminal());
    }
}
