//! Roll-up of a correction batch for progress polling.

use serde::{Deserialize, Serialize};

use crate::ledger::{BatchEntry, BatchMap};

/// Overall state of a correction batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Checking,
    Success,
    Failed,
    /// The batch expired or never existed.
    Unknown,
}

impl ProgressStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProgressStatus::Checking)
    }
}

/// Aggregate status plus the share of successful hosts, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CheckingProgress {
    pub status: ProgressStatus,
    pub progress: f64,
}

impl CheckingProgress {
    pub const UNKNOWN: CheckingProgress = CheckingProgress { status: ProgressStatus::Unknown, progress: 0.0 };
}

/// Aggregate a batch map.
///
/// Priority is checking, then failed, then success: any `checking` entry wins,
/// otherwise any `failed` entry wins.
pub fn aggregate(map: Option<&BatchMap>) -> CheckingProgress {
    let Some(map) = map.filter(|m| !m.is_empty()) else {
        return CheckingProgress::UNKNOWN;
    };

    let (mut checking, mut failed, mut success) = (0usize, 0usize, 0usize);
    for entry in map.values() {
        match entry {
            BatchEntry::Checking => checking += 1,
            BatchEntry::Failed => failed += 1,
            BatchEntry::Success => success += 1,
        }
    }

    let status = if checking > 0 {
        ProgressStatus::Checking
    } else if failed > 0 {
        ProgressStatus::Failed
    } else {
        ProgressStatus::Success
    };
    let percent = success as f64 / map.len() as f64 * 100.0;

    CheckingProgress { status, progress: (percent * 100.0).round() / 100.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[BatchEntry]) -> BatchMap {
        entries.iter().enumerate().map(|(i, e)| (i as u64 + 1, *e)).collect()
    }

    #[test]
    fn test_two_of_three_succeed() {
        let progress = aggregate(Some(&map(&[BatchEntry::Success, BatchEntry::Success, BatchEntry::Failed])));
        assert_eq!(progress.status, ProgressStatus::Failed);
        assert_eq!(progress.progress, 66.67);
    }

    #[test]
    fn test_checking_outranks_failed() {
        let progress = aggregate(Some(&map(&[BatchEntry::Failed, BatchEntry::Checking, BatchEntry::Success])));
        assert_eq!(progress.status, ProgressStatus::Checking);
        assert_eq!(progress.progress, 33.33);
    }

    #[test]
    fn test_all_success() {
        let progress = aggregate(Some(&map(&[BatchEntry::Success; 4])));
        assert_eq!(progress, CheckingProgress { status: ProgressStatus::Success, progress: 100.0 });
    }

    #[test]
    fn test_missing_or_empty_is_unknown() {
        assert_eq!(aggregate(None), CheckingProgress::UNKNOWN);
        assert_eq!(aggregate(Some(&BatchMap::new())), CheckingProgress::UNKNOWN);
        assert!(ProgressStatus::Unknown.is_terminal());
    }

    #[test]
    fn test_wire_format() {
        let json = serde_json::to_string(&aggregate(Some(&map(&[BatchEntry::Checking])))).unwrap();
        assert_eq!(json, r#"{"status":"checking","progress":0.0}"#);
    }
}
