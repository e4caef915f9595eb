//! Ownership of the host checks running in this process.
//!
//! A host in `operating` is either being probed by a live task, which holds a
//! [`CheckClaim`] for it, or its check was abandoned (fresh host, edit, sync
//! selection, crashed task). Batches follow the first kind and probe the second.

use dashmap::DashSet;
use std::sync::Arc;

use crate::host::model::HostId;

/// Hosts whose probe a live task currently owns.
#[derive(Clone, Default)]
pub struct CheckRegistry {
    owned: Arc<DashSet<HostId>>,
}

impl CheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of the check of `host_id`. `None` if a live task owns it.
    pub fn claim(&self, host_id: HostId) -> Option<CheckClaim> {
        if self.owned.insert(host_id) {
            Some(CheckClaim { owned: self.owned.clone(), host_id })
        } else {
            None
        }
    }

    pub fn is_claimed(&self, host_id: HostId) -> bool {
        self.owned.contains(&host_id)
    }

    /// Number of checks currently owned.
    pub fn len(&self) -> usize {
        self.owned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owned.is_empty()
    }
}

/// Held by the task probing a host. Dropping it gives the check up.
#[derive(Debug)]
pub struct CheckClaim {
    owned: Arc<DashSet<HostId>>,
    host_id: HostId,
}

impl CheckClaim {
    pub fn host_id(&self) -> HostId {
        self.host_id
    }
}

impl Drop for CheckClaim {
    fn drop(&mut self) {
        self.owned.remove(&self.host_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_is_exclusive_until_dropped() {
        let registry = CheckRegistry::new();
        let claim = registry.claim(4).unwrap();
        assert_eq!(claim.host_id(), 4);
        assert!(registry.is_claimed(4));
        assert!(registry.claim(4).is_none());
        assert!(registry.claim(5).is_some());

        drop(claim);
        assert!(!registry.is_claimed(4));
        assert!(registry.claim(4).is_some());
    }

    #[tokio::test]
    async fn test_panicking_owner_gives_up_claim() {
        let registry = CheckRegistry::new();
        let claim = registry.claim(9).unwrap();
        let handle = tokio::spawn(async move {
            let _claim = claim;
            panic!("probe task crashed");
        });
        assert!(handle.await.is_err());
        assert!(registry.is_empty());
    }
}
