//! In-process ledger store with lazy expiry.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::{Duration, Instant};

use crate::ledger::{LedgerError, LedgerStore};

struct Slot {
    value: String,
    expires_at: Instant,
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Ledger backed by a concurrent map. Expired keys are dropped when next touched.
#[derive(Default)]
pub struct InMemoryLedger {
    entries: DashMap<String, Slot>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining lifetime of a live key.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|slot| slot.is_live(now))
            .map(|slot| slot.expires_at - now)
    }

    /// Drop every expired key.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, slot| slot.is_live(now));
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn get(&self, key: &str) -> Result<Option<String>, LedgerError> {
        let now = Instant::now();
        if let Some(slot) = self.entries.get(key) {
            if slot.is_live(now) {
                return Ok(Some(slot.value.clone()));
            }
        }
        self.entries.remove_if(key, |_, slot| !slot.is_live(now));
        Ok(None)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), LedgerError> {
        self.entries.insert(
            key.to_string(),
            Slot { value: value.to_string(), expires_at: Instant::now() + ttl },
        );
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, LedgerError> {
        let now = Instant::now();
        let slot = Slot { value: value.to_string(), expires_at: now + ttl };
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    Ok(false)
                } else {
                    occupied.insert(slot);
                    Ok(true)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(slot);
                Ok(true)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, LedgerError> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .map(|(_, slot)| slot.is_live(now))
            .unwrap_or(false))
    }

    async fn delete_if_eq(&self, key: &str, expected: &str) -> Result<bool, LedgerError> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove_if(key, |_, slot| slot.is_live(now) && slot.value == expected)
            .is_some())
    }
}
