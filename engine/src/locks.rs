//! Keyed async mutexes
//!
//! Serializes writers per ingredient identity and per invoice. Keys are
//! plain strings; callers prefix them with the kind of resource they guard.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type Slots = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// Table of mutexes keyed by resource name. A slot exists only while some
/// task holds or waits for its key.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    slots: Slots,
}

/// Exclusive access to one key; releasing the last claim on a key removes
/// its slot from the table
#[derive(Debug)]
pub struct KeyGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: String,
    slots: Slots,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        // Release first so the owned guard no longer counts as a holder
        drop(self.guard.take());
        self.slots
            .remove_if(&self.key, |_, slot| Arc::strong_count(slot) == 1);
    }
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &str) -> Arc<Mutex<()>> {
        self.slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Wait for exclusive access to `key`
    pub async fn acquire(&self, key: &str) -> KeyGuard {
        let guard = self.slot(key).lock_owned().await;
        KeyGuard {
            guard: Some(guard),
            key: key.to_string(),
            slots: self.slots.clone(),
        }
    }

    /// Lock several keys at once. Keys are taken in sorted order so two
    /// callers locking overlapping sets cannot deadlock.
    pub async fn acquire_many<I, S>(&self, keys: I) -> Vec<KeyGuard>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut keys: Vec<String> = keys.into_iter().map(|k| k.as_ref().to_string()).collect();
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            guards.push(self.acquire(key).await);
        }
        guards
    }

    /// Number of keys currently held or awaited
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Lock key for an ingredient row
pub fn ingredient_key(id: &uuid::Uuid) -> String {
    format!("ingredient:{}", id)
}

/// Lock key for an invoice
pub fn invoice_key(invoice_number: &str) -> String {
    format!("invoice:{}", invoice_number)
}
