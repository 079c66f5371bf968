//! Run-wide deduplication index keyed by task key.
//!
//! The first task to claim a key owns it. Later claimants either reuse the
//! settled success or wait on the owner; if the owner fails or is abandoned
//! the key is released and a waiter takes over.

use crate::task::GenerationResult;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

/// What waiters observe about an in-flight key.
#[derive(Debug, Clone)]
pub enum Settled {
    Pending,
    Succeeded(Arc<GenerationResult>),
    /// Owner failed or was abandoned; claim again
    Released,
}

#[derive(Debug)]
enum Entry {
    InFlight(watch::Sender<Settled>),
    Done(Arc<GenerationResult>),
    /// Present in the artifact store from an earlier run
    Persisted,
}

/// Result of `DedupIndex::claim`.
#[derive(Debug)]
pub enum Claim {
    /// The caller must execute the task and settle the key
    Owner,
    /// Another task is executing the same key
    Wait(watch::Receiver<Settled>),
    /// Already produced; `None` when it came from the store
    Done(Option<Arc<GenerationResult>>),
}

#[derive(Debug, Default)]
pub struct DedupIndex {
    entries: Mutex<HashMap<String, Entry>>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark keys already present in the artifact store.
    pub fn preload(&self, keys: HashSet<String>) {
        let mut entries = self.lock();
        for key in keys {
            entries.entry(key).or_insert(Entry::Persisted);
        }
    }

    /// Atomically check the key and take ownership if nobody holds it.
    pub fn claim(&self, key: &str) -> Claim {
        let mut entries = self.lock();
        match entries.get(key) {
            Some(Entry::InFlight(sender)) => Claim::Wait(sender.subscribe()),
            Some(Entry::Done(result)) => Claim::Done(Some(Arc::clone(result))),
            Some(Entry::Persisted) => Claim::Done(None),
            None => {
                let (sender, _) = watch::channel(Settled::Pending);
                entries.insert(key.to_string(), Entry::InFlight(sender));
                Claim::Owner
            }
        }
    }

    /// Record the owner's success and wake waiters.
    pub fn succeed(&self, result: GenerationResult) {
        let result = Arc::new(result);
        let previous = self
            .lock()
            .insert(result.key.clone(), Entry::Done(Arc::clone(&result)));
        if let Some(Entry::InFlight(sender)) = previous {
            sender.send_replace(Settled::Succeeded(result));
        }
    }

    /// Drop ownership after a failure or abandonment so a waiter can retry.
    pub fn release(&self, key: &str) {
        let mut entries = self.lock();
        if matches!(entries.get(key), Some(Entry::InFlight(_))) {
            if let Some(Entry::InFlight(sender)) = entries.remove(key) {
                sender.send_replace(Settled::Released);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Wait until the key held by another task settles.
///
/// Returns `None` when the waiter should claim again.
pub async fn wait_settled(mut receiver: watch::Receiver<Settled>) -> Option<Arc<GenerationResult>> {
    let settled = receiver
        .wait_for(|s| !matches!(s, Settled::Pending))
        .await
        .map(|s| s.clone());
    match settled {
        Ok(Settled::Succeeded(result)) => Some(result),
        // Released, or the sender went away with its entry
        _ => None,
    }
}
