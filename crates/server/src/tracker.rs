//! In-flight render tracking.
//!
//! At most one render job per canonical URL is outstanding. Registration is
//! a single insert-if-absent on the map and only the caller that inserted
//! gets an [`InFlightGuard`], so only that caller submits the job.
//!
//! An entry leaves the map exactly once: either the job's guard is dropped
//! (completion, failure or panic) or the watchdog reaps it. Removal is keyed
//! on the job id, so a stale remover never evicts a newer job for the same URL.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{Notify, watch};

/// A registered render job, as seen by observers.
#[derive(Debug, Clone)]
pub struct InFlightJob {
    pub id: u64,
    pub started_at: Instant,
    done: watch::Receiver<bool>,
}

impl InFlightJob {
    /// Resolve once the job has finished, however it finished.
    pub async fn finished(&mut self) {
        // A dropped sender also means the job is gone.
        let _ = self.done.wait_for(|done| *done).await;
    }
}

/// Map of canonical URL to its outstanding render job.
#[derive(Debug, Default)]
pub struct InFlightTracker {
    jobs: DashMap<String, InFlightJob>,
    next_id: AtomicU64,
    registered: Notify,
}

impl InFlightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job for `key` unless one is already in flight.
    ///
    /// Returns `None` when another job owns the key.
    pub fn try_register(self: &Arc<Self>, key: &str) -> Option<InFlightGuard> {
        let (done_tx, done_rx) = watch::channel(false);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        match self.jobs.entry(key.to_string()) {
            Entry::Occupied(_) => return None,
            Entry::Vacant(slot) => {
                slot.insert(InFlightJob { id, started_at: Instant::now(), done: done_rx });
            }
        }
        self.registered.notify_waiters();

        Some(InFlightGuard { tracker: Arc::clone(self), key: key.to_string(), id, done: done_tx })
    }

    /// Remove the entry for `key` if it still belongs to job `id`.
    ///
    /// Returns whether this call removed it.
    pub fn remove(&self, key: &str, id: u64) -> bool {
        self.jobs.remove_if(key, |_, job| job.id == id).is_some()
    }

    /// Whether the entry for `key` still belongs to job `id`.
    ///
    /// False once the watchdog has reaped the job, even if a newer job has
    /// since registered the same key.
    pub fn owns(&self, key: &str, id: u64) -> bool {
        self.jobs.get(key).is_some_and(|job| job.id == id)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.jobs.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Copy of the current entries.
    pub fn snapshot(&self) -> Vec<(String, InFlightJob)> {
        self.jobs
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Wait until at least one job is registered.
    pub async fn wait_for_jobs(&self) {
        let registered = self.registered.notified();
        if !self.jobs.is_empty() {
            return;
        }
        registered.await;
    }
}

/// Ownership of one in-flight entry, held by the render job.
///
/// Dropping it removes the entry and signals completion to observers.
#[derive(Debug)]
pub struct InFlightGuard {
    tracker: Arc<InFlightTracker>,
    key: String,
    id: u64,
    done: watch::Sender<bool>,
}

impl InFlightGuard {
    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.tracker.remove(&self.key, self.id);
        self.done.send_replace(true);
    }
}
