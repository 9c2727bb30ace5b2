//! Idle runner reaper.
//!
//! Every tracked runner service gets one watch task. The task wakes up on a
//! fixed interval and deletes the service once nothing has refreshed it for
//! the configured TTL. A failed delete is retried on the next tick; the
//! entry is dropped only after the backend confirms the service is gone.
//!
//! The tracking map is the only shared state. Its lock is never held across
//! a backend call.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use runner_fleet::FleetClient;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy)]
struct Tracked {
    last_seen: Instant,
    /// Identifies the watch task that owns this entry.
    generation: u64,
}

#[derive(Default)]
struct Entries {
    by_service: HashMap<String, Tracked>,
    next_generation: u64,
}

struct ReaperInner {
    fleet: Arc<dyn FleetClient>,
    ttl: Duration,
    poll_interval: Duration,
    entries: Mutex<Entries>,
    active_watchers: AtomicUsize,
}

impl ReaperInner {
    fn entries(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Deletes runner services that stayed idle past their TTL.
#[derive(Clone)]
pub struct Reaper {
    inner: Arc<ReaperInner>,
}

impl Reaper {
    pub fn new(fleet: Arc<dyn FleetClient>, ttl: Duration, poll_interval: Duration) -> Self {
        Self {
            inner: Arc::new(ReaperInner {
                fleet,
                ttl,
                poll_interval,
                entries: Mutex::new(Entries::default()),
                active_watchers: AtomicUsize::new(0),
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Mark `service_id` as active now.
    ///
    /// Starts a watch task if the service is not tracked yet. Must be called
    /// from within a Tokio runtime.
    pub fn track(&self, service_id: &str) {
        let now = Instant::now();
        let mut guard = self.inner.entries();
        let entries = &mut *guard;
        let generation = entries.next_generation;

        match entries.by_service.entry(service_id.to_string()) {
            Entry::Occupied(mut tracked) => {
                tracked.get_mut().last_seen = now;
                debug!(service_id, "Refreshed runner TTL");
            }
            Entry::Vacant(slot) => {
                slot.insert(Tracked {
                    last_seen: now,
                    generation,
                });
                entries.next_generation += 1;

                // Insert and spawn under one lock: one watcher per entry.
                self.inner.active_watchers.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(watch(
                    Arc::clone(&self.inner),
                    service_id.to_string(),
                    generation,
                ));
                debug!(service_id, generation, "Started watching runner");
            }
        }
    }

    /// Stop tracking `service_id`. Its watch task exits on its next tick.
    pub fn forget(&self, service_id: &str) -> bool {
        self.inner.entries().by_service.remove(service_id).is_some()
    }

    pub fn is_tracked(&self, service_id: &str) -> bool {
        self.inner.entries().by_service.contains_key(service_id)
    }

    /// When `service_id` was last marked active.
    pub fn last_seen(&self, service_id: &str) -> Option<Instant> {
        self.inner
            .entries()
            .by_service
            .get(service_id)
            .map(|tracked| tracked.last_seen)
    }

    pub fn tracked_count(&self) -> usize {
        self.inner.entries().by_service.len()
    }

    /// Number of watch tasks currently running.
    ///
    /// A task whose entry was forgotten keeps counting until its next tick.
    pub fn active_watchers(&self) -> usize {
        self.inner.active_watchers.load(Ordering::SeqCst)
    }
}

/// Decrements the watcher count when a watch task ends, however it ends.
struct WatcherGuard(Arc<ReaperInner>);

impl Drop for WatcherGuard {
    fn drop(&mut self) {
        self.0.active_watchers.fetch_sub(1, Ordering::SeqCst);
    }
}

#[instrument(skip(inner))]
async fn watch(inner: Arc<ReaperInner>, service_id: String, generation: u64) {
    let _guard = WatcherGuard(Arc::clone(&inner));

    loop {
        tokio::time::sleep(inner.poll_interval).await;

        let last_seen = match inner.entries().by_service.get(&service_id) {
            Some(tracked) if tracked.generation == generation => tracked.last_seen,
            _ => {
                debug!("Runner no longer tracked, stopping watch");
                return;
            }
        };

        if last_seen.elapsed() < inner.ttl {
            continue;
        }

        info!(ttl_secs = inner.ttl.as_secs(), "TTL reached for runner, removing it");
        match inner.fleet.delete_service(&service_id).await {
            Ok(true) => info!("Runner deleted"),
            Ok(false) => info!("Runner was already deleted, skip"),
            Err(e) => {
                warn!(error = %e, "Failed to delete runner, will retry");
                continue;
            }
        }

        let mut entries = inner.entries();
        if entries
            .by_service
            .get(&service_id)
            .is_some_and(|tracked| tracked.generation == generation)
        {
            entries.by_service.remove(&service_id);
        }
        return;
    }
}
