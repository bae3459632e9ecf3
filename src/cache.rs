//! TTL response cache with per-key single flight.
//!
//! Stores already-serialized payloads. [`ResponseCache::get_or_compute`]
//! returns a fresh entry when one exists and otherwise runs the supplied
//! computation, storing its result. Concurrent misses on one key run the
//! computation once; the other callers wait and then read the stored entry.
//!
//! The entry map sits behind a synchronous lock that is never held across an
//! `.await`. Each key owns an async fill lock that serializes computation. A
//! slot whose fill lock is held is never removed from the map, so eviction,
//! clearing and sweeping cannot start a second computation for the same key.
//!
//! Memory is bounded two ways: storing beyond `max_entries` evicts expired
//! entries and then the oldest ones, and [`ResponseCache::spawn_sweeper`]
//! periodically drops expired entries nobody asked for again.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use strum_macros::{Display, IntoStaticStr};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Default number of resident entries.
pub const DEFAULT_MAX_ENTRIES: usize = 256;

// =============================================================================
// Types
// =============================================================================

/// Whether a lookup was served from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "UPPERCASE")]
pub enum CacheStatus {
    Hit,
    Miss,
}

/// Result of [`ResponseCache::get_or_compute`].
#[derive(Debug, Clone)]
pub struct CacheLookup {
    pub payload: Bytes,
    pub status: CacheStatus,
    /// Age of the returned entry; zero on a miss.
    pub age: Duration,
}

/// A stored payload.
#[derive(Debug)]
struct CacheEntry {
    payload: Bytes,
    created_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    fn is_fresh(&self, now: Instant) -> bool {
        self.age(now) < self.ttl
    }
}

/// Per-key state: the stored entry plus the lock serializing its computation.
#[derive(Debug, Default)]
struct Slot {
    entry: Mutex<Option<Arc<CacheEntry>>>,
    fill: Arc<AsyncMutex<()>>,
}

impl Slot {
    fn entry(&self) -> Option<Arc<CacheEntry>> {
        lock(&self.entry).clone()
    }

    fn fresh(&self, now: Instant) -> Option<Arc<CacheEntry>> {
        self.entry().filter(|e| e.is_fresh(now))
    }
}

/// Observability snapshot of one resident entry.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EntryStats {
    pub key: String,
    pub age_seconds: f64,
    pub ttl_seconds: f64,
    pub size_bytes: usize,
    pub expired: bool,
}

/// Observability snapshot of the whole cache.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub max_entries: usize,
    pub total_bytes: usize,
    pub entries: Vec<EntryStats>,
}

// =============================================================================
// Response Cache
// =============================================================================

struct Inner {
    slots: Mutex<HashMap<String, Arc<Slot>>>,
    max_entries: usize,
}

/// Shared TTL cache of serialized payloads. Cheap to clone.
#[derive(Clone)]
pub struct ResponseCache {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("max_entries", &self.inner.max_entries)
            .finish_non_exhaustive()
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl ResponseCache {
    /// Create a cache holding at most `max_entries` payloads (minimum 1).
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                slots: Mutex::new(HashMap::new()),
                max_entries: max_entries.max(1),
            }),
        }
    }

    pub fn max_entries(&self) -> usize {
        self.inner.max_entries
    }

    /// Return the fresh payload for `key`, or compute, store and return it.
    ///
    /// A failing computation stores nothing and its error is returned as is.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<CacheLookup, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Bytes, E>>,
    {
        let fill = loop {
            let slot = self.slot(key);
            if let Some(entry) = slot.fresh(Instant::now()) {
                return Ok(hit(&entry));
            }

            let held = Arc::clone(&slot.fill).lock_owned().await;
            let fill = FillGuard {
                cache: self,
                key,
                slot,
                lock: Some(held),
            };

            // Another caller may have filled the slot while we waited.
            if let Some(entry) = fill.slot.fresh(Instant::now()) {
                tracing::debug!(key, "Cache filled by concurrent request");
                return Ok(hit(&entry));
            }
            // A slot dropped from the map while we waited is stale; retry.
            if self.is_current(key, &fill.slot) {
                break fill;
            }
        };

        // Dropping `fill` on error or cancellation discards the empty slot.
        let started = Instant::now();
        let payload = compute().await?;

        let entry = Arc::new(CacheEntry {
            payload: payload.clone(),
            created_at: Instant::now(),
            ttl,
        });
        *lock(&fill.slot.entry) = Some(entry);
        self.store(key);

        tracing::debug!(
            key,
            bytes = payload.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Cache miss computed"
        );

        Ok(CacheLookup {
            payload,
            status: CacheStatus::Miss,
            age: Duration::ZERO,
        })
    }

    /// Remove the given keys, or every key when `None`.
    ///
    /// Returns the keys that held an entry. A key being computed keeps its
    /// slot and stores the result once the computation finishes.
    pub fn clear(&self, keys: Option<&[String]>) -> Vec<String> {
        let mut slots = lock(&self.inner.slots);
        let targets: Vec<String> = match keys {
            Some(keys) => keys.to_vec(),
            None => slots.keys().cloned().collect(),
        };

        let mut removed: Vec<String> = targets
            .into_iter()
            .filter(|key| vacate(&mut slots, key))
            .collect();
        drop(slots);
        removed.sort();
        removed.dedup();

        tracing::info!(count = removed.len(), "Cache cleared");
        removed
    }

    /// Snapshot of every resident entry. Does not evict.
    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let mut entries: Vec<EntryStats> = self
            .entries()
            .into_iter()
            .map(|(key, entry)| EntryStats {
                age_seconds: entry.age(now).as_secs_f64(),
                ttl_seconds: entry.ttl.as_secs_f64(),
                size_bytes: entry.payload.len(),
                expired: !entry.is_fresh(now),
                key,
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        CacheStats {
            total_entries: entries.len(),
            max_entries: self.inner.max_entries,
            total_bytes: entries.iter().map(|e| e.size_bytes).sum(),
            entries,
        }
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry and every idle empty slot.
    ///
    /// Returns how many slots were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut slots = lock(&self.inner.slots);
        let before = slots.len();
        slots.retain(|_, slot| is_busy(slot) || slot.fresh(now).is_some());
        before - slots.len()
    }

    /// Run [`Self::sweep_expired`] every `interval` on the current runtime.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = cache.sweep_expired();
                if removed > 0 {
                    tracing::debug!(removed, "Swept expired cache entries");
                }
            }
        })
    }

    fn slot(&self, key: &str) -> Arc<Slot> {
        let mut slots = lock(&self.inner.slots);
        Arc::clone(slots.entry(key.to_string()).or_default())
    }

    fn entries(&self) -> Vec<(String, Arc<CacheEntry>)> {
        lock(&self.inner.slots)
            .iter()
            .filter_map(|(key, slot)| slot.entry().map(|e| (key.clone(), e)))
            .collect()
    }

    fn is_current(&self, key: &str, slot: &Arc<Slot>) -> bool {
        lock(&self.inner.slots)
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
    }

    /// Enforce the capacity bound after `key` was filled.
    fn store(&self, key: &str) {
        let mut slots = lock(&self.inner.slots);
        let filled = slots.values().filter(|s| s.entry().is_some()).count();
        if filled <= self.inner.max_entries {
            return;
        }

        let now = Instant::now();
        let mut candidates: Vec<(bool, Instant, String)> = slots
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .filter_map(|(k, s)| {
                s.entry()
                    .map(|e| (e.is_fresh(now), e.created_at, k.clone()))
            })
            .collect();
        // Expired first, then oldest.
        candidates.sort();

        let excess = filled - self.inner.max_entries;
        for (_, _, evicted) in candidates.into_iter().take(excess) {
            vacate(&mut slots, &evicted);
            tracing::debug!(key = %evicted, "Cache entry evicted");
        }
    }

    fn discard_if_empty(&self, key: &str, slot: &Arc<Slot>) {
        let mut slots = lock(&self.inner.slots);
        if let Some(current) = slots.get(key)
            && Arc::ptr_eq(current, slot)
            && slot.entry().is_none()
            && !is_busy(slot)
        {
            slots.remove(key);
        }
    }
}

/// Exclusive right to compute one key.
///
/// Dropped without a stored entry (error or cancellation), it removes the
/// empty slot once the fill lock is released.
struct FillGuard<'a> {
    cache: &'a ResponseCache,
    key: &'a str,
    slot: Arc<Slot>,
    lock: Option<OwnedMutexGuard<()>>,
}

impl Drop for FillGuard<'_> {
    fn drop(&mut self) {
        drop(self.lock.take());
        self.cache.discard_if_empty(self.key, &self.slot);
    }
}

/// Drop the entry under `key`. Busy slots stay in the map so their fill lock
/// keeps serializing the key. Returns whether an entry was dropped.
fn vacate(slots: &mut HashMap<String, Arc<Slot>>, key: &str) -> bool {
    let (had_entry, busy) = match slots.get(key) {
        Some(slot) => (lock(&slot.entry).take().is_some(), is_busy(slot)),
        None => return false,
    };
    if !busy {
        slots.remove(key);
    }
    had_entry
}

fn hit(entry: &CacheEntry) -> CacheLookup {
    CacheLookup {
        payload: entry.payload.clone(),
        status: CacheStatus::Hit,
        age: entry.age(Instant::now()),
    }
}

/// Whether a computation holds the slot's fill lock.
fn is_busy(slot: &Slot) -> bool {
    slot.fill.try_lock().is_err()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
