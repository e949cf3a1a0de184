//! Keyed model cache with at-most-one build in flight per key.
//!
//! Each key owns a slot with its own mutex and condition variable; the map
//! lock is only held to find or create a slot, so unrelated keys never
//! serialize on each other. Per slot:
//!
//! ```text
//! Absent ──reserve──► Building ──ok──► Ready ──expire/invalidate──► Absent
//!                        │
//!                        └──err──► Failed ──next fresh caller──► Absent
//! ```
//!
//! The slot lock covers only state transitions. The builder runs outside
//! it, and publishes only if its reservation is still the current one: an
//! invalidation or a liveness timeout in between revokes it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};

use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::fingerprint::Fingerprint;

/// Waiters re-check liveness at least this often.
const WAIT_SLICE: Duration = Duration::from_millis(50);

/// A successfully built value and when it was built.
#[derive(Debug)]
pub struct CacheEntry<T> {
    value: T,
    built_at: DateTime<Utc>,
    built: Instant,
    generation: u64,
}

impl<T> CacheEntry<T> {
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Wall-clock construction timestamp.
    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Build number, unique per cache.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.built)
    }
}

/// Result of a lookup.
#[derive(Debug)]
pub struct Lookup<T> {
    pub entry: Arc<CacheEntry<T>>,
    /// True when this caller did not run the builder itself.
    pub from_cache: bool,
}

impl<T> Lookup<T> {
    pub fn value(&self) -> &T {
        self.entry.value()
    }
}

impl<T> Clone for Lookup<T> {
    fn clone(&self) -> Self {
        Self {
            entry: Arc::clone(&self.entry),
            from_cache: self.from_cache,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub builds: u64,
    pub failures: u64,
    pub expirations: u64,
    pub timeouts: u64,
}

#[derive(Default)]
struct StatCounters {
    hits: AtomicU64,
    builds: AtomicU64,
    failures: AtomicU64,
    expirations: AtomicU64,
    timeouts: AtomicU64,
}

impl StatCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            builds: self.builds.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }
}

enum SlotState<T, E> {
    Absent,
    Building { generation: u64, started: Instant },
    Ready(Arc<CacheEntry<T>>),
    Failed { generation: u64, error: Arc<E> },
}

struct Slot<T, E> {
    state: Mutex<SlotState<T, E>>,
    changed: Condvar,
}

impl<T, E> Slot<T, E> {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Absent),
            changed: Condvar::new(),
        }
    }
}

/// Reverts a reservation to `Absent` if the builder unwinds.
struct AbortGuard<'a, T, E> {
    slot: &'a Slot<T, E>,
    key: &'a Fingerprint,
    generation: u64,
    armed: bool,
}

impl<T, E> Drop for AbortGuard<'_, T, E> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.slot.state.lock();
        if let SlotState::Building { generation, .. } = &*state {
            if *generation == self.generation {
                *state = SlotState::Absent;
            }
        }
        self.slot.changed.notify_all();
        tracing::warn!(key = %self.key.short(), "model build aborted; slot released");
    }
}

pub struct ModelCache<T, E> {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    slots: Mutex<HashMap<Fingerprint, Arc<Slot<T, E>>>>,
    next_generation: AtomicU64,
    reset_applied: AtomicBool,
    stats: StatCounters,
}

impl<T, E> ModelCache<T, E> {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            slots: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            reset_applied: AtomicBool::new(false),
            stats: StatCounters::default(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Cached value for `key`, building it with `build` when absent.
    ///
    /// Concurrent callers for one key run `build` at most once; the others
    /// wait for its outcome. Callers that waited on a failed build get the
    /// same error; the next caller to arrive afterwards builds again.
    pub fn get_or_build<F>(&self, key: &Fingerprint, build: F) -> CacheResult<Lookup<T>, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        if !self.config.enable {
            return self.build_uncached(key, build);
        }
        if self.config.eager_sweep {
            self.sweep_expired();
        }

        let slot = self.slot(key);
        let mut state = slot.state.lock();
        let mut waited_on: Option<u64> = None;

        let generation = loop {
            match &*state {
                SlotState::Ready(entry) => {
                    if self.is_expired(entry) {
                        StatCounters::bump(&self.stats.expirations);
                        tracing::warn!(key = %key.short(), "cache entry expired");
                        *state = SlotState::Absent;
                        continue;
                    }
                    StatCounters::bump(&self.stats.hits);
                    tracing::info!(key = %key.short(), "cache hit");
                    return Ok(Lookup {
                        entry: Arc::clone(entry),
                        from_cache: true,
                    });
                }
                SlotState::Failed { generation, error } => {
                    if waited_on == Some(*generation) {
                        return Err(CacheError::Build(Arc::clone(error)));
                    }
                    *state = SlotState::Absent;
                }
                SlotState::Building {
                    generation,
                    started,
                } => {
                    let elapsed = self.clock.now().saturating_duration_since(*started);
                    let timeout = self.config.build_timeout();
                    if elapsed >= timeout {
                        StatCounters::bump(&self.stats.timeouts);
                        tracing::warn!(key = %key.short(), ?elapsed, "model build exceeded liveness bound");
                        *state = SlotState::Absent;
                        slot.changed.notify_all();
                        return Err(CacheError::BuildTimeout {
                            key: key.clone(),
                            waited: elapsed,
                        });
                    }
                    waited_on = Some(*generation);
                    let slice = (timeout - elapsed).min(WAIT_SLICE);
                    slot.changed.wait_for(&mut state, slice);
                }
                SlotState::Absent => {
                    let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                    *state = SlotState::Building {
                        generation,
                        started: self.clock.now(),
                    };
                    break generation;
                }
            }
        };
        drop(state);
        self.run_build(key, &slot, generation, build)
    }

    fn run_build<F>(
        &self,
        key: &Fingerprint,
        slot: &Slot<T, E>,
        generation: u64,
        build: F,
    ) -> CacheResult<Lookup<T>, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        tracing::info!(key = %key.short(), generation, "cache miss; building");
        StatCounters::bump(&self.stats.builds);

        let mut guard = AbortGuard {
            slot,
            key,
            generation,
            armed: true,
        };
        let result = build();
        guard.armed = false;
        drop(guard);

        let mut state = slot.state.lock();
        let current = matches!(
            &*state,
            SlotState::Building { generation: g, .. } if *g == generation
        );
        let outcome = match result {
            Ok(value) => {
                let entry = Arc::new(self.entry(value, generation));
                if current {
                    *state = SlotState::Ready(Arc::clone(&entry));
                } else {
                    tracing::warn!(key = %key.short(), generation, "build revoked; result not published");
                }
                Ok(Lookup {
                    entry,
                    from_cache: false,
                })
            }
            Err(e) => {
                StatCounters::bump(&self.stats.failures);
                tracing::warn!(key = %key.short(), generation, "model build failed");
                let error = Arc::new(e);
                if current {
                    *state = SlotState::Failed {
                        generation,
                        error: Arc::clone(&error),
                    };
                }
                Err(CacheError::Build(error))
            }
        };
        slot.changed.notify_all();
        outcome
    }

    fn build_uncached<F>(&self, key: &Fingerprint, build: F) -> CacheResult<Lookup<T>, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        tracing::debug!(key = %key.short(), "cache disabled; building");
        StatCounters::bump(&self.stats.builds);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        match build() {
            Ok(value) => Ok(Lookup {
                entry: Arc::new(self.entry(value, generation)),
                from_cache: false,
            }),
            Err(e) => {
                StatCounters::bump(&self.stats.failures);
                Err(CacheError::Build(Arc::new(e)))
            }
        }
    }

    fn entry(&self, value: T, generation: u64) -> CacheEntry<T> {
        CacheEntry {
            value,
            built_at: self.clock.wall(),
            built: self.clock.now(),
            generation,
        }
    }

    fn slot(&self, key: &Fingerprint) -> Arc<Slot<T, E>> {
        let mut slots = self.slots.lock();
        Arc::clone(
            slots
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Slot::new())),
        )
    }

    fn is_expired(&self, entry: &CacheEntry<T>) -> bool {
        entry.age(self.clock.now()) > self.config.expiry()
    }

    /// Ready, unexpired entry for `key`, without building.
    pub fn peek(&self, key: &Fingerprint) -> Option<Arc<CacheEntry<T>>> {
        let slot = self.slots.lock().get(key).cloned()?;
        let state = slot.state.lock();
        match &*state {
            SlotState::Ready(entry) if !self.is_expired(entry) => Some(Arc::clone(entry)),
            _ => None,
        }
    }

    /// Number of ready entries (expired or not).
    pub fn len(&self) -> usize {
        let slots = self.slots.lock();
        slots
            .values()
            .filter(|slot| matches!(&*slot.state.lock(), SlotState::Ready(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Force `key` to `Absent`. A build in flight for it will not publish.
    ///
    /// Returns true if a ready entry was dropped.
    pub fn invalidate(&self, key: &Fingerprint) -> bool {
        let mut slots = self.slots.lock();
        let Some(slot) = slots.get(key) else {
            return false;
        };
        let dropped = Self::reset_slot(slot);
        if Self::is_idle(slot) {
            slots.remove(key);
        }
        tracing::warn!(key = %key.short(), dropped, "cache entry invalidated");
        dropped
    }

    /// Force every key to `Absent`; returns the number of ready entries dropped.
    pub fn invalidate_all(&self) -> usize {
        let mut slots = self.slots.lock();
        let dropped = slots.values().filter(|slot| Self::reset_slot(slot)).count();
        slots.retain(|_, slot| !Self::is_idle(slot));
        tracing::warn!(dropped, "cache invalidated");
        dropped
    }

    /// Empty slot that no caller holds; only the map keeps it alive.
    fn is_idle(slot: &Arc<Slot<T, E>>) -> bool {
        Arc::strong_count(slot) == 1 && matches!(&*slot.state.lock(), SlotState::Absent)
    }

    fn reset_slot(slot: &Slot<T, E>) -> bool {
        let mut state = slot.state.lock();
        let was_ready = matches!(&*state, SlotState::Ready(_));
        *state = SlotState::Absent;
        slot.changed.notify_all();
        was_ready
    }

    /// Apply `reset_cache` once per cache; later calls do nothing.
    ///
    /// Returns true if this call performed the reset.
    pub fn apply_startup_reset(&self) -> bool {
        if self.reset_applied.swap(true, Ordering::SeqCst) || !self.config.reset_cache {
            return false;
        }
        let dropped = self.invalidate_all();
        tracing::info!(dropped, "startup cache reset applied");
        true
    }

    /// Drop expired entries and idle empty slots; returns the number of
    /// expired entries dropped.
    pub fn sweep_expired(&self) -> usize {
        let mut slots = self.slots.lock();
        let mut expired = 0;
        for slot in slots.values() {
            let mut state = slot.state.lock();
            if let SlotState::Ready(entry) = &*state {
                if self.is_expired(entry) {
                    *state = SlotState::Absent;
                    expired += 1;
                }
            }
        }
        slots.retain(|_, slot| !Self::is_idle(slot));
        if expired > 0 {
            for _ in 0..expired {
                StatCounters::bump(&self.stats.expirations);
            }
            tracing::warn!(expired, "expired cache entries swept");
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn key(s: &str) -> Fingerprint {
        Fingerprint::from(s)
    }

    #[test]
    fn second_lookup_is_a_hit() {
        let cache: ModelCache<u32, String> = ModelCache::new(CacheConfig::default());
        let first = cache.get_or_build(&key("k"), || Ok(7)).unwrap();
        let second = cache
            .get_or_build(&key("k"), || Err("must not build".to_string()))
            .unwrap();
        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert!(Arc::ptr_eq(&first.entry, &second.entry));
        assert_eq!(first.entry.built_at(), second.entry.built_at());
        assert_eq!(cache.stats().builds, 1);
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn fresh_caller_retries_after_failure() {
        let cache: ModelCache<u32, String> = ModelCache::new(CacheConfig::default());
        let err = cache
            .get_or_build(&key("k"), || Err("boom".to_string()))
            .unwrap_err();
        assert_eq!(err.build_error().map(String::as_str), Some("boom"));
        assert!(!err.is_retryable());
        assert!(cache.peek(&key("k")).is_none());

        let ok = cache.get_or_build(&key("k"), || Ok(3)).unwrap();
        assert_eq!(*ok.value(), 3);
        assert_eq!(cache.stats().failures, 1);
        assert_eq!(cache.stats().builds, 2);
    }

    #[test]
    fn sweep_drops_expired_entries_and_idle_slots() {
        let clock = Arc::new(ManualClock::new());
        let config = CacheConfig {
            expiry_time: 10,
            ..CacheConfig::default()
        };
        let cache: ModelCache<u32, String> = ModelCache::with_clock(config, clock.clone());
        cache.get_or_build(&key("a"), || Ok(1)).unwrap();
        clock.advance(Duration::from_secs(6));
        cache.get_or_build(&key("b"), || Ok(2)).unwrap();
        clock.advance(Duration::from_secs(6));

        assert_eq!(cache.sweep_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.peek(&key("a")).is_none());
        assert!(cache.peek(&key("b")).is_some());
        assert_eq!(cache.slots.lock().len(), 1);
    }

    #[test]
    fn invalidation_drops_idle_slots() {
        let cache: ModelCache<u32, String> = ModelCache::new(CacheConfig::default());
        cache.get_or_build(&key("a"), || Ok(1)).unwrap();
        cache
            .get_or_build(&key("b"), || Err("boom".to_string()))
            .unwrap_err();
        cache.get_or_build(&key("c"), || Ok(3)).unwrap();
        assert_eq!(cache.slots.lock().len(), 3);

        assert!(cache.invalidate(&key("a")));
        assert!(!cache.slots.lock().contains_key(&key("a")));

        assert_eq!(cache.invalidate_all(), 1);
        assert!(cache.slots.lock().is_empty());
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidation_keeps_slots_still_in_use() {
        let cache: ModelCache<u32, String> = ModelCache::new(CacheConfig::default());
        cache.get_or_build(&key("a"), || Ok(1)).unwrap();
        let held = cache.slot(&key("a"));

        assert!(cache.invalidate(&key("a")));
        assert!(cache.slots.lock().contains_key(&key("a")));
        cache.invalidate_all();
        assert_eq!(cache.slots.lock().len(), 1);

        drop(held);
        cache.invalidate_all();
        assert!(cache.slots.lock().is_empty());
    }
}
