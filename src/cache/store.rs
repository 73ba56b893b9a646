//! Cache Store Module
//!
//! Main cache engine: an ordered map of entries guarded by a per-cache lock,
//! with default lifetimes, default-value materialization and refresh-on-read.

use std::fmt;
use std::hash::Hash;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use tracing::error;

use crate::cache::entry::deadline_after;
use crate::cache::options::{EvictFn, Factory};
use crate::cache::{CacheOptions, CacheStats, Clock, Entry, SystemClock};
use crate::error::{CacheError, Result};

static NEXT_CACHE_ID: AtomicU64 = AtomicU64::new(1);

/// Everything guarded by the cache lock.
struct State<K, V> {
    entries: IndexMap<K, Entry<V>>,
    stats: CacheStats,
}

impl<K, V> State<K, V> {
    fn sync_len(&mut self) {
        let len = self.entries.len();
        self.stats.set_total_entries(len);
    }
}

struct Inner<K, V> {
    id: u64,
    state: Mutex<State<K, V>>,
    default_lifetime: Option<Duration>,
    default_factory: Option<Factory<V>>,
    on_evict: Option<EvictFn<K, V>>,
    auto_refresh_on_read: bool,
    clock: Arc<dyn Clock>,
}

// == Cache ==
/// A TTL cache handle. Clones share the same entries.
///
/// Entries are never purged on lookup. A stale entry stays readable until a
/// sweep (see [`ReaperPool`](crate::tasks::ReaperPool)) or an explicit
/// removal takes it out.
pub struct Cache<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for Cache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: Clone,
{
    // == Constructor ==
    /// Creates a standalone cache from the given options.
    ///
    /// Nothing sweeps a standalone cache; acquire it from a pool for that.
    pub fn new(options: CacheOptions<K, V>) -> Self {
        let clock = options
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        Self {
            inner: Arc::new(Inner {
                id: NEXT_CACHE_ID.fetch_add(1, Ordering::Relaxed),
                state: Mutex::new(State {
                    entries: IndexMap::new(),
                    stats: CacheStats::new(),
                }),
                default_lifetime: options.default_lifetime,
                default_factory: options.default_factory,
                on_evict: options.on_evict,
                auto_refresh_on_read: options.auto_refresh_on_read,
                clock,
            }),
        }
    }

    /// Creates a cache whose entries live for `lifetime` by default.
    pub fn with_lifetime(lifetime: Duration) -> Self {
        Self::new(CacheOptions::new().default_lifetime(lifetime))
    }

    /// Process-unique identity of this cache.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn default_lifetime(&self) -> Option<Duration> {
        self.inner.default_lifetime
    }

    fn lock(&self) -> MutexGuard<'_, State<K, V>> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn deadline_for(&self, lifetime: Option<Duration>) -> Option<Instant> {
        lifetime
            .or(self.inner.default_lifetime)
            .map(|lifetime| deadline_after(self.inner.clock.now(), lifetime))
    }

    fn notify_evicted(&self, key: &K, value: &V) {
        if let Some(on_evict) = &self.inner.on_evict {
            on_evict(key, value);
        }
    }

    // == Set ==
    /// Stores a value, replacing any existing entry for the key.
    ///
    /// The deadline is `now + lifetime`, falling back to the default
    /// lifetime. With neither, the entry has no deadline and counts as dead.
    /// Replacing an entry is not an eviction: `on_evict` is not called.
    pub fn set(&self, key: K, value: V, lifetime: Option<Duration>) {
        let entry = Entry::new(value, self.deadline_for(lifetime));
        let mut state = self.lock();
        state.entries.insert(key, entry);
        state.sync_len();
    }

    /// Stores a value with the default lifetime.
    pub fn insert(&self, key: K, value: V) {
        self.set(key, value, None);
    }

    // == Get ==
    /// Returns the stored value, stale or not.
    ///
    /// Never runs the default factory and never refreshes the deadline.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut state = self.lock();
        let value = state.entries.get(key).map(|entry| entry.value.clone());
        if value.is_some() {
            state.stats.record_hit();
        } else {
            state.stats.record_miss();
        }
        value
    }

    // == Get Or Default ==
    /// Keyed read with materialization and refresh-on-read.
    ///
    /// A missing key is filled from the default factory first. When
    /// refresh-on-read is enabled and a default lifetime is configured, the
    /// entry's deadline becomes `now + default_lifetime`.
    pub fn get_or_default(&self, key: &K) -> Result<V> {
        self.read_entry(key, true).map(Entry::into_value)
    }

    // == Raw ==
    /// Returns a copy of the entry wrapper, materializing a missing key but
    /// leaving the deadline untouched.
    pub fn raw(&self, key: &K) -> Result<Entry<V>> {
        self.read_entry(key, false)
    }

    /// Shared lookup for `get_or_default` and `raw`. Only a keyed read
    /// (`keyed == true`) refreshes the deadline and counts towards stats.
    fn read_entry(&self, key: &K, keyed: bool) -> Result<Entry<V>> {
        let refresh_by = if keyed && self.inner.auto_refresh_on_read {
            self.inner.default_lifetime
        } else {
            None
        };

        let mut state = self.lock();
        let State { entries, stats } = &mut *state;
        if let Some(entry) = entries.get_mut(key) {
            if let Some(by) = refresh_by {
                entry.extend(by, Some(self.inner.clock.now()));
            }
            if keyed {
                stats.record_hit();
            }
            return Ok(entry.clone());
        }
        if keyed {
            stats.record_miss();
        }
        drop(state);

        // The factory runs unlocked so it may read this cache itself
        let factory = self
            .inner
            .default_factory
            .as_ref()
            .ok_or_else(|| CacheError::key_not_found(key))?;
        let value = factory();
        let deadline = self.deadline_for(None);

        let mut state = self.lock();
        let entry = state
            .entries
            .entry(key.clone())
            .or_insert_with(|| Entry::new(value, deadline));
        if let Some(by) = refresh_by {
            entry.extend(by, Some(self.inner.clock.now()));
        }
        let entry = entry.clone();
        state.sync_len();
        Ok(entry)
    }

    // == Deadlines ==
    /// Overwrites the deadline of an existing entry.
    pub fn set_deadline(&self, key: &K, deadline: Instant) -> Result<()> {
        let mut state = self.lock();
        let entry = state
            .entries
            .get_mut(key)
            .ok_or_else(|| CacheError::key_not_found(key))?;
        entry.set_deadline(deadline);
        Ok(())
    }

    /// Sets the deadline of an existing entry to `now + additional`.
    ///
    /// `additional` falls back to the default lifetime; with neither the
    /// deadline is left as it was.
    pub fn update_deadline(&self, key: &K, additional: Option<Duration>) -> Result<()> {
        let now = self.inner.clock.now();
        let mut state = self.lock();
        let entry = state
            .entries
            .get_mut(key)
            .ok_or_else(|| CacheError::key_not_found(key))?;
        if let Some(by) = additional.or(self.inner.default_lifetime) {
            entry.extend(by, Some(now));
        }
        Ok(())
    }

    // == Delete ==
    /// Removes an entry and reports it to `on_evict`.
    pub fn delete(&self, key: &K) -> Result<()> {
        let (key, entry) = {
            let mut state = self.lock();
            let removed = state
                .entries
                .shift_remove_entry(key)
                .ok_or_else(|| CacheError::key_not_found(key))?;
            state.stats.record_evictions(1);
            state.sync_len();
            removed
        };
        self.notify_evicted(&key, &entry.value);
        Ok(())
    }

    /// Removes an entry without reporting it to `on_evict`.
    pub fn pop(&self, key: &K) -> Option<V> {
        let mut state = self.lock();
        let removed = state.entries.shift_remove(key);
        state.sync_len();
        removed.map(Entry::into_value)
    }

    // == Clear ==
    /// Empties the cache, reporting every entry to `on_evict`.
    pub fn clear(&self) {
        let drained: Vec<(K, Entry<V>)> = {
            let mut state = self.lock();
            let drained: Vec<_> = state.entries.drain(..).collect();
            state.stats.record_evictions(drained.len());
            state.sync_len();
            drained
        };
        for (key, entry) in &drained {
            self.notify_evicted(key, &entry.value);
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.lock().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    // == Iteration ==
    /// Snapshot of the keys in insertion order.
    pub fn keys(&self) -> Vec<K> {
        self.lock().entries.keys().cloned().collect()
    }

    /// Snapshot of the values in insertion order.
    pub fn values(&self) -> Vec<V> {
        self.lock()
            .entries
            .values()
            .map(|entry| entry.value.clone())
            .collect()
    }

    /// Snapshot of the key/value pairs in insertion order.
    pub fn items(&self) -> Vec<(K, V)> {
        self.lock()
            .entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect()
    }

    /// Runs `f` over a live view of the entries without copying them.
    ///
    /// The cache lock is held for the duration of `f`, so `f` must not call
    /// back into this cache.
    pub fn with_entries<R>(&self, f: impl FnOnce(&mut dyn Iterator<Item = (&K, &V)>) -> R) -> R {
        let state = self.lock();
        let mut iter = state.entries.iter().map(|(key, entry)| (key, &entry.value));
        f(&mut iter)
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStats {
        let mut state = self.lock();
        state.sync_len();
        state.stats.clone()
    }

    // == Sweep Expired ==
    /// Removes every entry dead at `now`, then reports each to `on_evict`.
    ///
    /// Detection and removal happen in one critical section, so a key is
    /// removed and reported at most once. A panicking callback is logged and
    /// does not stop the remaining notifications. Returns the number removed.
    pub(crate) fn sweep_expired(&self, now: Instant) -> usize {
        let expired: IndexMap<K, Entry<V>> = {
            let mut state = self.lock();
            if !state.entries.values().any(|entry| entry.is_dead(Some(now))) {
                return 0;
            }
            let (expired, alive): (IndexMap<_, _>, IndexMap<_, _>) =
                std::mem::take(&mut state.entries)
                    .into_iter()
                    .partition(|(_, entry)| entry.is_dead(Some(now)));
            state.entries = alive;
            state.stats.record_expirations(expired.len());
            state.sync_len();
            expired
        };

        if let Some(on_evict) = &self.inner.on_evict {
            for (key, entry) in &expired {
                let outcome = catch_unwind(AssertUnwindSafe(|| on_evict(key, &entry.value)));
                if outcome.is_err() {
                    error!(
                        cache_id = self.inner.id,
                        key = ?key,
                        "Eviction callback panicked during sweep"
                    );
                }
            }
        }
        expired.len()
    }
}

impl<K, V> Default for Cache<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: Clone,
{
    fn default() -> Self {
        Self::new(CacheOptions::default())
    }
}

impl<K, V> fmt::Debug for Cache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("id", &self.inner.id)
            .field("default_lifetime", &self.inner.default_lifetime)
            .field("auto_refresh_on_read", &self.inner.auto_refresh_on_read)
            .finish_non_exhaustive()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use std::sync::atomic::AtomicUsize;

    fn manual_cache(
        clock: &Arc<ManualClock>,
        options: CacheOptions<String, i32>,
    ) -> Cache<String, i32> {
        Cache::new(options.clock(clock.clone()))
    }

    fn key(s: &str) -> String {
        s.to_string()
    }

    #[test]
    fn test_store_new() {
        let cache: Cache<String, i32> = Cache::default();
        assert_eq!(cache.len(), 0);
        assert!(cache.is_empty());
        assert_eq!(cache.default_lifetime(), None);
    }

    #[test]
    fn test_caches_have_distinct_ids() {
        let a: Cache<String, i32> = Cache::default();
        let b: Cache<String, i32> = Cache::default();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id(), a.clone().id());
    }

    #[test]
    fn test_set_and_get_with_lifetime() {
        let clock = Arc::new(ManualClock::new());
        let cache = manual_cache(&clock, CacheOptions::new());

        cache.set(key("a"), 1, Some(Duration::from_secs(5)));

        assert_eq!(cache.get(&key("a")), Some(1));
        let entry = cache.raw(&key("a")).unwrap();
        assert_eq!(entry.deadline(), Some(clock.now() + Duration::from_secs(5)));
        assert!(!entry.is_dead(Some(clock.now())));
    }

    #[test]
    fn test_set_without_any_lifetime_is_dead_on_arrival() {
        let cache: Cache<String, i32> = Cache::default();
        cache.set(key("a"), 1, None);

        // Still readable; staleness only matters to a sweep
        assert_eq!(cache.get(&key("a")), Some(1));
        let entry = cache.raw(&key("a")).unwrap();
        assert_eq!(entry.deadline(), None);
        assert!(entry.is_dead(None));
    }

    #[test]
    fn test_explicit_lifetime_overrides_default() {
        let clock = Arc::new(ManualClock::new());
        let cache = manual_cache(
            &clock,
            CacheOptions::new().default_lifetime(Duration::from_secs(10)),
        );

        cache.set(key("a"), 1, Some(Duration::from_secs(3)));
        cache.insert(key("b"), 2);

        let t0 = clock.now();
        assert_eq!(cache.raw(&key("a")).unwrap().deadline(), Some(t0 + Duration::from_secs(3)));
        assert_eq!(cache.raw(&key("b")).unwrap().deadline(), Some(t0 + Duration::from_secs(10)));
    }

    #[test]
    fn test_get_nonexistent() {
        let cache: Cache<String, i32> = Cache::default();
        assert_eq!(cache.get(&key("missing")), None);
        assert!(!cache.contains(&key("missing")));
    }

    #[test]
    fn test_get_does_not_materialize_or_refresh() {
        let clock = Arc::new(ManualClock::new());
        let cache = manual_cache(
            &clock,
            CacheOptions::new()
                .default_lifetime(Duration::from_secs(10))
                .default_factory(|| 42),
        );

        assert_eq!(cache.get(&key("a")), None);
        assert!(!cache.contains(&key("a")));

        cache.insert(key("b"), 1);
        let t0 = clock.now();
        clock.advance(Duration::from_secs(4));
        cache.get(&key("b"));
        assert_eq!(cache.raw(&key("b")).unwrap().deadline(), Some(t0 + Duration::from_secs(10)));
    }

    #[test]
    fn test_get_or_default_materializes_from_factory() {
        let cache: Cache<String, Vec<i32>> = Cache::new(
            CacheOptions::new()
                .default_lifetime(Duration::from_secs(60))
                .default_factory(Vec::new),
        );

        assert_eq!(cache.get_or_default(&key("list")).unwrap(), Vec::<i32>::new());
        assert!(cache.contains(&key("list")));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_get_or_default_without_factory_fails() {
        let cache: Cache<String, i32> = Cache::default();
        let result = cache.get_or_default(&key("missing"));
        assert!(matches!(result, Err(CacheError::KeyNotFound(_))));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_factory_may_read_the_cache() {
        let cache: Cache<String, i32> = Cache::with_lifetime(Duration::from_secs(60));
        let seen = cache.clone();
        let cache_with_factory: Cache<String, i32> = Cache::new(
            CacheOptions::new()
                .default_lifetime(Duration::from_secs(60))
                .default_factory(move || seen.len() as i32),
        );
        cache.insert(key("x"), 1);

        assert_eq!(cache_with_factory.get_or_default(&key("n")).unwrap(), 1);
    }

    #[test]
    fn test_refresh_on_read_extends_from_read_time() {
        let clock = Arc::new(ManualClock::new());
        let cache = manual_cache(
            &clock,
            CacheOptions::new().default_lifetime(Duration::from_secs(10)),
        );
        let t0 = clock.now();
        cache.insert(key("k"), 7);

        assert_eq!(cache.get_or_default(&key("k")).unwrap(), 7);
        assert_eq!(cache.raw(&key("k")).unwrap().deadline(), Some(t0 + Duration::from_secs(10)));

        clock.advance(Duration::from_secs(5));
        cache.get_or_default(&key("k")).unwrap();
        assert_eq!(cache.raw(&key("k")).unwrap().deadline(), Some(t0 + Duration::from_secs(15)));
    }

    #[test]
    fn test_refresh_on_read_disabled() {
        let clock = Arc::new(ManualClock::new());
        let cache = manual_cache(
            &clock,
            CacheOptions::new()
                .default_lifetime(Duration::from_secs(10))
                .auto_refresh_on_read(false),
        );
        let t0 = clock.now();
        cache.insert(key("k"), 7);

        clock.advance(Duration::from_secs(5));
        cache.get_or_default(&key("k")).unwrap();
        assert_eq!(cache.raw(&key("k")).unwrap().deadline(), Some(t0 + Duration::from_secs(10)));
    }

    #[test]
    fn test_refresh_without_default_lifetime_is_noop() {
        let clock = Arc::new(ManualClock::new());
        let cache = manual_cache(&clock, CacheOptions::new());
        let deadline = clock.now() + Duration::from_secs(2);
        cache.set(key("k"), 1, Some(Duration::from_secs(2)));

        clock.advance(Duration::from_secs(1));
        cache.get_or_default(&key("k")).unwrap();
        assert_eq!(cache.raw(&key("k")).unwrap().deadline(), Some(deadline));
    }

    #[test]
    fn test_raw_materializes_without_refresh() {
        let clock = Arc::new(ManualClock::new());
        let cache = manual_cache(
            &clock,
            CacheOptions::new()
                .default_lifetime(Duration::from_secs(10))
                .default_factory(|| 5),
        );
        let t0 = clock.now();

        let entry = cache.raw(&key("fresh")).unwrap();
        assert_eq!(entry.value, 5);
        assert_eq!(entry.deadline(), Some(t0 + Duration::from_secs(10)));

        clock.advance(Duration::from_secs(3));
        let entry = cache.raw(&key("fresh")).unwrap();
        assert_eq!(entry.deadline(), Some(t0 + Duration::from_secs(10)));
    }

    #[test]
    fn test_set_deadline() {
        let clock = Arc::new(ManualClock::new());
        let cache = manual_cache(&clock, CacheOptions::new());
        cache.insert(key("k"), 1);

        let deadline = clock.now() + Duration::from_secs(100);
        cache.set_deadline(&key("k"), deadline).unwrap();
        assert_eq!(cache.raw(&key("k")).unwrap().deadline(), Some(deadline));

        let result = cache.set_deadline(&key("missing"), deadline);
        assert!(matches!(result, Err(CacheError::KeyNotFound(_))));
    }

    #[test]
    fn test_update_deadline() {
        let clock = Arc::new(ManualClock::new());
        let cache = manual_cache(
            &clock,
            CacheOptions::new().default_lifetime(Duration::from_secs(10)),
        );
        cache.insert(key("k"), 1);
        clock.advance(Duration::from_secs(2));
        let now = clock.now();

        cache.update_deadline(&key("k"), Some(Duration::from_secs(30))).unwrap();
        assert_eq!(cache.raw(&key("k")).unwrap().deadline(), Some(now + Duration::from_secs(30)));

        cache.update_deadline(&key("k"), None).unwrap();
        assert_eq!(cache.raw(&key("k")).unwrap().deadline(), Some(now + Duration::from_secs(10)));

        let result = cache.update_deadline(&key("missing"), None);
        assert!(matches!(result, Err(CacheError::KeyNotFound(_))));
    }

    #[test]
    fn test_update_deadline_without_any_lifetime_is_noop() {
        let cache: Cache<String, i32> = Cache::default();
        cache.insert(key("k"), 1);

        cache.update_deadline(&key("k"), None).unwrap();
        assert_eq!(cache.raw(&key("k")).unwrap().deadline(), None);
    }

    #[test]
    fn test_delete_invokes_on_evict_once() {
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let sink = evicted.clone();
        let cache: Cache<String, i32> = Cache::new(
            CacheOptions::new()
                .default_lifetime(Duration::from_secs(60))
                .on_evict(move |k: &String, v: &i32| sink.lock().unwrap().push((k.clone(), *v))),
        );

        cache.insert(key("a"), 1);
        cache.delete(&key("a")).unwrap();

        assert_eq!(cache.get(&key("a")), None);
        assert_eq!(*evicted.lock().unwrap(), vec![(key("a"), 1)]);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_delete_nonexistent() {
        let cache: Cache<String, i32> = Cache::default();
        let result = cache.delete(&key("missing"));
        assert!(matches!(result, Err(CacheError::KeyNotFound(_))));
    }

    #[test]
    fn test_overwrite_is_not_eviction() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let cache: Cache<String, i32> = Cache::new(CacheOptions::new().on_evict(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        cache.insert(key("a"), 1);
        cache.insert(key("a"), 2);

        assert_eq!(cache.get(&key("a")), Some(2));
        assert_eq!(cache.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_pop_skips_on_evict() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let cache: Cache<String, i32> = Cache::new(CacheOptions::new().on_evict(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        cache.insert(key("a"), 1);
        assert_eq!(cache.pop(&key("a")), Some(1));
        assert_eq!(cache.pop(&key("a")), None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_clear_notifies_every_entry() {
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let sink = evicted.clone();
        let cache: Cache<String, i32> = Cache::new(
            CacheOptions::new().on_evict(move |k: &String, _: &i32| sink.lock().unwrap().push(k.clone())),
        );

        cache.clear();
        assert!(evicted.lock().unwrap().is_empty());

        cache.insert(key("a"), 1);
        cache.insert(key("b"), 2);
        cache.clear();

        assert!(cache.is_empty());
        let mut seen = evicted.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec![key("a"), key("b")]);
    }

    #[test]
    fn test_on_evict_may_reenter_cache() {
        let cache: Cache<String, i32> = Cache::default();
        let mirror = cache.clone();
        let archive: Cache<String, i32> = Cache::new(CacheOptions::new().on_evict(move |k: &String, v: &i32| {
            mirror.insert(k.clone(), *v);
        }));

        archive.insert(key("a"), 1);
        archive.delete(&key("a")).unwrap();
        assert_eq!(cache.get(&key("a")), Some(1));
    }

    #[test]
    fn test_snapshots_preserve_insertion_order() {
        let cache: Cache<String, i32> = Cache::with_lifetime(Duration::from_secs(60));
        cache.insert(key("c"), 3);
        cache.insert(key("a"), 1);
        cache.insert(key("b"), 2);
        cache.insert(key("c"), 30);

        assert_eq!(cache.keys(), vec![key("c"), key("a"), key("b")]);
        assert_eq!(cache.values(), vec![30, 1, 2]);
        assert_eq!(cache.items(), vec![(key("c"), 30), (key("a"), 1), (key("b"), 2)]);

        cache.delete(&key("c")).unwrap();
        assert_eq!(cache.keys(), vec![key("a"), key("b")]);
    }

    #[test]
    fn test_with_entries_borrows_live_view() {
        let cache: Cache<String, i32> = Cache::with_lifetime(Duration::from_secs(60));
        cache.insert(key("a"), 1);
        cache.insert(key("b"), 2);

        let total: i32 = cache.with_entries(|entries| entries.map(|(_, v)| *v).sum());
        assert_eq!(total, 3);
    }

    #[test]
    fn test_sweep_expired_removes_only_dead_entries() {
        let clock = Arc::new(ManualClock::new());
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let sink = evicted.clone();
        let cache = manual_cache(
            &clock,
            CacheOptions::new()
                .on_evict(move |k: &String, _: &i32| sink.lock().unwrap().push(k.clone())),
        );

        cache.set(key("short"), 1, Some(Duration::from_secs(1)));
        cache.set(key("long"), 2, Some(Duration::from_secs(10)));
        cache.set(key("never"), 3, None);

        clock.advance(Duration::from_secs(2));
        let removed = cache.sweep_expired(clock.now());

        assert_eq!(removed, 2);
        assert_eq!(cache.keys(), vec![key("long")]);
        assert_eq!(*evicted.lock().unwrap(), vec![key("short"), key("never")]);

        let stats = cache.stats();
        assert_eq!(stats.expirations, 2);
        assert_eq!(stats.evictions, 0);
        assert_eq!(stats.total_entries, 1);
    }

    #[test]
    fn test_sweep_isolates_panicking_callback() {
        let clock = Arc::new(ManualClock::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let cache = manual_cache(
            &clock,
            CacheOptions::new().on_evict(move |k: &String, _: &i32| {
                counter.fetch_add(1, Ordering::SeqCst);
                if k == "bad" {
                    panic!("callback failure");
                }
            }),
        );

        cache.set(key("bad"), 1, Some(Duration::from_secs(1)));
        cache.set(key("good"), 2, Some(Duration::from_secs(1)));
        clock.advance(Duration::from_secs(2));

        assert_eq!(cache.sweep_expired(clock.now()), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_set_with_maximum_lifetime_does_not_panic() {
        let clock = Arc::new(ManualClock::new());
        let cache = manual_cache(&clock, CacheOptions::new());

        cache.set(key("forever"), 1, Some(Duration::MAX));

        let entry = cache.raw(&key("forever")).unwrap();
        assert!(entry.deadline().unwrap() > clock.now());
        clock.advance(Duration::from_secs(365 * 24 * 3600));
        assert!(!entry.is_dead(Some(clock.now())));
        assert_eq!(cache.sweep_expired(clock.now()), 0);
    }

    #[test]
    fn test_refresh_with_maximum_default_lifetime_does_not_panic() {
        let clock = Arc::new(ManualClock::new());
        let cache = manual_cache(
            &clock,
            CacheOptions::new()
                .default_lifetime(Duration::MAX)
                .default_factory(|| 9),
        );

        assert_eq!(cache.get_or_default(&key("k")).unwrap(), 9);
        cache.update_deadline(&key("k"), None).unwrap();
        assert!(!cache.raw(&key("k")).unwrap().is_dead(Some(clock.now())));
    }

    #[test]
    fn test_raw_leaves_read_stats_untouched() {
        let cache: Cache<String, i32> = Cache::with_lifetime(Duration::from_secs(60));
        cache.insert(key("k"), 1);

        cache.raw(&key("k")).unwrap();
        let _ = cache.raw(&key("missing"));

        let stats = cache.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_store_stats() {
        let cache: Cache<String, i32> = Cache::with_lifetime(Duration::from_secs(60));

        cache.insert(key("a"), 1);
        cache.get(&key("a")); // hit
        cache.get(&key("missing")); // miss
        let _ = cache.get_or_default(&key("missing")); // miss, no factory

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.total_entries, 1);
    }
}
