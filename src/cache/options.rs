//! Cache Options Module
//!
//! Construction parameters for a [`Cache`](crate::cache::Cache).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::Clock;

pub(crate) type Factory<V> = Box<dyn Fn() -> V + Send + Sync>;
pub(crate) type EvictFn<K, V> = Box<dyn Fn(&K, &V) + Send + Sync>;

/// Builder for the per-cache options.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use ttl_cacher::cache::{Cache, CacheOptions};
///
/// let cache: Cache<String, Vec<u8>> = Cache::new(
///     CacheOptions::new()
///         .default_lifetime(Duration::from_secs(30))
///         .default_factory(Vec::new)
///         .auto_refresh_on_read(false),
/// );
/// assert!(cache.is_empty());
/// ```
pub struct CacheOptions<K, V> {
    pub(crate) default_lifetime: Option<Duration>,
    pub(crate) default_factory: Option<Factory<V>>,
    pub(crate) on_evict: Option<EvictFn<K, V>>,
    pub(crate) auto_refresh_on_read: bool,
    pub(crate) clock: Option<Arc<dyn Clock>>,
}

impl<K, V> CacheOptions<K, V> {
    pub fn new() -> Self {
        Self {
            default_lifetime: None,
            default_factory: None,
            on_evict: None,
            auto_refresh_on_read: true,
            clock: None,
        }
    }

    /// Lifetime given to entries stored without an explicit one.
    pub fn default_lifetime(mut self, lifetime: Duration) -> Self {
        self.default_lifetime = Some(lifetime);
        self
    }

    /// Materializes a value for a missing key on `get_or_default`/`raw`.
    pub fn default_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> V + Send + Sync + 'static,
    {
        self.default_factory = Some(Box::new(factory));
        self
    }

    /// Called once for each entry removed by delete, clear or the reaper.
    ///
    /// Runs with the cache lock released. Overwrites and `pop` do not call it.
    pub fn on_evict<F>(mut self, callback: F) -> Self
    where
        F: Fn(&K, &V) + Send + Sync + 'static,
    {
        self.on_evict = Some(Box::new(callback));
        self
    }

    /// Whether `get_or_default` pushes the deadline forward (default: true).
    pub fn auto_refresh_on_read(mut self, enabled: bool) -> Self {
        self.auto_refresh_on_read = enabled;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }
}

impl<K, V> Default for CacheOptions<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for CacheOptions<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheOptions")
            .field("default_lifetime", &self.default_lifetime)
            .field("default_factory", &self.default_factory.is_some())
            .field("on_evict", &self.on_evict.is_some())
            .field("auto_refresh_on_read", &self.auto_refresh_on_read)
            .finish()
    }
}
