//! Keyed access trait
//!
//! The map-like surface shared by every cache flavour, so callers can be
//! written against the interface rather than a concrete cache type.

use std::fmt::Debug;
use std::hash::Hash;
use std::time::Duration;

use crate::cache::Cache;
use crate::error::Result;

pub trait KeyedCache<K, V> {
    fn set(&self, key: K, value: V, lifetime: Option<Duration>);
    fn get(&self, key: &K) -> Option<V>;
    fn delete(&self, key: &K) -> Result<()>;
    fn contains(&self, key: &K) -> bool;
    fn items(&self) -> Vec<(K, V)>;
    fn values(&self) -> Vec<V>;
}

impl<K, V> KeyedCache<K, V> for Cache<K, V>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    fn set(&self, key: K, value: V, lifetime: Option<Duration>) {
        Cache::set(self, key, value, lifetime)
    }

    fn get(&self, key: &K) -> Option<V> {
        Cache::get(self, key)
    }

    fn delete(&self, key: &K) -> Result<()> {
        Cache::delete(self, key)
    }

    fn contains(&self, key: &K) -> bool {
        Cache::contains(self, key)
    }

    fn items(&self) -> Vec<(K, V)> {
        Cache::items(self)
    }

    fn values(&self) -> Vec<V> {
        Cache::values(self)
    }
}
