//! ttl_cacher - An in-process generic TTL cache
//!
//! Caches hold values with absolute deadlines. A [`ReaperPool`] sweeps any
//! number of caches from one background task, removing expired entries and
//! reporting them to each cache's eviction callback.

pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{Cache, CacheOptions, CacheStats, Clock, Entry, KeyedCache, ManualClock, SystemClock};
pub use config::PoolConfig;
pub use error::{CacheError, Result};
pub use tasks::ReaperPool;
