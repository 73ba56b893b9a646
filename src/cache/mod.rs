//! Cache Module
//!
//! Provides a generic in-memory cache with per-entry deadlines, default
//! lifetimes, default-value factories and eviction callbacks.

mod clock;
mod entry;
mod options;
mod stats;
mod store;
mod traits;


// Re-export public types
pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::Entry;
pub use options::CacheOptions;
pub use stats::CacheStats;
pub use store::Cache;
pub use traits::KeyedCache;
