//! Background Tasks Module
//!
//! Contains background tasks that run periodically alongside the caches.
//!
//! # Tasks
//! - Reaper: removes expired entries from every registered cache at a fixed interval

mod reaper;

pub use reaper::ReaperPool;
