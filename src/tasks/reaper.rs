//! Reaper Pool
//!
//! Owns a registry of caches and runs one background task that periodically
//! removes expired entries from all of them.

use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{Cache, CacheOptions, Clock, SystemClock};
use crate::config::PoolConfig;
use crate::error::{CacheError, Result};

/// A cache the reaper can sweep without knowing its key and value types.
pub(crate) trait Sweep: Send + Sync {
    fn id(&self) -> u64;
    fn sweep(&self, now: Instant) -> usize;
}

impl<K, V> Sweep for Cache<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn id(&self) -> u64 {
        Cache::id(self)
    }

    fn sweep(&self, now: Instant) -> usize {
        self.sweep_expired(now)
    }
}

type Registry = Arc<Mutex<Vec<Arc<dyn Sweep>>>>;

fn lock_registry(registry: &Registry) -> MutexGuard<'_, Vec<Arc<dyn Sweep>>> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Runs one sweep pass over a snapshot of the registry.
///
/// `now` is captured once for the whole pass. The stop flag is checked
/// between caches: a cache that has started being swept is finished.
fn sweep_pass(registry: &Registry, clock: &dyn Clock, stop: &AtomicBool) -> usize {
    let members: Vec<Arc<dyn Sweep>> = lock_registry(registry).clone();
    let now = clock.now();

    let mut removed = 0;
    for cache in members {
        if stop.load(Ordering::Acquire) {
            break;
        }
        removed += cache.sweep(now);
    }
    removed
}

/// Shutdown signalling shared with the running task.
struct Signal {
    stop: AtomicBool,
    wake: Notify,
}

struct Worker {
    signal: Arc<Signal>,
    handle: JoinHandle<()>,
}

// == Reaper Pool ==
/// A set of caches swept on a fixed interval by a single tokio task.
///
/// # Example
/// ```ignore
/// let pool = ReaperPool::default();
/// let sessions: Cache<String, Session> =
///     pool.acquire(Some(Duration::from_secs(30)), CacheOptions::new());
/// pool.start()?;
/// // Later, during shutdown:
/// pool.stop().await;
/// ```
pub struct ReaperPool {
    config: PoolConfig,
    clock: Arc<dyn Clock>,
    registry: Registry,
    worker: Mutex<Option<Worker>>,
}

impl ReaperPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            registry: Arc::new(Mutex::new(Vec::new())),
            worker: Mutex::new(None),
        }
    }

    /// Replaces the clock used for sweep passes and handed to acquired caches.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn sweep_interval(&self) -> Duration {
        self.config.sweep_interval()
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // == Acquire ==
    /// Builds a cache with `lifetime` as its default lifetime and registers it
    /// for sweeping.
    ///
    /// The cache uses the pool's clock unless `options` names one.
    pub fn acquire<K, V>(&self, lifetime: Option<Duration>, mut options: CacheOptions<K, V>) -> Cache<K, V>
    where
        K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        options.default_lifetime = lifetime;
        if options.clock.is_none() {
            options.clock = Some(Arc::clone(&self.clock));
        }

        let cache = Cache::new(options);
        lock_registry(&self.registry).push(Arc::new(cache.clone()));
        debug!(cache_id = cache.id(), ?lifetime, "Cache registered with reaper pool");
        cache
    }

    // == Release ==
    /// Stops sweeping `cache`. Its entries are left as they are.
    pub fn release<K, V>(&self, cache: &Cache<K, V>) -> Result<()>
    where
        K: Eq + Hash + Clone + fmt::Debug,
        V: Clone,
    {
        let id = cache.id();
        let mut registry = lock_registry(&self.registry);
        match registry.iter().position(|member| member.id() == id) {
            Some(index) => {
                registry.remove(index);
                debug!(cache_id = id, "Cache released from reaper pool");
                Ok(())
            }
            None => {
                warn!(cache_id = id, "Release of a cache this pool does not hold");
                Err(CacheError::NotRegistered(id))
            }
        }
    }

    /// Number of caches currently registered.
    pub fn cache_count(&self) -> usize {
        lock_registry(&self.registry).len()
    }

    pub fn is_running(&self) -> bool {
        self.lock_worker().is_some()
    }

    // == Sweep Now ==
    /// Runs one sweep pass on the calling thread and returns how many
    /// entries were removed.
    pub fn sweep_now(&self) -> usize {
        sweep_pass(&self.registry, self.clock.as_ref(), &AtomicBool::new(false))
    }

    // == Start ==
    /// Spawns the sweep task on the current tokio runtime.
    ///
    /// Does nothing if the task is already running. Fails when called from
    /// outside a tokio runtime.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.lock_worker();
        if worker.is_some() {
            return Ok(());
        }

        let runtime = Handle::try_current().map_err(|e| CacheError::Runtime(e.to_string()))?;
        let signal = Arc::new(Signal {
            stop: AtomicBool::new(false),
            wake: Notify::new(),
        });
        let interval = self.config.sweep_interval();
        let registry = Arc::clone(&self.registry);
        let clock = Arc::clone(&self.clock);
        let task_signal = Arc::clone(&signal);

        let handle = runtime.spawn(async move {
            info!(
                "Starting reaper task with interval of {} ms",
                interval.as_millis()
            );

            loop {
                let removed = sweep_pass(&registry, clock.as_ref(), &task_signal.stop);

                if task_signal.stop.load(Ordering::Acquire) {
                    break;
                }

                if removed > 0 {
                    info!("Reaper sweep: removed {} expired entries", removed);
                } else {
                    debug!("Reaper sweep: no expired entries found");
                }

                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = task_signal.wake.notified() => {}
                }

                if task_signal.stop.load(Ordering::Acquire) {
                    break;
                }
            }

            info!("Reaper task stopped");
        });

        *worker = Some(Worker { signal, handle });
        Ok(())
    }

    // == Stop ==
    /// Signals the sweep task and waits for it to exit.
    ///
    /// A pass already sweeping a cache finishes that cache first. Does
    /// nothing if the task is not running; `start` may be called again
    /// afterwards.
    pub async fn stop(&self) {
        let worker = self.lock_worker().take();
        let Some(Worker { signal, handle }) = worker else {
            return;
        };

        signal.stop.store(true, Ordering::Release);
        signal.wake.notify_one();

        if let Err(e) = handle.await {
            warn!("Reaper task ended abnormally: {}", e);
        }
    }
}

impl Default for ReaperPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

impl Drop for ReaperPool {
    fn drop(&mut self) {
        let worker = self
            .worker
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(worker) = worker {
            worker.signal.stop.store(true, Ordering::Release);
            worker.signal.wake.notify_one();
        }
    }
}

impl fmt::Debug for ReaperPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaperPool")
            .field("config", &self.config)
            .field("caches", &self.cache_count())
            .field("running", &self.is_running())
            .finish()
    }
}
