//! Single-flight local cache store.
//!
//! Resolved values live in a bounded map that applies size and time based
//! eviction. Computations still running live in a separate in-flight map that
//! never expires or evicts, so a slow loader cannot be started twice for one
//! key. The in-flight entry for a missing key is installed atomically and shared
//! by every caller interested in the key. A successful computation stores its
//! value and retires its own in-flight entry; a failed one only retires the
//! entry, so the next caller starts fresh. Both steps check the entry identity,
//! so they never clobber a computation started after an invalidation.

use std::any::{Any, type_name};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, FutureExt, Shared};
use moka::sync::Cache as MokaCache;
use tracing::{debug, warn};

use super::config::CacheTuning;
use super::error::{BoxError, CacheError, LoaderFailure, LoaderPanic};
use super::keys::CacheKey;
use super::metrics::CacheMetrics;
use super::null::{Stored, from_storable, to_storable};
use super::timeout;

pub(crate) type AnyValue = Arc<dyn Any + Send + Sync>;
pub(crate) type LoadOutcome = Result<Stored<AnyValue>, LoaderFailure>;

type SharedLoad = Shared<BoxFuture<'static, LoadOutcome>>;

#[derive(Clone)]
struct InFlight {
    id: u64,
    load: SharedLoad,
}

enum Slot {
    Pending(SharedLoad),
    Ready(Stored<AnyValue>),
}

/// Result of a store lookup, resolved with a single `await`.
pub(crate) struct Lookup {
    originated: bool,
    slot: Slot,
}

impl Lookup {
    /// True when this lookup started the computation.
    pub(crate) fn is_origin(&self) -> bool {
        self.originated
    }

    pub(crate) async fn resolve(self) -> LoadOutcome {
        match self.slot {
            Slot::Ready(stored) => Ok(stored),
            Slot::Pending(load) => load.await,
        }
    }
}

/// In-process cache backed by a bounded concurrent map.
pub struct LocalCache {
    name: Arc<str>,
    tuning: CacheTuning,
    entries: MokaCache<CacheKey, Stored<AnyValue>>,
    in_flight: Arc<DashMap<CacheKey, InFlight>>,
    next_load_id: AtomicU64,
    metrics: CacheMetrics,
}

impl LocalCache {
    /// Create a cache; `tuning` is forwarded to the backing map.
    ///
    /// Fails with [`CacheError::Configuration`] when the tuning is outside what
    /// the backing map accepts.
    pub fn new(name: impl Into<String>, tuning: &CacheTuning) -> Result<Self, CacheError> {
        let name: Arc<str> = Arc::from(name.into());
        tuning.validate(&name)?;

        let mut builder = MokaCache::<CacheKey, Stored<AnyValue>>::builder().name(&name);
        if let Some(capacity) = tuning.initial_capacity {
            builder = builder.initial_capacity(capacity);
        }
        if let Some(maximum) = tuning.maximum_size {
            builder = builder.max_capacity(maximum);
        }
        if let Some(ttl) = tuning.expire_after_write {
            builder = builder.time_to_live(ttl);
        }
        if let Some(tti) = tuning.expire_after_access {
            builder = builder.time_to_idle(tti);
        }

        Ok(Self {
            metrics: CacheMetrics::new(&name, tuning.metrics_enabled()),
            name,
            tuning: tuning.clone(),
            entries: builder.build(),
            in_flight: Arc::new(DashMap::new()),
            next_load_id: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_key(&self) -> CacheKey {
        CacheKey::default_for(&self.name)
    }

    pub fn initial_capacity(&self) -> Option<usize> {
        self.tuning.initial_capacity
    }

    pub fn maximum_size(&self) -> Option<u64> {
        self.tuning.maximum_size
    }

    pub fn expire_after_write(&self) -> Option<Duration> {
        self.tuning.expire_after_write
    }

    pub fn expire_after_access(&self) -> Option<Duration> {
        self.tuning.expire_after_access
    }

    pub fn metrics_enabled(&self) -> bool {
        self.tuning.metrics_enabled()
    }

    /// Approximate number of entries, computations in flight included.
    pub fn entry_count(&self) -> u64 {
        self.entries.run_pending_tasks();
        let in_flight = u64::try_from(self.in_flight.len()).unwrap_or(u64::MAX);
        self.entries.entry_count().saturating_add(in_flight)
    }

    /// True if `key` has a resolved value or a computation in flight.
    pub fn contains_key(&self, key: &CacheKey) -> bool {
        self.in_flight.contains_key(key) || self.entries.contains_key(key)
    }

    /// Return the value for `key`, running `loader` if no caller has started
    /// computing it yet.
    ///
    /// A loader returning `Ok(None)` caches the absence of a value. A loader
    /// that panics is reported to every waiter as a failed computation.
    pub async fn get<T, F, Fut, E>(&self, key: CacheKey, loader: F) -> Result<Option<T>, CacheError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(CacheKey) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<T>, E>> + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        let outcome = self.lookup(key, erase_loader(loader)).resolve().await;
        decode(&self.name, outcome)
    }

    /// Like [`get`](Self::get), but a caller that did not start the
    /// computation waits at most `lock_timeout` before running `loader` itself
    /// without caching the result. A zero timeout waits indefinitely.
    pub async fn get_with_timeout<T, F, Fut, E>(
        &self,
        key: CacheKey,
        loader: F,
        lock_timeout: Duration,
    ) -> Result<Option<T>, CacheError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(CacheKey) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = Result<Option<T>, E>> + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        let fallback = loader.clone();
        let outcome = timeout::get_with_timeout(
            self,
            key,
            erase_loader(loader),
            erase_loader(fallback),
            lock_timeout,
        )
        .await;
        decode(&self.name, outcome)
    }

    pub fn invalidate(&self, key: &CacheKey) {
        debug!(cache = %self.name, key = %key, "invalidating cache entry");
        self.in_flight.remove(key);
        self.entries.invalidate(key);
    }

    pub fn invalidate_all(&self) {
        debug!(cache = %self.name, "invalidating all cache entries");
        self.in_flight.clear();
        self.entries.invalidate_all();
    }

    pub(crate) fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    /// Find the value or in-flight computation for `key`, starting one with
    /// `loader` when there is neither. The computation runs when first polled.
    pub(crate) fn lookup<L>(&self, key: CacheKey, loader: L) -> Lookup
    where
        L: FnOnce(CacheKey) -> BoxFuture<'static, LoadOutcome> + Send + 'static,
    {
        let (originated, slot) = match self.entries.get(&key) {
            Some(stored) => (false, Slot::Ready(stored)),
            None => self.join_or_start(&key, loader),
        };

        if originated {
            self.metrics.miss();
        } else {
            self.metrics.hit();
        }
        debug!(cache = %self.name, key = %key, originated, "cache lookup");

        Lookup { originated, slot }
    }

    fn join_or_start<L>(&self, key: &CacheKey, loader: L) -> (bool, Slot)
    where
        L: FnOnce(CacheKey) -> BoxFuture<'static, LoadOutcome> + Send + 'static,
    {
        match self.in_flight.entry(key.clone()) {
            Entry::Occupied(running) => (false, Slot::Pending(running.get().load.clone())),
            Entry::Vacant(vacant) => {
                // A computation may have stored its value and retired since the
                // value lookup; retiring needs this entry's lock.
                if let Some(stored) = self.entries.get(key) {
                    return (false, Slot::Ready(stored));
                }
                let id = self.next_load_id.fetch_add(1, Ordering::Relaxed);
                let load = self.load(id, key.clone(), loader);
                vacant.insert(InFlight {
                    id,
                    load: load.clone(),
                });
                (true, Slot::Pending(load))
            }
        }
    }

    fn load<L>(&self, id: u64, key: CacheKey, loader: L) -> SharedLoad
    where
        L: FnOnce(CacheKey) -> BoxFuture<'static, LoadOutcome> + Send + 'static,
    {
        let entries = self.entries.clone();
        let in_flight = Arc::clone(&self.in_flight);
        let metrics = self.metrics.clone();
        let name = Arc::clone(&self.name);

        async move {
            let outcome = match AssertUnwindSafe(loader(key.clone())).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(payload) => Err(Arc::new(LoaderPanic::from_payload(payload)) as LoaderFailure),
            };

            let retired = match in_flight.entry(key.clone()) {
                Entry::Occupied(running) if running.get().id == id => {
                    if let Ok(stored) = &outcome {
                        entries.insert(key.clone(), stored.clone());
                    }
                    running.remove();
                    true
                }
                _ => false,
            };

            match &outcome {
                Ok(_) => {
                    if retired {
                        metrics.put();
                    }
                }
                Err(error) => {
                    metrics.load_failure();
                    warn!(
                        cache = %name,
                        key = %key,
                        error = %error,
                        "cache value loader failed, entry evicted"
                    );
                }
            }

            outcome
        }
        .boxed()
        .shared()
    }
}

/// Adapt a typed loader to the store's type-erased form.
pub(crate) fn erase_loader<T, F, Fut, E>(
    loader: F,
) -> impl FnOnce(CacheKey) -> BoxFuture<'static, LoadOutcome> + Send + 'static
where
    T: Send + Sync + 'static,
    F: FnOnce(CacheKey) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Option<T>, E>> + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    move |key| {
        async move {
            match loader(key).await {
                Ok(value) => Ok(to_storable(value).map(|value| Arc::new(value) as AnyValue)),
                Err(error) => Err(into_failure(error)),
            }
        }
        .boxed()
    }
}

pub(crate) fn into_failure<E: Into<BoxError>>(error: E) -> LoaderFailure {
    let error: BoxError = error.into();
    LoaderFailure::from(error)
}

fn decode<T: Clone + 'static>(cache: &str, outcome: LoadOutcome) -> Result<Option<T>, CacheError> {
    let stored = outcome.map_err(|failure| CacheError::computation(cache, failure))?;
    match from_storable(stored) {
        None => Ok(None),
        Some(value) => (*value)
            .downcast_ref::<T>()
            .cloned()
            .map(Some)
            .ok_or_else(|| CacheError::value_type(cache, type_name::<T>())),
    }
}
