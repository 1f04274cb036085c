//! Build-once cache registry.
//!
//! Caches are registered on a [`CacheRegistryBuilder`] during setup; `build`
//! freezes the set into a [`CacheRegistry`] that only supports reads.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::config::{CacheBackend, CacheConfig};
use super::error::{BoxError, CacheError};
use super::handle::Cache;
use super::keys::CacheKey;

#[derive(Debug, Default)]
pub struct CacheRegistryBuilder {
    caches: BTreeMap<String, Cache>,
}

impl CacheRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `cache` under its own name. Each name may be registered once.
    pub fn register(&mut self, cache: Cache) -> Result<&mut Self, CacheError> {
        let name = cache.name().to_string();
        if name.is_empty() {
            return Err(CacheError::configuration("cache name must not be empty"));
        }
        if self.caches.contains_key(&name) {
            return Err(CacheError::configuration(format!(
                "cache `{name}` already set"
            )));
        }
        self.caches.insert(name, cache);
        Ok(self)
    }

    pub fn build(self) -> CacheRegistry {
        CacheRegistry {
            caches: Arc::new(self.caches),
        }
    }
}

/// Read-only mapping from cache name to cache. Clones share the same caches.
#[derive(Debug, Clone, Default)]
pub struct CacheRegistry {
    caches: Arc<BTreeMap<String, Cache>>,
}

impl CacheRegistry {
    pub fn builder() -> CacheRegistryBuilder {
        CacheRegistryBuilder::new()
    }

    /// Build one cache per name in `names` as described by `config`.
    ///
    /// Disabled caching yields pass-through caches. Tuning entries for names
    /// that are not in `names` are ignored.
    pub fn from_config<I, S>(names: I, config: &CacheConfig) -> Result<Self, CacheError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        let backend = config.backend()?;

        for configured in config.caches.keys() {
            if !names.contains(configured) {
                warn!(cache = %configured, "ignoring configuration for unregistered cache");
            }
        }

        let mut builder = Self::builder();
        for name in names {
            let cache = if !config.enabled {
                Cache::no_op(name)
            } else {
                match backend {
                    CacheBackend::Moka => {
                        let tuning = config.tuning_for(&name);
                        Cache::local(name, &tuning)?
                    }
                }
            };
            builder.register(cache)?;
        }

        let registry = builder.build();
        info!(
            enabled = config.enabled,
            backend = ?backend,
            caches = registry.len(),
            "cache registry built"
        );
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<&Cache> {
        self.caches.get(name)
    }

    fn require(&self, name: &str) -> Result<&Cache, CacheError> {
        self.get(name).ok_or_else(|| CacheError::unknown_cache(name))
    }

    /// Registered names in ascending order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.caches.keys().map(String::as_str)
    }

    pub fn cache_names(&self) -> BTreeSet<&str> {
        self.names().collect()
    }

    pub fn len(&self) -> usize {
        self.caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }

    /// Look up `key` in the named cache, computing it with `loader` on a miss.
    /// See [`Cache::get_with_timeout`] for the meaning of `lock_timeout`.
    pub async fn get_or_compute<T, F, Fut, E>(
        &self,
        cache_name: &str,
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
        self.require(cache_name)?
            .get_with_timeout(key, loader, lock_timeout)
            .await
    }

    pub fn invalidate(&self, cache_name: &str, key: &CacheKey) -> Result<(), CacheError> {
        self.require(cache_name)?.invalidate(key);
        Ok(())
    }

    pub fn invalidate_all(&self, cache_name: &str) -> Result<(), CacheError> {
        self.require(cache_name)?.invalidate_all();
        Ok(())
    }
}
