//! Cache configuration.
//!
//! Controls whether caching is enabled, which backing store is used, and the
//! per-cache tuning forwarded to that store.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use super::error::CacheError;

/// Backing store type used when none is configured.
pub const DEFAULT_BACKEND: &str = "moka";

/// Longest expiry the backing store accepts.
pub const MAX_EXPIRY: Duration = Duration::from_secs(1000 * 365 * 24 * 60 * 60);

/// Backing store kinds a registry can build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    /// Bounded concurrent cache with size and time based eviction.
    Moka,
}

impl FromStr for CacheBackend {
    type Err = CacheError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "moka" => Ok(Self::Moka),
            other => Err(CacheError::configuration(format!(
                "unknown cache type: {other}"
            ))),
        }
    }
}

/// Optional tuning for one cache. Unset fields leave the backing store's
/// default behavior in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheTuning {
    pub initial_capacity: Option<usize>,
    pub maximum_size: Option<u64>,
    pub expire_after_write: Option<Duration>,
    pub expire_after_access: Option<Duration>,
    pub metrics_enabled: Option<bool>,
}

impl CacheTuning {
    /// Field-wise overlay: values set on `self` win over `defaults`.
    pub fn or(&self, defaults: &CacheTuning) -> CacheTuning {
        CacheTuning {
            initial_capacity: self.initial_capacity.or(defaults.initial_capacity),
            maximum_size: self.maximum_size.or(defaults.maximum_size),
            expire_after_write: self.expire_after_write.or(defaults.expire_after_write),
            expire_after_access: self.expire_after_access.or(defaults.expire_after_access),
            metrics_enabled: self.metrics_enabled.or(defaults.metrics_enabled),
        }
    }

    pub fn metrics_enabled(&self) -> bool {
        self.metrics_enabled.unwrap_or(false)
    }

    /// Reject values the backing store cannot honor.
    pub fn validate(&self, cache: &str) -> Result<(), CacheError> {
        for (field, expiry) in [
            ("expire_after_write", self.expire_after_write),
            ("expire_after_access", self.expire_after_access),
        ] {
            if expiry.is_some_and(|expiry| expiry > MAX_EXPIRY) {
                return Err(CacheError::configuration(format!(
                    "cache `{cache}`: {field} must not exceed {} seconds",
                    MAX_EXPIRY.as_secs()
                )));
            }
        }
        Ok(())
    }
}

/// Cache configuration consumed by [`CacheRegistry::from_config`].
///
/// [`CacheRegistry::from_config`]: super::CacheRegistry::from_config
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// When false every cache is a no-op cache that always runs its loader.
    pub enabled: bool,
    /// Backing store type name, see [`CacheBackend`].
    pub backend: String,
    /// Tuning applied to every cache unless overridden by name.
    pub defaults: CacheTuning,
    /// Per-cache overrides keyed by cache name.
    pub caches: BTreeMap<String, CacheTuning>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: DEFAULT_BACKEND.to_string(),
            defaults: CacheTuning::default(),
            caches: BTreeMap::new(),
        }
    }
}

impl CacheConfig {
    /// Resolve the effective tuning for `name`.
    pub fn tuning_for(&self, name: &str) -> CacheTuning {
        match self.caches.get(name) {
            Some(named) => named.or(&self.defaults),
            None => self.defaults.clone(),
        }
    }

    pub fn backend(&self) -> Result<CacheBackend, CacheError> {
        self.backend.parse()
    }
}
