//! Per-cache metric emission through the `metrics` facade.

use metrics::counter;

pub const METRIC_CACHE_HIT_TOTAL: &str = "cache_aside_hit_total";
pub const METRIC_CACHE_MISS_TOTAL: &str = "cache_aside_miss_total";
pub const METRIC_CACHE_PUT_TOTAL: &str = "cache_aside_put_total";
pub const METRIC_CACHE_LOAD_FAILURE_TOTAL: &str = "cache_aside_load_failure_total";
pub const METRIC_CACHE_LOCK_TIMEOUT_TOTAL: &str = "cache_aside_lock_timeout_total";

/// Counter handle for one named cache. Emits nothing when disabled.
#[derive(Debug, Clone)]
pub(crate) struct CacheMetrics {
    cache: Option<String>,
}

impl CacheMetrics {
    pub(crate) fn new(cache: &str, enabled: bool) -> Self {
        Self {
            cache: enabled.then(|| cache.to_string()),
        }
    }

    pub(crate) fn hit(&self) {
        self.increment(METRIC_CACHE_HIT_TOTAL);
    }

    pub(crate) fn miss(&self) {
        self.increment(METRIC_CACHE_MISS_TOTAL);
    }

    pub(crate) fn put(&self) {
        self.increment(METRIC_CACHE_PUT_TOTAL);
    }

    pub(crate) fn load_failure(&self) {
        self.increment(METRIC_CACHE_LOAD_FAILURE_TOTAL);
    }

    pub(crate) fn lock_timeout(&self) {
        self.increment(METRIC_CACHE_LOCK_TIMEOUT_TOTAL);
    }

    fn increment(&self, name: &'static str) {
        if let Some(cache) = &self.cache {
            counter!(name, "cache" => cache.clone()).increment(1);
        }
    }
}
