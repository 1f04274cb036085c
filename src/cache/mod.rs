//! Named in-process caches with single-flight loading.
//!
//! - **Keys**: [`derive_key`] turns call-site values into a [`CacheKey`]
//! - **Store**: [`LocalCache`] runs the loader for a key once per wave of
//!   concurrent callers and shares the outcome
//! - **Lock timeout**: waiters that are not computing a value may give up after
//!   a bound and run the loader themselves, uncached
//! - **Registry**: [`CacheRegistry`] maps names to caches and is frozen once
//!   built
//!
//! ## Configuration
//!
//! Caches are built from the `cache` section of the settings file:
//!
//! ```toml
//! [cache]
//! enabled = true
//! backend = "moka"
//!
//! [cache.defaults]
//! maximum_size = 10000
//! expire_after_write_ms = 60000
//!
//! [cache.caches.users]
//! maximum_size = 500
//! metrics_enabled = true
//! ```

mod config;
mod error;
mod handle;
mod keys;
mod metrics;
mod noop;
mod null;
mod registry;
mod store;
mod timeout;

pub use config::{CacheBackend, CacheConfig, CacheTuning, DEFAULT_BACKEND, MAX_EXPIRY};
pub use error::{BoxError, CacheError, LoaderFailure, LoaderPanic};
pub use handle::{Cache, CacheKind};
pub use keys::{CacheKey, CompositeKey, KeyPart, derive_key};
pub use metrics::{
    METRIC_CACHE_HIT_TOTAL, METRIC_CACHE_LOAD_FAILURE_TOTAL, METRIC_CACHE_LOCK_TIMEOUT_TOTAL,
    METRIC_CACHE_MISS_TOTAL, METRIC_CACHE_PUT_TOTAL,
};
pub use noop::NoOpCache;
pub use null::{Stored, from_storable, to_storable};
pub use registry::{CacheRegistry, CacheRegistryBuilder};
pub use store::LocalCache;
