//! Cache used when caching is disabled: every lookup runs its loader.

use std::future::Future;

use tracing::trace;

use super::error::{BoxError, CacheError};
use super::keys::CacheKey;
use super::store::into_failure;

/// Pass-through cache. Stores nothing, so invalidation has nothing to do.
#[derive(Debug, Clone)]
pub struct NoOpCache {
    name: String,
}

impl NoOpCache {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_key(&self) -> CacheKey {
        CacheKey::default_for(&self.name)
    }

    pub async fn get<T, F, Fut, E>(&self, key: CacheKey, loader: F) -> Result<Option<T>, CacheError>
    where
        F: FnOnce(CacheKey) -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
        E: Into<BoxError>,
    {
        trace!(cache = %self.name, key = %key, "caching disabled, running loader");
        loader(key)
            .await
            .map_err(|error| CacheError::computation(self.name.as_str(), into_failure(error)))
    }

    pub fn invalidate(&self, _key: &CacheKey) {}

    pub fn invalidate_all(&self) {}
}
