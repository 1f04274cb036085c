use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::config::CacheTuning;
use super::error::{BoxError, CacheError};
use super::keys::CacheKey;
use super::noop::NoOpCache;
use super::store::LocalCache;

/// Which implementation backs a [`Cache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Local,
    NoOp,
}

impl CacheKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::NoOp => "no-op",
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cheaply cloneable handle to a named cache.
#[derive(Clone)]
pub enum Cache {
    Local(Arc<LocalCache>),
    NoOp(Arc<NoOpCache>),
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .finish()
    }
}

impl Cache {
    pub fn local(name: impl Into<String>, tuning: &CacheTuning) -> Result<Self, CacheError> {
        LocalCache::new(name, tuning).map(|cache| Self::Local(Arc::new(cache)))
    }

    pub fn no_op(name: impl Into<String>) -> Self {
        Self::NoOp(Arc::new(NoOpCache::new(name)))
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Local(cache) => cache.name(),
            Self::NoOp(cache) => cache.name(),
        }
    }

    pub fn kind(&self) -> CacheKind {
        match self {
            Self::Local(_) => CacheKind::Local,
            Self::NoOp(_) => CacheKind::NoOp,
        }
    }

    /// Key used when a call site contributes no key material.
    pub fn default_key(&self) -> CacheKey {
        CacheKey::default_for(self.name())
    }

    /// Narrow to the local implementation for introspection.
    pub fn as_local(&self) -> Option<&LocalCache> {
        match self {
            Self::Local(cache) => Some(cache),
            Self::NoOp(_) => None,
        }
    }

    pub fn try_as_local(&self) -> Result<&LocalCache, CacheError> {
        self.as_local()
            .ok_or_else(|| CacheError::unsupported_kind(self.name(), CacheKind::Local.as_str()))
    }

    pub async fn get<T, F, Fut, E>(&self, key: CacheKey, loader: F) -> Result<Option<T>, CacheError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(CacheKey) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<T>, E>> + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        match self {
            Self::Local(cache) => cache.get(key, loader).await,
            Self::NoOp(cache) => cache.get(key, loader).await,
        }
    }

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
        match self {
            Self::Local(cache) => cache.get_with_timeout(key, loader, lock_timeout).await,
            Self::NoOp(cache) => cache.get(key, loader).await,
        }
    }

    pub fn invalidate(&self, key: &CacheKey) {
        match self {
            Self::Local(cache) => cache.invalidate(key),
            Self::NoOp(cache) => cache.invalidate(key),
        }
    }

    pub fn invalidate_all(&self) {
        match self {
            Self::Local(cache) => cache.invalidate_all(),
            Self::NoOp(cache) => cache.invalidate_all(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use super::*;

    #[test]
    fn narrowing_to_local() {
        let local = Cache::local("users", &CacheTuning::default()).expect("valid tuning");
        assert_eq!(local.kind(), CacheKind::Local);
        assert_eq!(local.as_local().map(LocalCache::name), Some("users"));
        assert!(local.try_as_local().is_ok());

        let noop = Cache::no_op("users");
        assert_eq!(noop.kind(), CacheKind::NoOp);
        assert!(noop.as_local().is_none());
        assert!(matches!(
            noop.try_as_local(),
            Err(CacheError::UnsupportedKind { ref name, expected: "local" }) if name == "users"
        ));
    }

    #[tokio::test]
    async fn clones_share_entries() {
        let cache = Cache::local("c", &CacheTuning::default()).expect("valid tuning");
        let clone = cache.clone();

        let _: Option<u32> = cache
            .get(CacheKey::from("k"), |_key| async { Ok::<_, Infallible>(Some(1_u32)) })
            .await
            .expect("first load");
        let value: Option<u32> = clone
            .get(CacheKey::from("k"), |_key| async { Ok::<_, Infallible>(Some(2_u32)) })
            .await
            .expect("shared entry");

        assert_eq!(value, Some(1));
        assert_eq!(format!("{cache:?}"), r#"Cache { name: "c", kind: Local }"#);
    }

    #[tokio::test]
    async fn no_op_ignores_lock_timeout() {
        let cache = Cache::no_op("c");
        let value: Option<u32> = cache
            .get_with_timeout(
                cache.default_key(),
                |_key| async { Ok::<_, Infallible>(Some(3_u32)) },
                Duration::from_millis(1),
            )
            .await
            .expect("loader value");
        assert_eq!(value, Some(3));
    }
}
