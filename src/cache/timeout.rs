//! Lock-timeout controller.
//!
//! The caller that starts a computation always waits for it. Any other caller
//! waits at most the lock timeout; when it elapses the shared computation keeps
//! running for future callers, and this caller runs the loader directly without
//! touching the cache.

use std::time::Duration;

use futures::future::BoxFuture;
use tokio::time;
use tracing::warn;

use super::keys::CacheKey;
use super::store::{LoadOutcome, LocalCache};

pub(crate) async fn get_with_timeout<L, G>(
    cache: &LocalCache,
    key: CacheKey,
    loader: L,
    fallback: G,
    lock_timeout: Duration,
) -> LoadOutcome
where
    L: FnOnce(CacheKey) -> BoxFuture<'static, LoadOutcome> + Send + 'static,
    G: FnOnce(CacheKey) -> BoxFuture<'static, LoadOutcome>,
{
    let lookup = cache.lookup(key.clone(), loader);
    if lock_timeout.is_zero() || lookup.is_origin() {
        return lookup.resolve().await;
    }

    match time::timeout(lock_timeout, lookup.resolve()).await {
        Ok(outcome) => outcome,
        Err(_elapsed) => {
            cache.metrics().lock_timeout();
            warn!(
                cache = cache.name(),
                key = %key,
                lock_timeout = ?lock_timeout,
                "lock timeout elapsed, loading value without caching it"
            );
            fallback(key).await
        }
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::io;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::time::{Instant, sleep};

    use super::*;
    use crate::cache::config::CacheTuning;
    use crate::cache::error::CacheError;

    fn slow_loader(
        calls: &Arc<AtomicUsize>,
        delay: Duration,
        value: &'static str,
    ) -> impl FnOnce(CacheKey) -> BoxFuture<'static, Result<Option<String>, Infallible>>
    + Clone
    + Send
    + 'static {
        use futures::FutureExt;

        let calls = Arc::clone(calls);
        move |_key| {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                sleep(delay).await;
                Ok(Some(value.to_string()))
            }
            .boxed()
        }
    }

    fn spawn_originator(
        cache: &Arc<LocalCache>,
        calls: &Arc<AtomicUsize>,
        delay: Duration,
    ) -> tokio::task::JoinHandle<Result<Option<String>, CacheError>> {
        let cache = Arc::clone(cache);
        let loader = slow_loader(calls, delay, "original");
        tokio::spawn(async move {
            cache
                .get_with_timeout(CacheKey::from("k"), loader, Duration::from_millis(10))
                .await
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn waiter_falls_back_to_direct_computation_after_timeout() {
        let cache = Arc::new(LocalCache::new("c", &CacheTuning::default()).expect("valid tuning"));
        let origin_calls = Arc::new(AtomicUsize::new(0));
        let originator = spawn_originator(&cache, &origin_calls, Duration::from_millis(500));
        sleep(Duration::from_millis(30)).await;

        let fallback_calls = Arc::new(AtomicUsize::new(0));
        let started = Instant::now();
        let fallback: Option<String> = cache
            .get_with_timeout(
                CacheKey::from("k"),
                slow_loader(&fallback_calls, Duration::ZERO, "fallback"),
                Duration::from_millis(50),
            )
            .await
            .expect("fallback value");
        let waited = started.elapsed();

        assert_eq!(fallback.as_deref(), Some("fallback"));
        assert!(waited < Duration::from_millis(400), "waited {waited:?}");
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 1);

        let original = originator
            .await
            .expect("task should not panic")
            .expect("original value");
        assert_eq!(original.as_deref(), Some("original"));
        assert_eq!(origin_calls.load(Ordering::SeqCst), 1);

        let cached: Option<String> = cache
            .get(
                CacheKey::from("k"),
                slow_loader(&fallback_calls, Duration::ZERO, "unused"),
            )
            .await
            .expect("cached value");
        assert_eq!(cached.as_deref(), Some("original"));
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn originator_is_never_timed_out() {
        let cache = Arc::new(LocalCache::new("c", &CacheTuning::default()).expect("valid tuning"));
        let calls = Arc::new(AtomicUsize::new(0));

        let value = spawn_originator(&cache, &calls, Duration::from_millis(100))
            .await
            .expect("task should not panic")
            .expect("original value");

        assert_eq!(value.as_deref(), Some("original"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.contains_key(&CacheKey::from("k")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn zero_timeout_waits_for_the_shared_computation() {
        let cache = Arc::new(LocalCache::new("c", &CacheTuning::default()).expect("valid tuning"));
        let calls = Arc::new(AtomicUsize::new(0));
        let originator = spawn_originator(&cache, &calls, Duration::from_millis(150));
        sleep(Duration::from_millis(30)).await;

        let waiter: Option<String> = cache
            .get_with_timeout(
                CacheKey::from("k"),
                slow_loader(&calls, Duration::ZERO, "unused"),
                Duration::ZERO,
            )
            .await
            .expect("shared value");

        assert_eq!(waiter.as_deref(), Some("original"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        originator.await.expect("task should not panic").expect("original value");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failure_within_window_propagates() {
        let cache = Arc::new(LocalCache::new("c", &CacheTuning::default()).expect("valid tuning"));
        let originator = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .get_with_timeout(
                        CacheKey::from("k"),
                        |_key| async {
                            sleep(Duration::from_millis(50)).await;
                            Err::<Option<String>, _>(io::Error::other("boom"))
                        },
                        Duration::from_millis(500),
                    )
                    .await
            })
        };
        sleep(Duration::from_millis(10)).await;

        let calls = Arc::new(AtomicUsize::new(0));
        let waiter = cache
            .get_with_timeout(
                CacheKey::from("k"),
                slow_loader(&calls, Duration::ZERO, "unused"),
                Duration::from_millis(500),
            )
            .await;

        assert!(matches!(waiter, Err(CacheError::Computation { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(originator.await.expect("task should not panic").is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn fallback_failure_propagates() {
        let cache = Arc::new(LocalCache::new("c", &CacheTuning::default()).expect("valid tuning"));
        let calls = Arc::new(AtomicUsize::new(0));
        let originator = spawn_originator(&cache, &calls, Duration::from_millis(300));
        sleep(Duration::from_millis(30)).await;

        let waiter = cache
            .get_with_timeout(
                CacheKey::from("k"),
                |_key| async { Err::<Option<String>, _>(io::Error::other("fallback failed")) },
                Duration::from_millis(20),
            )
            .await;

        let error = waiter.expect_err("fallback failure should propagate");
        assert_eq!(
            error.loader_failure().map(|failure| failure.to_string()),
            Some("fallback failed".to_string())
        );
        originator.await.expect("task should not panic").expect("original value");
    }
}
