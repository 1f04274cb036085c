use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::{
    METRIC_CACHE_HIT_TOTAL, METRIC_CACHE_LOAD_FAILURE_TOTAL, METRIC_CACHE_LOCK_TIMEOUT_TOTAL,
    METRIC_CACHE_MISS_TOTAL, METRIC_CACHE_PUT_TOTAL,
};
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// Register descriptions for the cache counters with the installed recorder.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_CACHE_HIT_TOTAL,
            Unit::Count,
            "Lookups that found a cached value or an in-flight computation."
        );
        describe_counter!(
            METRIC_CACHE_MISS_TOTAL,
            Unit::Count,
            "Lookups that started a new computation."
        );
        describe_counter!(
            METRIC_CACHE_PUT_TOTAL,
            Unit::Count,
            "Computed values stored in a cache."
        );
        describe_counter!(
            METRIC_CACHE_LOAD_FAILURE_TOTAL,
            Unit::Count,
            "Value loader invocations that failed."
        );
        describe_counter!(
            METRIC_CACHE_LOCK_TIMEOUT_TOTAL,
            Unit::Count,
            "Waiters that gave up on an in-flight computation and loaded directly."
        );
    });
}
