//! Configuration layer: typed settings with layered precedence (file → env).

use std::{collections::BTreeMap, path::Path, str::FromStr, time::Duration};

use config::{Config, Environment, File, Map};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::{CacheBackend, CacheConfig, CacheTuning, DEFAULT_BACKEND, MAX_EXPIRY};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "cache-aside";
const ENV_PREFIX: &str = "CACHE_ASIDE";
const ENV_SEPARATOR: &str = "__";

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: String, reason: String },
}

impl LoadError {
    fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment).
///
/// `config_file`, when given, must exist and overrides the default files.
pub fn load(config_file: Option<&Path>) -> Result<Settings, LoadError> {
    load_with_environment(config_file, None)
}

/// `environment` replaces the process environment when set.
fn load_with_environment(
    config_file: Option<&Path>,
    environment: Option<Map<String, String>>,
) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = config_file {
        builder = builder.add_source(File::from(path).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
            .source(environment),
    );

    let raw: RawSettings = builder.build()?.try_deserialize()?;
    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings { logging, cache } = raw;

        let logging = build_logging_settings(logging)?;
        let cache = build_cache_settings(cache)?;

        Ok(Self { logging, cache })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheConfig, LoadError> {
    let backend = cache
        .backend
        .unwrap_or_else(|| DEFAULT_BACKEND.to_string());
    CacheBackend::from_str(&backend)
        .map_err(|err| LoadError::invalid("cache.backend", err.to_string()))?;

    let defaults = build_cache_tuning("cache.defaults", cache.defaults)?;

    let mut caches = BTreeMap::new();
    for (name, tuning) in cache.caches {
        if name.trim().is_empty() {
            return Err(LoadError::invalid(
                "cache.caches",
                "cache names must not be empty",
            ));
        }
        let tuning = build_cache_tuning(&format!("cache.caches.{name}"), tuning)?;
        caches.insert(name, tuning);
    }

    Ok(CacheConfig {
        enabled: cache.enabled.unwrap_or(true),
        backend,
        defaults,
        caches,
    })
}

fn build_cache_tuning(prefix: &str, tuning: RawCacheTuning) -> Result<CacheTuning, LoadError> {
    Ok(CacheTuning {
        initial_capacity: tuning.initial_capacity,
        maximum_size: tuning.maximum_size,
        expire_after_write: expiry(
            &format!("{prefix}.expire_after_write_ms"),
            tuning.expire_after_write_ms,
        )?,
        expire_after_access: expiry(
            &format!("{prefix}.expire_after_access_ms"),
            tuning.expire_after_access_ms,
        )?,
        metrics_enabled: tuning.metrics_enabled,
    })
}

fn expiry(key: &str, millis: Option<u64>) -> Result<Option<Duration>, LoadError> {
    match millis {
        None => Ok(None),
        Some(0) => Err(LoadError::invalid(key, "must be greater than zero")),
        Some(ms) => {
            let expiry = Duration::from_millis(ms);
            if expiry > MAX_EXPIRY {
                return Err(LoadError::invalid(
                    key,
                    format!("must not exceed {} milliseconds", MAX_EXPIRY.as_millis()),
                ));
            }
            Ok(Some(expiry))
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    backend: Option<String>,
    defaults: RawCacheTuning,
    caches: BTreeMap<String, RawCacheTuning>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheTuning {
    initial_capacity: Option<usize>,
    maximum_size: Option<u64>,
    expire_after_write_ms: Option<u64>,
    expire_after_access_ms: Option<u64>,
    metrics_enabled: Option<bool>,
}
