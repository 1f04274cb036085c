//! Runtime bootstrap: settings, telemetry and the cache registry.

pub mod error;
pub mod telemetry;

use std::path::Path;

use tracing::info;

use crate::cache::CacheRegistry;
use crate::config::{self, Settings};

use self::error::InfraError;

/// Load settings, install telemetry and build a registry holding `cache_names`.
pub fn bootstrap<I, S>(
    config_file: Option<&Path>,
    cache_names: I,
) -> Result<(Settings, CacheRegistry), InfraError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let settings = config::load(config_file)?;
    telemetry::init(&settings.logging)?;
    let registry = CacheRegistry::from_config(cache_names, &settings.cache)?;
    info!(caches = ?registry.cache_names(), "cache-aside ready");
    Ok((settings, registry))
}
