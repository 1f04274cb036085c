use std::any::Any;
use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// Boxed error accepted from value loaders.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Loader failure shared by every caller waiting on the same computation.
pub type LoaderFailure = Arc<dyn StdError + Send + Sync + 'static>;

/// A value loader panicked. Shared with waiters like any other loader failure.
#[derive(Debug, Error)]
#[error("value loader panicked: {message}")]
pub struct LoaderPanic {
    message: String,
}

impl LoaderPanic {
    pub(crate) fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|message| message.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self { message }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("invalid cache key: {reason}")]
    InvalidKey { reason: String },
    #[error("cache configuration error: {message}")]
    Configuration { message: String },
    #[error("unknown cache `{name}`")]
    UnknownCache { name: String },
    #[error("cache `{name}` is not backed by a {expected} store")]
    UnsupportedKind { name: String, expected: &'static str },
    #[error("value loader for cache `{cache}` failed: {source}")]
    Computation {
        cache: String,
        #[source]
        source: LoaderFailure,
    },
    #[error("cached value in `{cache}` does not match the requested type `{expected}`")]
    ValueType {
        cache: String,
        expected: &'static str,
    },
}

impl CacheError {
    pub fn invalid_key(reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            reason: reason.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn unknown_cache(name: impl Into<String>) -> Self {
        Self::UnknownCache { name: name.into() }
    }

    pub fn unsupported_kind(name: impl Into<String>, expected: &'static str) -> Self {
        Self::UnsupportedKind {
            name: name.into(),
            expected,
        }
    }

    pub fn computation(cache: impl Into<String>, source: LoaderFailure) -> Self {
        Self::Computation {
            cache: cache.into(),
            source,
        }
    }

    pub fn value_type(cache: impl Into<String>, expected: &'static str) -> Self {
        Self::ValueType {
            cache: cache.into(),
            expected,
        }
    }

    /// Returns the loader failure when this error wraps one.
    pub fn loader_failure(&self) -> Option<&LoaderFailure> {
        match self {
            Self::Computation { source, .. } => Some(source),
            _ => None,
        }
    }
}
