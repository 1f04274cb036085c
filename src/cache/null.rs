//! Null-value sentinel.
//!
//! The backing cache cannot tell "no entry" apart from "entry whose loader
//! produced nothing". Values cross the storage boundary as [`Stored`] so an
//! absent result is cached like any other value.

/// A value as held by a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stored<V> {
    /// The loader produced no value.
    NullValue,
    Value(V),
}

impl<V> Stored<V> {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::NullValue)
    }

    pub fn map<U>(self, f: impl FnOnce(V) -> U) -> Stored<U> {
        match self {
            Self::NullValue => Stored::NullValue,
            Self::Value(value) => Stored::Value(f(value)),
        }
    }
}

/// Convert a loader result into its stored form.
pub fn to_storable<V>(value: Option<V>) -> Stored<V> {
    match value {
        Some(value) => Stored::Value(value),
        None => Stored::NullValue,
    }
}

/// Convert a stored value back into what callers see.
pub fn from_storable<V>(stored: Stored<V>) -> Option<V> {
    match stored {
        Stored::Value(value) => Some(value),
        Stored::NullValue => None,
    }
}

impl<V> From<Option<V>> for Stored<V> {
    fn from(value: Option<V>) -> Self {
        to_storable(value)
    }
}

impl<V> From<Stored<V>> for Option<V> {
    fn from(stored: Stored<V>) -> Self {
        from_storable(stored)
    }
}
