//! Cache key definitions.
//!
//! A call site contributes [`KeyPart`] values; [`derive_key`] turns them into the
//! [`CacheKey`] used for the lookup:
//!
//! - no parameters: the cache's default key
//! - one key element: a simple key
//! - several key elements: a [`CompositeKey`]

use std::fmt;
use std::sync::Arc;

use super::error::CacheError;

/// One element of key material.
///
/// `Null` models an absent call-site value. It is accepted inside composite keys
/// built from every parameter but never as a simple key.
///
/// Signed and unsigned integers are kept apart: `5_i32` and `5_u32` convert to
/// `Int(5)` and `UInt(5)` and name different entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyPart {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Str(String),
    Bytes(Vec<u8>),
    /// Array-like element, compared element by element.
    Seq(Vec<KeyPart>),
}

impl KeyPart {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::UInt(value) => write!(f, "{value}"),
            Self::Str(value) => write!(f, "{value:?}"),
            Self::Bytes(value) => write!(f, "bytes[{}]", value.len()),
            Self::Seq(items) => {
                f.write_str("[")?;
                write_joined(f, items)?;
                f.write_str("]")
            }
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[KeyPart]) -> fmt::Result {
    for (index, item) in items.iter().enumerate() {
        if index > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

macro_rules! key_part_from_int {
    ($variant:ident, $target:ty, $($source:ty),+) => {
        $(
            impl From<$source> for KeyPart {
                fn from(value: $source) -> Self {
                    Self::$variant(<$target>::from(value))
                }
            }
        )+
    };
}

key_part_from_int!(Int, i64, i8, i16, i32, i64);
key_part_from_int!(UInt, u64, u8, u16, u32, u64);

impl From<usize> for KeyPart {
    fn from(value: usize) -> Self {
        // usize is at most 64 bits on every supported target.
        Self::UInt(value as u64)
    }
}

impl From<bool> for KeyPart {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&[u8]> for KeyPart {
    fn from(value: &[u8]) -> Self {
        Self::Bytes(value.to_vec())
    }
}

impl<T: Into<KeyPart>> From<Option<T>> for KeyPart {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl<T: Into<KeyPart>> From<Vec<T>> for KeyPart {
    fn from(values: Vec<T>) -> Self {
        Self::Seq(values.into_iter().map(Into::into).collect())
    }
}

/// Ordered key of two or more elements. Orders element by element, then by
/// arity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompositeKey {
    elements: Arc<[KeyPart]>,
}

impl CompositeKey {
    /// Build a composite key; fewer than two elements is rejected.
    pub fn new<I, P>(elements: I) -> Result<Self, CacheError>
    where
        I: IntoIterator<Item = P>,
        P: Into<KeyPart>,
    {
        let elements: Vec<KeyPart> = elements.into_iter().map(Into::into).collect();
        if elements.len() < 2 {
            return Err(CacheError::invalid_key(format!(
                "a composite key needs at least two elements, got {}",
                elements.len()
            )));
        }
        Ok(Self {
            elements: elements.into(),
        })
    }

    pub fn elements(&self) -> &[KeyPart] {
        &self.elements
    }

    pub fn arity(&self) -> usize {
        self.elements.len()
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        write_joined(f, &self.elements)?;
        f.write_str(")")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum KeyRepr {
    Default { cache_name: Arc<str> },
    Simple(KeyPart),
    Composite(CompositeKey),
}

/// Effective lookup key. Never null.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(KeyRepr);

impl CacheKey {
    /// Key used for calls without key material. Unique per cache name.
    pub fn default_for(cache_name: &str) -> Self {
        Self(KeyRepr::Default {
            cache_name: Arc::from(cache_name),
        })
    }

    /// Single-element key. A null element is rejected.
    pub fn simple(part: impl Into<KeyPart>) -> Result<Self, CacheError> {
        let part = part.into();
        if part.is_null() {
            return Err(CacheError::invalid_key("null keys are not supported"));
        }
        Ok(Self(KeyRepr::Simple(part)))
    }

    pub fn composite<I, P>(elements: I) -> Result<Self, CacheError>
    where
        I: IntoIterator<Item = P>,
        P: Into<KeyPart>,
    {
        CompositeKey::new(elements).map(Self::from)
    }

    pub fn is_default(&self) -> bool {
        matches!(self.0, KeyRepr::Default { .. })
    }

    pub fn as_simple(&self) -> Option<&KeyPart> {
        match &self.0 {
            KeyRepr::Simple(part) => Some(part),
            _ => None,
        }
    }

    pub fn as_composite(&self) -> Option<&CompositeKey> {
        match &self.0 {
            KeyRepr::Composite(key) => Some(key),
            _ => None,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            KeyRepr::Default { cache_name } => write!(f, "default({cache_name})"),
            KeyRepr::Simple(part) => write!(f, "{part}"),
            KeyRepr::Composite(key) => write!(f, "{key}"),
        }
    }
}

impl From<CompositeKey> for CacheKey {
    fn from(key: CompositeKey) -> Self {
        Self(KeyRepr::Composite(key))
    }
}

impl From<&str> for CacheKey {
    fn from(value: &str) -> Self {
        Self(KeyRepr::Simple(KeyPart::from(value)))
    }
}

impl From<String> for CacheKey {
    fn from(value: String) -> Self {
        Self(KeyRepr::Simple(KeyPart::Str(value)))
    }
}

impl From<i64> for CacheKey {
    fn from(value: i64) -> Self {
        Self(KeyRepr::Simple(KeyPart::Int(value)))
    }
}

impl From<u64> for CacheKey {
    fn from(value: u64) -> Self {
        Self(KeyRepr::Simple(KeyPart::UInt(value)))
    }
}

impl TryFrom<KeyPart> for CacheKey {
    type Error = CacheError;

    fn try_from(part: KeyPart) -> Result<Self, Self::Error> {
        Self::simple(part)
    }
}

/// Derive the lookup key for a call.
///
/// `explicit_positions` are indices into `parameters` designated as key
/// elements, in declaration order. Explicit designations win over the implicit
/// use of every parameter, and a call without parameters always maps to the
/// default key of `cache_name`.
pub fn derive_key(
    cache_name: &str,
    explicit_positions: &[usize],
    parameters: &[KeyPart],
) -> Result<CacheKey, CacheError> {
    if parameters.is_empty() {
        return Ok(CacheKey::default_for(cache_name));
    }

    match explicit_positions {
        [] => match parameters {
            [single] => CacheKey::simple(single.clone()),
            all => CacheKey::composite(all.iter().cloned()),
        },
        [position] => CacheKey::simple(parameter_at(parameters, *position)?.clone()),
        positions => {
            let mut elements = Vec::with_capacity(positions.len());
            for &position in positions {
                let element = parameter_at(parameters, position)?;
                if element.is_null() {
                    return Err(CacheError::invalid_key(format!(
                        "key element at parameter position {position} is null"
                    )));
                }
                elements.push(element.clone());
            }
            CacheKey::composite(elements)
        }
    }
}

fn parameter_at(parameters: &[KeyPart], position: usize) -> Result<&KeyPart, CacheError> {
    parameters.get(position).ok_or_else(|| {
        CacheError::invalid_key(format!(
            "key position {position} is out of range for {} parameters",
            parameters.len()
        ))
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn default_keys_differ_per_cache_name() {
        let users = CacheKey::default_for("users");
        assert_eq!(users, CacheKey::default_for("users"));
        assert_ne!(users, CacheKey::default_for("orders"));
    }

    #[test]
    fn default_key_never_equals_caller_keys() {
        let default = CacheKey::default_for("users");
        assert_ne!(default, CacheKey::from("users"));
        assert_ne!(default, CacheKey::from("default(users)"));
        assert_ne!(
            default,
            CacheKey::composite(["users", "default"]).expect("composite key")
        );
    }

    #[test]
    fn composite_equality_is_ordered_and_arity_sensitive() {
        let ab = CompositeKey::new(["a", "b"]).expect("two elements");
        assert_eq!(ab, CompositeKey::new(["a", "b"]).expect("two elements"));
        assert_ne!(ab, CompositeKey::new(["b", "a"]).expect("two elements"));
        assert_ne!(ab, CompositeKey::new(["a", "b", "c"]).expect("three elements"));
    }

    #[test]
    fn composite_ordering_is_lexicographic() {
        let ab = CompositeKey::new(["a", "b"]).expect("two elements");
        let ac = CompositeKey::new(["a", "c"]).expect("two elements");
        let abc = CompositeKey::new(["a", "b", "c"]).expect("three elements");

        assert!(ab < ac);
        assert!(ab < abc);
        assert!(abc < ac);
        assert_eq!(ab.cmp(&ab.clone()), std::cmp::Ordering::Equal);
    }

    #[test]
    fn composite_compares_nested_sequences_deeply() {
        let left = CompositeKey::new([KeyPart::from(vec![1_i64, 2]), KeyPart::from("x")])
            .expect("composite key");
        let right = CompositeKey::new([KeyPart::from(vec![1_i64, 2]), KeyPart::from("x")])
            .expect("composite key");
        let other = CompositeKey::new([KeyPart::from(vec![2_i64, 1]), KeyPart::from("x")])
            .expect("composite key");

        assert_eq!(left, right);
        assert_ne!(left, other);

        let mut seen = HashSet::new();
        seen.insert(CacheKey::from(left));
        assert!(seen.contains(&CacheKey::from(right)));
    }

    #[test]
    fn composite_requires_two_elements() {
        let empty: [KeyPart; 0] = [];
        assert!(matches!(
            CompositeKey::new(empty),
            Err(CacheError::InvalidKey { .. })
        ));
        assert!(matches!(
            CompositeKey::new(["only"]),
            Err(CacheError::InvalidKey { .. })
        ));
    }

    #[test]
    fn simple_key_rejects_null() {
        assert!(matches!(
            CacheKey::simple(KeyPart::Null),
            Err(CacheError::InvalidKey { .. })
        ));
        assert!(matches!(
            CacheKey::try_from(KeyPart::from(None::<String>)),
            Err(CacheError::InvalidKey { .. })
        ));
    }

    #[test]
    fn derive_without_parameters_uses_default_key() {
        let key = derive_key("users", &[], &[]).expect("default key");
        assert_eq!(key, CacheKey::default_for("users"));
        assert!(key.is_default());
    }

    #[test]
    fn derive_with_single_explicit_position() {
        let params = [KeyPart::from("tenant"), KeyPart::from(42_i64)];
        let key = derive_key("users", &[1], &params).expect("simple key");
        assert_eq!(key, CacheKey::from(42_i64));
    }

    #[test]
    fn derive_single_explicit_null_is_invalid() {
        let params = [KeyPart::from("tenant"), KeyPart::Null];
        assert!(matches!(
            derive_key("users", &[1], &params),
            Err(CacheError::InvalidKey { .. })
        ));
    }

    #[test]
    fn derive_with_explicit_positions_keeps_declared_order() {
        let params = [
            KeyPart::from("a"),
            KeyPart::from("ignored"),
            KeyPart::from("c"),
        ];
        let key = derive_key("users", &[2, 0], &params).expect("composite key");
        assert_eq!(key, CacheKey::composite(["c", "a"]).expect("composite key"));
    }

    #[test]
    fn derive_explicit_composite_rejects_null_elements() {
        let params = [KeyPart::from("a"), KeyPart::Null, KeyPart::from("c")];
        assert!(matches!(
            derive_key("users", &[0, 1], &params),
            Err(CacheError::InvalidKey { .. })
        ));
    }

    #[test]
    fn derive_single_parameter_is_simple_key() {
        let key = derive_key("users", &[], &[KeyPart::from("alice")]).expect("simple key");
        assert_eq!(key.as_simple(), Some(&KeyPart::from("alice")));
    }

    #[test]
    fn derive_single_null_parameter_is_invalid() {
        assert!(matches!(
            derive_key("users", &[], &[KeyPart::Null]),
            Err(CacheError::InvalidKey { .. })
        ));
    }

    #[test]
    fn derive_all_parameters_into_composite() {
        let params = [KeyPart::from("a"), KeyPart::Null, KeyPart::from(7_u32)];
        let key = derive_key("users", &[], &params).expect("composite key");
        let composite = key.as_composite().expect("composite");
        assert_eq!(composite.arity(), 3);
        assert_eq!(composite.elements()[2], KeyPart::UInt(7));
    }

    #[test]
    fn derive_rejects_out_of_range_position() {
        let params = [KeyPart::from("a"), KeyPart::from("b")];
        assert!(matches!(
            derive_key("users", &[0, 5], &params),
            Err(CacheError::InvalidKey { .. })
        ));
    }

    #[test]
    fn integer_signedness_is_part_of_the_key() {
        assert_eq!(KeyPart::from(5_i8), KeyPart::from(5_i64));
        assert_eq!(KeyPart::from(5_u16), KeyPart::from(5_usize));
        assert_ne!(KeyPart::from(5_i32), KeyPart::from(5_u32));
        assert_ne!(CacheKey::from(5_i64), CacheKey::from(5_u64));
    }

    #[test]
    fn display_renders_key_material() {
        let key = CacheKey::composite([KeyPart::from("a"), KeyPart::from(vec![1_i64, 2])])
            .expect("composite key");
        assert_eq!(key.to_string(), "(\"a\", [1, 2])");
        assert_eq!(CacheKey::default_for("users").to_string(), "default(users)");
    }
}
