//! Cache key definitions.
//!
//! Defines `CacheKey` for store entries and `FieldValue` for keying
//! reconciled batch results.

use std::fmt;

use serde::{Serialize, Serializer};

/// A fully-qualified store key: `namespace + ":" + raw`.
///
/// Distinct raw keys within one namespace map to distinct cache keys as long
/// as the raw key's `Display` output is injective, which holds for the
/// integer, UUID, and plain-string keys this layer is used with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derives the store key for `raw` under `namespace`.
    pub fn new(namespace: &str, raw: &impl fmt::Display) -> Self {
        Self(format!("{namespace}:{raw}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Field Values
// ============================================================================

/// A scalar extracted from a result object, used to key the batch result map.
///
/// Only integer, string, and boolean fields are usable as result keys; floats
/// and composite values are rejected by [`FieldValue::from_json`]. Integers
/// outside the `i64` range key by their decimal form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldValue {
    Int(i64),
    Str(String),
    Bool(bool),
}

impl FieldValue {
    /// Converts a JSON scalar into a usable map key, or `None` when the value
    /// cannot key a result entry.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Self::Int(i))
                } else if let Some(u) = n.as_u64() {
                    Some(Self::Str(u.to_string()))
                } else {
                    None
                }
            }
            serde_json::Value::String(s) => Some(Self::Str(s.clone())),
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => f.write_str(s),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

// Result maps serialize as JSON objects, so every variant serializes as its
// string form.
impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn cache_key_joins_namespace_and_raw() {
        let key = CacheKey::new("cache:user:batch", &42);
        assert_eq!(key.as_str(), "cache:user:batch:42");

        let key = CacheKey::new("cache:user", &"abc");
        assert_eq!(key.to_string(), "cache:user:abc");
    }

    #[test]
    fn cache_keys_distinct_within_namespace() {
        let a = CacheKey::new("ns", &1);
        let b = CacheKey::new("ns", &2);
        assert_ne!(a, b);
        assert_eq!(a, CacheKey::new("ns", &1));
    }

    #[test]
    fn field_value_from_json_scalars() {
        use serde_json::json;

        assert_eq!(
            FieldValue::from_json(&json!(7)),
            Some(FieldValue::Int(7))
        );
        assert_eq!(
            FieldValue::from_json(&json!("id-7")),
            Some(FieldValue::Str("id-7".to_string()))
        );
        assert_eq!(
            FieldValue::from_json(&json!(true)),
            Some(FieldValue::Bool(true))
        );
        assert_eq!(
            FieldValue::from_json(&json!(u64::MAX)),
            Some(FieldValue::Str(u64::MAX.to_string()))
        );
    }

    #[test]
    fn field_value_rejects_non_scalars() {
        use serde_json::json;

        assert_eq!(FieldValue::from_json(&json!(1.5)), None);
        assert_eq!(FieldValue::from_json(&json!(null)), None);
        assert_eq!(FieldValue::from_json(&json!([1, 2])), None);
        assert_eq!(FieldValue::from_json(&json!({"id": 1})), None);
    }

    #[test]
    fn field_value_serializes_as_object_key() {
        let mut map = HashMap::new();
        map.insert(FieldValue::Int(3), "three");

        let encoded = serde_json::to_string(&map).unwrap();
        assert_eq!(encoded, r#"{"3":"three"}"#);
    }
}
