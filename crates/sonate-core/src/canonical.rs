//! Canonical JSON encoding for deterministic hashing and signing.
//!
//! The encoding rules:
//! - No whitespace anywhere
//! - Mapping keys sorted by their quoted JSON form
//! - Integers in decimal; floats with an integral value inside `±2^53` are
//!   written as integers, other floats use the shortest round-trip form
//! - Non-finite floats are rejected
//!
//! Two values that are structurally equal (ignoring key insertion order)
//! always produce byte-identical output, on every platform. Every hash and
//! signature in the audit chain is computed over these bytes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::crypto::Sha256Hash;
use crate::error::CanonicalizationError;

/// Maximum container nesting accepted by [`canonicalize`].
pub const MAX_DEPTH: usize = 128;

/// Largest integer a float can carry without losing precision (2^53).
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// A structured value that can be canonicalized.
///
/// The enum is owned, so it cannot describe a cycle; runaway nesting is
/// bounded by [`MAX_DEPTH`] instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CanonicalValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Array(Vec<CanonicalValue>),
    Object(BTreeMap<String, CanonicalValue>),
}

impl CanonicalValue {
    /// Build an object from key/value pairs. Later duplicates win.
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, CanonicalValue)>,
    {
        Self::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Borrow the inner map if this is an object.
    pub fn as_object(&self) -> Option<&BTreeMap<String, CanonicalValue>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Mutably borrow the inner map if this is an object.
    pub fn as_object_mut(&mut self) -> Option<&mut BTreeMap<String, CanonicalValue>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Borrow the inner string if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<serde_json::Value> for CanonicalValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Self::UInt(u)
                } else {
                    Self::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<&str> for CanonicalValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for CanonicalValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for CanonicalValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for CanonicalValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<u64> for CanonicalValue {
    fn from(u: u64) -> Self {
        Self::UInt(u)
    }
}

impl From<f64> for CanonicalValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<Vec<CanonicalValue>> for CanonicalValue {
    fn from(items: Vec<CanonicalValue>) -> Self {
        Self::Array(items)
    }
}

impl From<BTreeMap<String, CanonicalValue>> for CanonicalValue {
    fn from(map: BTreeMap<String, CanonicalValue>) -> Self {
        Self::Object(map)
    }
}

/// Convert any serializable value into a [`CanonicalValue`].
///
/// Types serde cannot express as JSON (for example maps keyed by
/// non-strings) are rejected with `UnsupportedType`.
pub fn to_canonical_value<T: Serialize + ?Sized>(
    value: &T,
) -> Result<CanonicalValue, CanonicalizationError> {
    let json = serde_json::to_value(value)
        .map_err(|e| CanonicalizationError::UnsupportedType(e.to_string()))?;
    Ok(CanonicalValue::from(json))
}

/// How mapping keys are ordered in the encoded output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyOrder {
    /// By the quoted JSON form of the key.
    Quoted,
    /// By the raw key string, as Python's `sort_keys` orders them.
    Raw,
}

/// Encode a value to canonical bytes.
pub fn canonicalize(value: &CanonicalValue) -> Result<Vec<u8>, CanonicalizationError> {
    canonicalize_with(value, KeyOrder::Quoted)
}

pub(crate) fn canonicalize_with(
    value: &CanonicalValue,
    order: KeyOrder,
) -> Result<Vec<u8>, CanonicalizationError> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, value, order, 0)?;
    Ok(buf)
}

/// Canonical bytes of any serializable value.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CanonicalizationError> {
    canonicalize(&to_canonical_value(value)?)
}

/// SHA-256 of the canonical bytes of a value.
pub fn canonical_hash<T: Serialize + ?Sized>(
    value: &T,
) -> Result<Sha256Hash, CanonicalizationError> {
    Ok(Sha256Hash::hash(&canonical_json(value)?))
}

fn encode_value_to(
    buf: &mut Vec<u8>,
    value: &CanonicalValue,
    order: KeyOrder,
    depth: usize,
) -> Result<(), CanonicalizationError> {
    match value {
        CanonicalValue::Null => buf.extend_from_slice(b"null"),
        CanonicalValue::Bool(true) => buf.extend_from_slice(b"true"),
        CanonicalValue::Bool(false) => buf.extend_from_slice(b"false"),
        CanonicalValue::Int(i) => buf.extend_from_slice(i.to_string().as_bytes()),
        CanonicalValue::UInt(u) => buf.extend_from_slice(u.to_string().as_bytes()),
        CanonicalValue::Float(f) => encode_float(buf, *f)?,
        CanonicalValue::String(s) => encode_string(buf, s)?,
        CanonicalValue::Array(items) => {
            let depth = enter(depth)?;
            buf.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    buf.push(b',');
                }
                encode_value_to(buf, item, order, depth)?;
            }
            buf.push(b']');
        }
        CanonicalValue::Object(map) => {
            let depth = enter(depth)?;

            // Map iteration is already raw key order
            let mut entries = Vec::with_capacity(map.len());
            for (key, item) in map {
                let mut quoted = Vec::with_capacity(key.len() + 2);
                encode_string(&mut quoted, key)?;
                entries.push((quoted, item));
            }
            if order == KeyOrder::Quoted {
                entries.sort_by(|a, b| a.0.cmp(&b.0));
            }

            buf.push(b'{');
            for (i, (quoted, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    buf.push(b',');
                }
                buf.extend_from_slice(&quoted);
                buf.push(b':');
                encode_value_to(buf, item, order, depth)?;
            }
            buf.push(b'}');
        }
    }
    Ok(())
}

fn enter(depth: usize) -> Result<usize, CanonicalizationError> {
    let next = depth + 1;
    if next > MAX_DEPTH {
        return Err(CanonicalizationError::TooDeep { max: MAX_DEPTH });
    }
    Ok(next)
}

fn encode_float(buf: &mut Vec<u8>, f: f64) -> Result<(), CanonicalizationError> {
    if !f.is_finite() {
        return Err(CanonicalizationError::UnsupportedType(format!(
            "non-finite float {f}"
        )));
    }
    if f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER {
        // -0.0 collapses to 0
        buf.extend_from_slice((f as i64).to_string().as_bytes());
        return Ok(());
    }
    let repr = serde_json::to_string(&f)
        .map_err(|e| CanonicalizationError::UnsupportedType(e.to_string()))?;
    buf.extend_from_slice(repr.as_bytes());
    Ok(())
}

fn encode_string(buf: &mut Vec<u8>, s: &str) -> Result<(), CanonicalizationError> {
    serde_json::to_writer(&mut *buf, s)
        .map_err(|e| CanonicalizationError::UnsupportedType(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn canon(v: serde_json::Value) -> String {
        String::from_utf8(canonicalize(&CanonicalValue::from(v)).unwrap()).unwrap()
    }

    #[test]
    fn test_scalars() {
        assert_eq!(canon(json!(null)), "null");
        assert_eq!(canon(json!(true)), "true");
        assert_eq!(canon(json!(false)), "false");
        assert_eq!(canon(json!(-42)), "-42");
        assert_eq!(canon(json!(u64::MAX)), "18446744073709551615");
        assert_eq!(canon(json!("hi \"there\"\n")), r#""hi \"there\"\n""#);
    }

    #[test]
    fn test_no_whitespace_and_sorted_keys() {
        let v = json!({ "b": [1, 2, { "z": null, "a": "x" }], "a": { "d": 1, "c": 2 } });
        assert_eq!(canon(v), r#"{"a":{"c":2,"d":1},"b":[1,2,{"a":"x","z":null}]}"#);
    }

    #[test]
    fn test_keys_sorted_by_quoted_form() {
        // The closing quote of "a" sorts after the space in "a b"
        let v = json!({ "a": 1, "a b": 2 });
        assert_eq!(canon(v), r#"{"a b":2,"a":1}"#);
    }

    #[test]
    fn test_integral_floats_written_as_integers() {
        assert_eq!(canon(json!(1.0)), "1");
        assert_eq!(canon(json!(-0.0)), "0");
        assert_eq!(canon(json!(9007199254740992.0)), "9007199254740992");
        assert_eq!(canon(json!(1.5)), "1.5");
        assert_eq!(canon(json!(0.1)), "0.1");
    }

    #[test]
    fn test_non_finite_floats_rejected() {
        for f in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = canonicalize(&CanonicalValue::Float(f)).unwrap_err();
            assert!(matches!(err, CanonicalizationError::UnsupportedType(_)));
        }
        let nested = CanonicalValue::object([("x", CanonicalValue::Float(f64::NAN))]);
        assert!(canonicalize(&nested).is_err());
    }

    #[test]
    fn test_non_string_keys_rejected() {
        let mut map = HashMap::new();
        map.insert((1u8, 2u8), "tuple key");
        let err = to_canonical_value(&map).unwrap_err();
        assert!(matches!(err, CanonicalizationError::UnsupportedType(_)));
    }

    #[test]
    fn test_excessive_nesting_rejected() {
        let mut v = CanonicalValue::Null;
        for _ in 0..MAX_DEPTH {
            v = CanonicalValue::Array(vec![v]);
        }
        assert!(canonicalize(&v).is_ok());

        let v = CanonicalValue::Array(vec![v]);
        assert_eq!(
            canonicalize(&v).unwrap_err(),
            CanonicalizationError::TooDeep { max: MAX_DEPTH }
        );
    }

    #[test]
    fn test_struct_field_order_does_not_matter() {
        #[derive(Serialize)]
        struct Forward {
            alpha: u32,
            beta: &'static str,
        }
        #[derive(Serialize)]
        struct Backward {
            beta: &'static str,
            alpha: u32,
        }

        let a = canonical_json(&Forward { alpha: 7, beta: "b" }).unwrap();
        let b = canonical_json(&Backward { beta: "b", alpha: 7 }).unwrap();
        assert_eq!(a, b);
        assert_eq!(canonical_hash(&Forward { alpha: 7, beta: "b" }).unwrap(), Sha256Hash::hash(&a));
    }

    #[test]
    fn test_value_serde_roundtrip_shape() {
        let v = CanonicalValue::object([
            ("n", CanonicalValue::Null),
            ("i", CanonicalValue::Int(-3)),
            ("s", CanonicalValue::from("x")),
        ]);
        let json = serde_json::to_string(&v).unwrap();
        let back: CanonicalValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }

    fn arb_json() -> impl Strategy<Value = serde_json::Value> {
        let leaf = prop_oneof![
            Just(serde_json::Value::Null),
            any::<bool>().prop_map(serde_json::Value::from),
            any::<i64>().prop_map(serde_json::Value::from),
            "[a-z \"\\\\é]{0,8}".prop_map(serde_json::Value::from),
        ];
        leaf.prop_recursive(4, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(serde_json::Value::Array),
                prop::collection::vec(("[a-z ]{0,6}", inner), 0..6).prop_map(|entries| {
                    serde_json::Value::Object(entries.into_iter().collect())
                }),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_canonical_bytes_are_a_fixpoint(v in arb_json()) {
            let first = canonicalize(&CanonicalValue::from(v)).unwrap();
            let reparsed: serde_json::Value = serde_json::from_slice(&first).unwrap();
            let second = canonicalize(&CanonicalValue::from(reparsed)).unwrap();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_insertion_order_is_irrelevant(
            entries in prop::collection::vec(("[a-z]{1,6}", any::<i64>()), 0..12)
        ) {
            let forward = CanonicalValue::object(
                entries.iter().map(|(k, v)| (k.clone(), CanonicalValue::Int(*v))),
            );
            // Dedupe the same way `object` does (last write wins) before reversing
            let deduped: BTreeMap<_, _> = entries.iter().cloned().collect();
            let backward = CanonicalValue::object(
                deduped.into_iter().rev().map(|(k, v)| (k, CanonicalValue::Int(v))),
            );
            prop_assert_eq!(canonicalize(&forward).unwrap(), canonicalize(&backward).unwrap());
        }
    }
}
