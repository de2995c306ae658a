//! Proptest generators for property-based testing.

use std::collections::BTreeMap;

use proptest::prelude::*;

use sonate_core::{CanonicalValue, Keypair, PublicKey, Sha256Hash};
use sonate_receipts::InteractionPayload;

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a random public key.
pub fn public_key() -> impl Strategy<Value = PublicKey> {
    keypair().prop_map(|kp| kp.public_key())
}

/// Generate a random digest.
pub fn sha256_hash() -> impl Strategy<Value = Sha256Hash> {
    any::<[u8; 32]>().prop_map(Sha256Hash::from_bytes)
}

/// Generate payload bytes of specified max length.
pub fn payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate a reasonable timestamp.
pub fn timestamp() -> impl Strategy<Value = i64> {
    0i64..=4_102_444_800_000
}

/// Generate an identifier such as a session id.
pub fn identifier() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,31}"
}

/// Generate arbitrary nested JSON-like values.
///
/// Floats are finite eighths so their decimal form parses back exactly;
/// integers cover both signed and unsigned ranges.
pub fn canonical_value() -> impl Strategy<Value = CanonicalValue> {
    let leaf = prop_oneof![
        Just(CanonicalValue::Null),
        any::<bool>().prop_map(CanonicalValue::Bool),
        any::<i64>().prop_map(CanonicalValue::Int),
        any::<u64>().prop_map(CanonicalValue::from),
        (-1_000_000_000i64..1_000_000_000).prop_map(|n| CanonicalValue::Float(n as f64 / 8.0)),
        "\\PC{0,16}".prop_map(CanonicalValue::String),
    ];
    leaf.prop_recursive(4, 64, 8, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..8).prop_map(CanonicalValue::Array),
            prop::collection::btree_map("\\PC{0,8}", inner, 0..8).prop_map(CanonicalValue::Object),
        ]
    })
}

/// Generate a metadata map for chain links.
pub fn metadata() -> impl Strategy<Value = BTreeMap<String, CanonicalValue>> {
    prop::collection::btree_map("[a-z_]{1,12}", canonical_value(), 0..6)
}

/// Generate an interaction payload of any variant.
pub fn interaction() -> impl Strategy<Value = InteractionPayload> {
    prop_oneof![
        ("\\PC{0,64}", "\\PC{0,64}", identifier())
            .prop_map(|(p, r, m)| InteractionPayload::exchange(p, r, m)),
        ("\\PC{0,64}", "\\PC{0,64}", identifier())
            .prop_filter_map("digest", |(p, r, m)| InteractionPayload::digest(&p, &r, m).ok()),
        (identifier(), payload(64)).prop_map(|(ct, data)| InteractionPayload::opaque(ct, &data)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonate_core::{canonicalize, verify};

    proptest! {
        #[test]
        fn test_canonical_encoding_reparses(value in canonical_value()) {
            let bytes = canonicalize(&value).unwrap();
            let reparsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
            let again = canonicalize(&CanonicalValue::from(reparsed)).unwrap();
            prop_assert_eq!(bytes, again);
        }

        #[test]
        fn test_signatures_verify(kp in keypair(), message in payload(256)) {
            let sig = kp.sign(&message);
            prop_assert!(verify(&message, &sig, &kp.public_key()));
        }

        #[test]
        fn test_interaction_roundtrips(payload in interaction()) {
            let json = serde_json::to_value(&payload).unwrap();
            let back: InteractionPayload = serde_json::from_value(json).unwrap();
            prop_assert_eq!(back, payload);
        }
    }
}
