//! Transcript canonicalization.
//!
//! Conversation transcripts are normalized before hashing so that cosmetic
//! differences (Unicode composition, line endings, typographic quotes,
//! whitespace runs) do not change the digest.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::canonical::{canonicalize_with, CanonicalValue, KeyOrder};
use crate::crypto::Sha256Hash;
use crate::error::CanonicalizationError;

/// A recorded conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub session_id: String,
    pub created_ms: i64,
    pub model: TranscriptModel,
    #[serde(default)]
    pub derived: Option<BTreeMap<String, CanonicalValue>>,
    #[serde(default)]
    pub turns: Vec<Turn>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptModel {
    pub name: String,
    #[serde(default)]
    pub revision: Option<String>,
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: String,
    pub ts_ms: i64,
    #[serde(default)]
    pub model: Option<String>,
    pub content: String,
}

/// Normalize free text for hashing.
///
/// NFC, CRLF/CR to LF, control characters other than TAB and LF removed,
/// smart quotes, dashes and guillemets mapped to ASCII, whitespace runs
/// collapsed per line, then trimmed.
pub fn normalize_text(s: &str) -> String {
    let composed: String = s.nfc().collect();
    let unified = composed.replace("\r\n", "\n").replace('\r', "\n");

    let cleaned: String = unified
        .chars()
        .filter(|c| !is_stripped_control(*c))
        .map(ascii_typography)
        .collect();

    let lines: Vec<String> = cleaned
        .split('\n')
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect();

    lines.join("\n").trim().to_owned()
}

fn is_stripped_control(c: char) -> bool {
    matches!(c, '\u{00}'..='\u{08}' | '\u{0B}' | '\u{0C}' | '\u{0E}'..='\u{1F}')
}

fn ascii_typography(c: char) -> char {
    match c {
        '\u{201C}' | '\u{201D}' | '\u{00AB}' | '\u{00BB}' => '"',
        '\u{2018}' | '\u{2019}' => '\'',
        '\u{2013}' | '\u{2014}' => '-',
        other => other,
    }
}

/// Canonical bytes of a transcript.
///
/// Missing `revision` and turn `model` become `""`, missing `derived`
/// becomes `{}`, and null values inside mappings are omitted. Keys are
/// ordered by their raw string, unlike [`canonicalize`](crate::canonicalize).
pub fn canonical_transcript(transcript: &Transcript) -> Result<Vec<u8>, CanonicalizationError> {
    let turns = transcript
        .turns
        .iter()
        .map(|turn| {
            CanonicalValue::object([
                ("role", CanonicalValue::from(turn.role.as_str())),
                ("ts_ms", CanonicalValue::Int(turn.ts_ms)),
                ("model", CanonicalValue::from(turn.model.clone().unwrap_or_default())),
                ("content", CanonicalValue::from(normalize_text(&turn.content))),
            ])
        })
        .collect::<Vec<_>>();

    let model = CanonicalValue::object([
        ("name", CanonicalValue::from(transcript.model.name.as_str())),
        (
            "revision",
            CanonicalValue::from(transcript.model.revision.clone().unwrap_or_default()),
        ),
    ]);

    let derived = CanonicalValue::Object(transcript.derived.clone().unwrap_or_default());

    let value = CanonicalValue::object([
        ("session_id", CanonicalValue::from(transcript.session_id.as_str())),
        ("created_ms", CanonicalValue::Int(transcript.created_ms)),
        ("model", model),
        ("derived", derived),
        ("turns", CanonicalValue::Array(turns)),
    ]);

    canonicalize_with(&omit_nulls(value), KeyOrder::Raw)
}

/// SHA-256 of [`canonical_transcript`].
pub fn transcript_hash(transcript: &Transcript) -> Result<Sha256Hash, CanonicalizationError> {
    Ok(Sha256Hash::hash(&canonical_transcript(transcript)?))
}

fn omit_nulls(value: CanonicalValue) -> CanonicalValue {
    match value {
        CanonicalValue::Object(map) => CanonicalValue::Object(
            map.into_iter()
                .filter(|(_, v)| !matches!(v, CanonicalValue::Null))
                .map(|(k, v)| (k, omit_nulls(v)))
                .collect(),
        ),
        CanonicalValue::Array(items) => {
            CanonicalValue::Array(items.into_iter().map(omit_nulls).collect())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcript(json: serde_json::Value) -> Transcript {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_parity_vector() {
        let t = transcript(serde_json::json!({
            "session_id": "s1",
            "created_ms": 100,
            "model": { "name": "m1" },
            "turns": []
        }));
        let bytes = canonical_transcript(&t).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"created_ms":100,"derived":{},"model":{"name":"m1","revision":""},"session_id":"s1","turns":[]}"#
        );
    }

    #[test]
    fn test_normalize_whitespace_and_line_endings() {
        assert_eq!(normalize_text("  Too   many    spaces  "), "Too many spaces");
        assert_eq!(normalize_text("Line\r\nEndings\nFixed"), "Line\nEndings\nFixed");
        assert_eq!(normalize_text("old\rmac"), "old\nmac");
        assert_eq!(normalize_text("tab\there"), "tab here");
    }

    #[test]
    fn test_normalize_typography() {
        assert_eq!(
            normalize_text("\u{201C}Smart quotes\u{201D} and \u{2014} dashes"),
            "\"Smart quotes\" and - dashes"
        );
        assert_eq!(normalize_text("\u{2018}a\u{2019} \u{00AB}b\u{00BB} 1\u{2013}2"), "'a' \"b\" 1-2");
    }

    #[test]
    fn test_normalize_strips_controls_and_composes() {
        assert_eq!(normalize_text("a\u{0}b\u{7}c\u{1B}d"), "abcd");
        // e + combining acute composes to a single code point
        assert_eq!(normalize_text("e\u{301}"), "\u{E9}");
    }

    #[test]
    fn test_turns_are_normalized_and_sorted() {
        let t = transcript(serde_json::json!({
            "session_id": "sess_123",
            "created_ms": 1700000000000i64,
            "model": { "name": "gpt-4", "revision": "v1" },
            "derived": { "seed": "123", "dropped": null },
            "turns": [
                { "role": "user", "ts_ms": 1700000001000i64, "content": "Hello   world" }
            ]
        }));
        let s = String::from_utf8(canonical_transcript(&t).unwrap()).unwrap();
        assert_eq!(
            s,
            r#"{"created_ms":1700000000000,"derived":{"seed":"123"},"model":{"name":"gpt-4","revision":"v1"},"session_id":"sess_123","turns":[{"content":"Hello world","model":"","role":"user","ts_ms":1700000001000}]}"#
        );
    }

    #[test]
    fn test_derived_keys_sorted_by_raw_string() {
        let t = transcript(serde_json::json!({
            "session_id": "s", "created_ms": 1, "model": { "name": "m" },
            "derived": { "a b": 2, "a": 1 }
        }));
        let s = String::from_utf8(canonical_transcript(&t).unwrap()).unwrap();
        assert!(s.contains(r#""derived":{"a":1,"a b":2}"#), "{s}");
    }

    #[test]
    fn test_cosmetic_changes_keep_hash() {
        let a = transcript(serde_json::json!({
            "session_id": "s", "created_ms": 1, "model": { "name": "m" },
            "turns": [{ "role": "user", "ts_ms": 2, "content": "Hi  there\r\n" }]
        }));
        let b = transcript(serde_json::json!({
            "session_id": "s", "created_ms": 1, "model": { "name": "m", "revision": "" },
            "turns": [{ "role": "user", "ts_ms": 2, "content": " Hi there" }]
        }));
        assert_eq!(transcript_hash(&a).unwrap(), transcript_hash(&b).unwrap());
    }
}
