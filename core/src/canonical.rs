//! Canonical JSON encoding and keccak hashing.
//!
//! This is the one module where cross-implementation fidelity matters
//! bit-exactly: every replayer must reproduce the same bytes for the
//! same value.  Objects are encoded with keys sorted lexicographically
//! at every level, no whitespace, arrays in order.  Absent fields are
//! omitted by construction (serde skips `None`); a present `null` is
//! encoded as `null`.

use alloy_primitives::{keccak256, B256};
use serde_json::Value;

use crate::error::{Error, Result};

/// Encode a JSON value into its canonical form.
pub fn canonical_encode(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_escaped(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_escaped(out, key);
                out.push(':');
                write_value(out, &map[key]);
            }
            out.push('}');
        }
    }
}

fn write_escaped(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{08}' => out.push_str("\\b"),
            '\u{09}' => out.push_str("\\t"),
            '\u{0a}' => out.push_str("\\n"),
            '\u{0c}' => out.push_str("\\f"),
            '\u{0d}' => out.push_str("\\r"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

/// `keccak256(utf8(canonical_encode(value)))`, rendered as 0x-prefixed
/// lowercase hex.
pub fn hash_state(value: &Value) -> String {
    hash_utf8(&canonical_encode(value))
}

/// Advance a hash chain: `keccak256(utf8(prev ++ canonical_entry))`.
pub fn chain_hash(prev: &str, canonical_entry: &str) -> String {
    let mut buf = String::with_capacity(prev.len() + canonical_entry.len());
    buf.push_str(prev);
    buf.push_str(canonical_entry);
    hash_utf8(&buf)
}

fn hash_utf8(input: &str) -> String {
    let digest = keccak256(input.as_bytes());
    format!("0x{}", hex::encode(digest))
}

/// Parse a 0x-prefixed 32-byte hex hash into its raw form, as committed
/// on chain.
pub fn parse_hash(hash: &str) -> Result<B256> {
    let stripped = hash
        .strip_prefix("0x")
        .ok_or_else(|| Error::InternalError(format!("not a hash: {hash}")))?;
    let bytes =
        hex::decode(stripped).map_err(|e| Error::InternalError(format!("bad hash hex: {e}")))?;
    if bytes.len() != 32 {
        return Err(Error::InternalError(format!(
            "hash length {} != 32",
            bytes.len()
        )));
    }
    Ok(B256::from_slice(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keys_sorted_at_every_level() {
        let v = json!({"b": {"z": 1, "a": 2}, "a": [{"y": 0, "x": 1}]});
        assert_eq!(
            canonical_encode(&v),
            r#"{"a":[{"x":1,"y":0}],"b":{"a":2,"z":1}}"#
        );
    }

    #[test]
    fn test_no_whitespace_and_array_order_kept() {
        let v = json!({"k": [3, 1, 2], "s": "a b"});
        assert_eq!(canonical_encode(&v), r#"{"k":[3,1,2],"s":"a b"}"#);
    }

    #[test]
    fn test_null_kept_scalars_rendered() {
        let v = json!({"n": null, "t": true, "f": false, "i": -7});
        assert_eq!(canonical_encode(&v), r#"{"f":false,"i":-7,"n":null,"t":true}"#);
    }

    #[test]
    fn test_string_escaping() {
        let v = json!("quote \" slash \\ nl \n tab \t bell \u{07}");
        assert_eq!(
            canonical_encode(&v),
            "\"quote \\\" slash \\\\ nl \\n tab \\t bell \\u0007\""
        );
    }

    #[test]
    fn test_round_trip_is_stable() {
        let v = json!({"board": [null, "x", "o"], "currentPlayer": "0xabc", "turn": 3});
        let once = canonical_encode(&v);
        let parsed: Value = serde_json::from_str(&once).unwrap();
        assert_eq!(canonical_encode(&parsed), once);
    }

    #[test]
    fn test_hash_shape_and_determinism() {
        let v = json!({"a": 1});
        let h1 = hash_state(&v);
        let h2 = hash_state(&json!({"a": 1}));
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 66);
        assert!(h1.starts_with("0x"));
        assert_ne!(h1, hash_state(&json!({"a": 2})));
    }

    #[test]
    fn test_key_order_does_not_change_hash() {
        let a: Value = serde_json::from_str(r#"{"x":1,"y":2}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"y":2,"x":1}"#).unwrap();
        assert_eq!(hash_state(&a), hash_state(&b));
    }

    #[test]
    fn test_chain_hash_depends_on_both_inputs() {
        let entry = canonical_encode(&json!({"sequence": 0}));
        let h1 = chain_hash("0xaa", &entry);
        let h2 = chain_hash("0xbb", &entry);
        let h3 = chain_hash("0xaa", &canonical_encode(&json!({"sequence": 1})));
        assert_ne!(h1, h2);
        assert_ne!(h1, h3);
    }

    #[test]
    fn test_parse_hash_round_trip() {
        let h = hash_state(&json!({"a": 1}));
        let raw = parse_hash(&h).unwrap();
        assert_eq!(format!("0x{}", hex::encode(raw)), h);
        assert!(parse_hash("0x1234").is_err());
        assert!(parse_hash("nothex").is_err());
    }
}
