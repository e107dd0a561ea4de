//! CBOR processing for `WebAuthn`
//!
//! This module wraps the CBOR (Concise Binary Object Representation)
//! decoding needed for attestation objects, attestation statements and
//! COSE keys.

use ciborium::de::from_reader;
use ciborium::value::Value;

/// Decode exactly one CBOR item; trailing bytes are an error
pub(crate) fn decode(bytes: &[u8]) -> Result<Value, String> {
    let (value, consumed) = decode_prefix(bytes)?;
    if consumed != bytes.len() {
        return Err(format!(
            "{} trailing bytes after CBOR item",
            bytes.len() - consumed
        ));
    }
    Ok(value)
}

/// Decode the CBOR item at the start of `bytes` and report how many bytes it
/// occupied. Trailing bytes are left for the caller.
pub(crate) fn decode_prefix(bytes: &[u8]) -> Result<(Value, usize), String> {
    let mut remaining = bytes;
    let value: Value = from_reader(&mut remaining).map_err(|e| e.to_string())?;
    Ok((value, bytes.len() - remaining.len()))
}

/// Look up a text key in a CBOR map
pub(crate) fn map_get<'a>(map: &'a [(Value, Value)], key: &str) -> Option<&'a Value> {
    map.iter()
        .find(|(k, _)| k.as_text() == Some(key))
        .map(|(_, v)| v)
}

/// Look up an integer label in a CBOR map (COSE keys)
pub(crate) fn map_get_label(map: &[(Value, Value)], label: i64) -> Option<&Value> {
    map.iter()
        .find(|(k, _)| as_i64(k) == Some(label))
        .map(|(_, v)| v)
}

/// Read a CBOR integer as `i64`
pub(crate) fn as_i64(value: &Value) -> Option<i64> {
    value.as_integer().and_then(|i| i64::try_from(i).ok())
}
