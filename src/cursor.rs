//! # Cursor Utilities
//!
//! This module provides utilities for encoding and decoding opaque pagination
//! cursors with validation and size limits.

use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MAX_ENCODED_LEN: usize = 1000;
const MAX_DECODED_LEN: usize = 500;
const CURSOR_VERSION: u8 = 1;

/// Errors produced while decoding a cursor
#[derive(Debug, Error)]
pub enum CursorError {
    #[error("cursor cannot be empty")]
    Empty,
    #[error("cursor is too long")]
    TooLong,
    #[error("cursor contains invalid characters")]
    InvalidCharacters,
    #[error("cursor is not valid base64")]
    InvalidBase64,
    #[error("decoded cursor is too large")]
    DecodedTooLarge,
    #[error("cursor contains invalid UTF-8 data")]
    InvalidUtf8,
    #[error("cursor contains invalid JSON structure")]
    InvalidJson,
    #[error("unsupported cursor version {0}")]
    UnsupportedVersion(u8),
}

/// Versioned cursor payload: a small JSON object of ordering keys
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenericCursor {
    pub version: u8,
    pub keys: serde_json::Value,
}

/// Encode ordering keys as an opaque base64 cursor string
pub fn encode_generic_cursor(keys: serde_json::Value) -> String {
    let cursor = GenericCursor {
        version: CURSOR_VERSION,
        keys,
    };
    let json = serde_json::to_string(&cursor).expect("cursor serializes");
    base64::engine::general_purpose::STANDARD.encode(json.as_bytes())
}

/// Decode an opaque base64 cursor string with validation
pub fn decode_generic_cursor(cursor: &str) -> Result<GenericCursor, CursorError> {
    if cursor.is_empty() {
        return Err(CursorError::Empty);
    }
    if cursor.len() > MAX_ENCODED_LEN {
        return Err(CursorError::TooLong);
    }
    if !cursor
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=')
    {
        return Err(CursorError::InvalidCharacters);
    }

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(cursor)
        .map_err(|_| CursorError::InvalidBase64)?;

    if decoded.is_empty() {
        return Err(CursorError::Empty);
    }
    if decoded.len() > MAX_DECODED_LEN {
        return Err(CursorError::DecodedTooLarge);
    }

    let json = String::from_utf8(decoded).map_err(|_| CursorError::InvalidUtf8)?;
    let cursor: GenericCursor =
        serde_json::from_str(&json).map_err(|_| CursorError::InvalidJson)?;

    if cursor.version != CURSOR_VERSION {
        return Err(CursorError::UnsupportedVersion(cursor.version));
    }

    Ok(cursor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cursor_roundtrip() {
        let keys = json!({
            "last_message_at": "2025-06-01T12:00:00Z",
            "id": "550e8400-e29b-41d4-a716-446655440000"
        });

        let encoded = encode_generic_cursor(keys.clone());
        let decoded = decode_generic_cursor(&encoded).unwrap();

        assert_eq!(decoded.version, 1);
        assert_eq!(decoded.keys, keys);
    }

    #[test]
    fn test_empty_cursor() {
        assert!(matches!(decode_generic_cursor(""), Err(CursorError::Empty)));
    }

    #[test]
    fn test_cursor_too_long() {
        let long_cursor = "a".repeat(1001);
        assert!(matches!(
            decode_generic_cursor(&long_cursor),
            Err(CursorError::TooLong)
        ));
    }

    #[test]
    fn test_cursor_invalid_characters() {
        assert!(matches!(
            decode_generic_cursor("cursor@#$%"),
            Err(CursorError::InvalidCharacters)
        ));
    }

    #[test]
    fn test_cursor_invalid_utf8() {
        // base64 that decodes to invalid UTF-8
        assert!(matches!(
            decode_generic_cursor("//8="),
            Err(CursorError::InvalidUtf8)
        ));
    }

    #[test]
    fn test_cursor_invalid_json() {
        // "invalid json"
        assert!(matches!(
            decode_generic_cursor("aW52YWxpZCBqc29u"),
            Err(CursorError::InvalidJson)
        ));
    }

    #[test]
    fn test_cursor_decoded_too_large() {
        let large = json!({ "data": "x".repeat(600) }).to_string();
        let encoded = base64::engine::general_purpose::STANDARD.encode(large.as_bytes());
        assert!(matches!(
            decode_generic_cursor(&encoded),
            Err(CursorError::DecodedTooLarge)
        ));
    }

    #[test]
    fn test_cursor_unsupported_version() {
        let payload = json!({ "version": 9, "keys": {} }).to_string();
        let encoded = base64::engine::general_purpose::STANDARD.encode(payload.as_bytes());
        assert!(matches!(
            decode_generic_cursor(&encoded),
            Err(CursorError::UnsupportedVersion(9))
        ));
    }
}
