//! Cursor codec.
//!
//! A cursor token is `base64(json(last_evaluated_key))`, where the JSON is
//! the typed attribute-value map, e.g. `{"id":{"S":"a1"}}`. Decoding also
//! accepts plain document values (`{"id":"a1"}`), as produced by document
//! style clients.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Value};

use dynaquery_model::marshal::to_attribute_value;
use dynaquery_model::{AttributeValue, Key};

/// Errors raised while encoding or decoding a cursor token.
#[derive(Debug, thiserror::Error)]
pub enum CursorError {
    /// The token is not valid base64.
    #[error("Cursor is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    /// The decoded bytes are not a JSON key map.
    #[error("Cursor does not hold a key map: {0}")]
    Json(#[from] serde_json::Error),
    /// The decoded key map has no attributes.
    #[error("Cursor holds an empty key")]
    EmptyKey,
    /// A key attribute is not a string, number or binary value.
    #[error("Cursor attribute {field} is not a key value")]
    NotAKeyValue {
        /// The offending attribute.
        field: String,
    },
}

/// Encodes a continuation key as a cursor token.
///
/// # Errors
///
/// Returns [`CursorError::EmptyKey`] for an empty key; an empty key means
/// "no more data" and must not be handed out as a cursor.
pub fn encode_cursor(key: &Key) -> Result<String, CursorError> {
    if key.is_empty() {
        return Err(CursorError::EmptyKey);
    }
    let json = serde_json::to_vec(key)?;
    Ok(STANDARD.encode(json))
}

/// Decodes a cursor token, returning `None` for anything malformed.
#[must_use]
pub fn decode_cursor(token: &str) -> Option<Key> {
    try_decode_cursor(token).ok()
}

/// Decodes a cursor token, reporting why it is malformed.
///
/// # Errors
///
/// Returns a [`CursorError`] when the token is not base64, not a JSON
/// object, an empty object, or holds a value that cannot be a key.
pub fn try_decode_cursor(token: &str) -> Result<Key, CursorError> {
    let bytes = STANDARD.decode(token.trim())?;
    let body: Map<String, Value> = serde_json::from_slice(&bytes)?;
    if body.is_empty() {
        return Err(CursorError::EmptyKey);
    }
    body.iter()
        .map(|(field, value)| key_attribute(field, value))
        .collect()
}

fn key_attribute(field: &str, value: &Value) -> Result<(String, AttributeValue), CursorError> {
    // Key values are scalars, so an object can only be a typed attribute.
    let attribute = match value {
        Value::Object(_) => serde_json::from_value::<AttributeValue>(value.clone())?,
        plain => to_attribute_value(plain),
    };
    if !attribute.is_key_scalar() {
        return Err(CursorError::NotAKeyValue {
            field: field.to_owned(),
        });
    }
    Ok((field.to_owned(), attribute))
}
