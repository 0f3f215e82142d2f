//! Strict CBOR (RFC 8949) decoding for attestation objects and COSE keys.
//!
//! Parsing is done by `ciborium`. Authenticator output is attacker-influenced,
//! so the decoded tree then goes through a validating pass that a plain serde
//! backend does not do:
//!
//! - every error carries a byte offset
//! - duplicate map keys are rejected instead of silently resolved
//! - nesting depth and total item count are bounded by [`DecodeLimits`]
//! - tags with a well-known payload type (dates, bignums, embedded CBOR) are checked
//!
//! ```
//! use keyward_core::cbor::{self, Value};
//!
//! // {"fmt": "none"}
//! let bytes = [0xa1, 0x63, b'f', b'm', b't', 0x64, b'n', b'o', b'n', b'e'];
//! let value = cbor::decode(&bytes).unwrap();
//! assert_eq!(value.map_get_text("fmt").and_then(Value::as_text), Some("none"));
//! ```

mod decoder;

use std::fmt;

use thiserror::Error;

/// Default maximum container nesting depth.
pub const DEFAULT_MAX_DEPTH: usize = 16;

/// Default maximum number of data items in one document.
pub const DEFAULT_MAX_ITEMS: usize = 4096;

/// Ceilings applied while decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeLimits {
    /// Maximum nesting of arrays, maps and tags.
    pub max_depth: usize,
    /// Maximum number of data items, containers included.
    pub max_items: usize,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_items: DEFAULT_MAX_ITEMS,
        }
    }
}

/// Why decoding stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CborErrorKind {
    Truncated,
    /// Not well-formed CBOR (reserved header values, bad UTF-8, bad chunks).
    Malformed,
    /// Well-formed but not representable, e.g. an unassigned simple value.
    Invalid(String),
    DuplicateMapKey,
    DepthLimitExceeded,
    ItemLimitExceeded,
    InvalidTagPayload(u64),
    TrailingBytes,
}

impl fmt::Display for CborErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "unexpected end of input"),
            Self::Malformed => write!(f, "malformed encoding"),
            Self::Invalid(reason) => write!(f, "invalid data item: {reason}"),
            Self::DuplicateMapKey => write!(f, "duplicate map key"),
            Self::DepthLimitExceeded => write!(f, "nesting depth limit exceeded"),
            Self::ItemLimitExceeded => write!(f, "item count limit exceeded"),
            Self::InvalidTagPayload(tag) => write!(f, "invalid payload for tag {tag}"),
            Self::TrailingBytes => write!(f, "trailing bytes after top-level item"),
        }
    }
}

/// A decode failure and the byte offset it occurred at.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} at byte {offset}")]
pub struct CborError {
    pub offset: usize,
    pub kind: CborErrorKind,
}

impl CborError {
    pub(crate) fn new(offset: usize, kind: CborErrorKind) -> Self {
        Self { offset, kind }
    }
}

/// A decoded CBOR data item.
///
/// Maps keep their encoded order; lookups are linear, which is fine for the
/// handful of keys in attestation statements and COSE keys.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unsigned(u64),
    /// Negative integer stored as `n` where the value is `-1 - n`.
    Negative(u64),
    Bytes(Vec<u8>),
    Text(String),
    Array(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Tag(u64, Box<Value>),
    Bool(bool),
    /// `null`; `undefined` decodes to this as well.
    Null,
    Float(f64),
}

impl Value {
    /// Integer value, if this is an integer that fits in `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Unsigned(n) => i64::try_from(n).ok(),
            Value::Negative(n) => i64::try_from(n).ok().map(|n| -1 - n),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// Look up a text key in a map.
    pub fn map_get_text(&self, key: &str) -> Option<&Value> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k.as_text() == Some(key))
            .map(|(_, v)| v)
    }

    /// Look up an integer key in a map.
    pub fn map_get_int(&self, key: i64) -> Option<&Value> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k.as_i64() == Some(key))
            .map(|(_, v)| v)
    }
}

/// Decode exactly one data item; trailing bytes are an error.
pub fn decode(bytes: &[u8]) -> Result<Value, CborError> {
    decode_with_limits(bytes, DecodeLimits::default())
}

/// Decode exactly one data item under explicit limits.
pub fn decode_with_limits(bytes: &[u8], limits: DecodeLimits) -> Result<Value, CborError> {
    let (value, consumed) = decoder::decode_item(bytes, limits)?;
    if consumed != bytes.len() {
        return Err(CborError::new(consumed, CborErrorKind::TrailingBytes));
    }
    Ok(value)
}

/// Decode one data item from the front of `bytes`, returning it with the
/// number of bytes consumed.
///
/// Used where a CBOR item is embedded in a larger binary structure, such as the
/// credential public key inside authenticator data.
pub fn decode_prefix(bytes: &[u8], limits: DecodeLimits) -> Result<(Value, usize), CborError> {
    decoder::decode_item(bytes, limits)
}
