use std::io;

use ciborium::de::Error as CiboriumError;

use super::{CborError, CborErrorKind, DecodeLimits, Value};

const TAG_BIGPOS: u64 = 2;
const TAG_BIGNEG: u64 = 3;

/// Byte-slice reader that remembers how far ciborium got.
///
/// ciborium reports I/O failures without an offset, so truncation offsets and
/// the consumed length of a prefix item both come from here.
struct SliceReader<'a> {
    input: &'a [u8],
    pos: usize,
}

impl io::Read for SliceReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = &self.input[self.pos..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }
}

/// Decode one item from the front of `input` and validate it.
///
/// Returns the item and the number of bytes it occupied. Errors found while
/// validating the decoded tree (duplicate keys, item count, tag payloads)
/// carry the offset of the item itself.
pub(super) fn decode_item(input: &[u8], limits: DecodeLimits) -> Result<(Value, usize), CborError> {
    let mut reader = SliceReader { input, pos: 0 };
    let raw: ciborium::Value =
        ciborium::de::from_reader_with_recursion_limit(&mut reader, limits.max_depth)
            .map_err(|err| map_error(err, reader.pos))?;

    let mut walk = Walk { items: 0, limits };
    let value = walk.convert(raw).map_err(|kind| CborError::new(0, kind))?;
    Ok((value, reader.pos))
}

fn map_error(err: CiboriumError<io::Error>, position: usize) -> CborError {
    match err {
        // A slice reader only fails when it runs out of input.
        CiboriumError::Io(_) => CborError::new(position, CborErrorKind::Truncated),
        CiboriumError::Syntax(offset) => CborError::new(offset, CborErrorKind::Malformed),
        CiboriumError::Semantic(offset, reason) => {
            CborError::new(offset.unwrap_or(position), CborErrorKind::Invalid(reason))
        }
        CiboriumError::RecursionLimitExceeded => {
            CborError::new(position, CborErrorKind::DepthLimitExceeded)
        }
    }
}

/// Post-decode pass: converts ciborium's tree and enforces what ciborium
/// lets through.
struct Walk {
    items: usize,
    limits: DecodeLimits,
}

impl Walk {
    fn convert(&mut self, raw: ciborium::Value) -> Result<Value, CborErrorKind> {
        self.items += 1;
        if self.items > self.limits.max_items {
            return Err(CborErrorKind::ItemLimitExceeded);
        }

        Ok(match raw {
            ciborium::Value::Integer(int) => integer(i128::from(int)),
            ciborium::Value::Bytes(bytes) => Value::Bytes(bytes),
            ciborium::Value::Text(text) => Value::Text(text),
            ciborium::Value::Float(float) => Value::Float(float),
            ciborium::Value::Bool(flag) => Value::Bool(flag),
            ciborium::Value::Null => Value::Null,
            ciborium::Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| self.convert(item))
                    .collect::<Result<_, _>>()?,
            ),
            ciborium::Value::Map(entries) => {
                let mut map: Vec<(Value, Value)> = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = self.convert(key)?;
                    if map.iter().any(|(existing, _)| *existing == key) {
                        return Err(CborErrorKind::DuplicateMapKey);
                    }
                    let value = self.convert(value)?;
                    map.push((key, value));
                }
                Value::Map(map)
            }
            ciborium::Value::Tag(tag, inner) => {
                let inner = self.convert(*inner)?;
                check_tag_payload(tag, &inner)?;
                Value::Tag(tag, Box::new(inner))
            }
            _ => return Err(CborErrorKind::Invalid("unsupported data item".into())),
        })
    }
}

/// ciborium folds small bignums into integers; anything outside the 64-bit
/// CBOR integer range goes back to a bignum tag.
fn integer(n: i128) -> Value {
    if n >= 0 {
        match u64::try_from(n) {
            Ok(n) => Value::Unsigned(n),
            Err(_) => bignum(TAG_BIGPOS, n as u128),
        }
    } else {
        let magnitude = -1 - n;
        match u64::try_from(magnitude) {
            Ok(n) => Value::Negative(n),
            Err(_) => bignum(TAG_BIGNEG, magnitude as u128),
        }
    }
}

fn bignum(tag: u64, magnitude: u128) -> Value {
    let bytes = magnitude.to_be_bytes();
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    Value::Tag(tag, Box::new(Value::Bytes(bytes[first..].to_vec())))
}

fn check_tag_payload(tag: u64, inner: &Value) -> Result<(), CborErrorKind> {
    let valid = match tag {
        0 | 32 | 33 | 34 | 35 | 36 => matches!(inner, Value::Text(_)),
        1 => matches!(
            inner,
            Value::Unsigned(_) | Value::Negative(_) | Value::Float(_)
        ),
        TAG_BIGPOS | TAG_BIGNEG | 24 => matches!(inner, Value::Bytes(_)),
        4 | 5 => matches!(inner, Value::Array(items) if items.len() == 2),
        _ => true,
    };
    if valid {
        Ok(())
    } else {
        Err(CborErrorKind::InvalidTagPayload(tag))
    }
}
