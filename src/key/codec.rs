//! Order-preserving composite key encoding.
//!
//! Each key column is encoded so that byte-wise comparison of encoded keys
//! matches the typed ordering of the value tuples:
//!
//! * booleans are one byte, `0x00` or `0x01`;
//! * signed integers are big-endian with the sign bit flipped;
//! * floats flip the sign bit of non-negative values and invert every bit of
//!   negative values;
//! * strings and binaries escape `0x00` as `0x00 0xFF` and end with the
//!   terminator `0x00 0x01`, so a shorter value sorts before its extensions.
//!
//! A key is the concatenation of its column encodings in key order. A byte
//! string that stops cleanly after column `k` is a valid prefix: the missing
//! trailing columns are open.

use std::sync::Arc;

use thiserror::Error;

use super::KeyValue;
use crate::schema::ColumnType;

const SIGN_FLIP_32: u32 = 1 << 31;
const SIGN_FLIP_64: u64 = 1 << 63;
const ESCAPE: u8 = 0x00;
const ESCAPED_ZERO: u8 = 0xFF;
const TERMINATOR: u8 = 0x01;

/// Errors raised while encoding key values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyEncodeError {
    /// More values than key columns were supplied.
    #[error("{given} values supplied for a {columns}-column key")]
    TooManyValues {
        /// Values supplied.
        given: usize,
        /// Key columns declared.
        columns: usize,
    },
    /// A value does not match the column type at its position.
    #[error("key column {dimension} expects {expected}, got {found}")]
    TypeMismatch {
        /// Key position.
        dimension: usize,
        /// Declared type.
        expected: ColumnType,
        /// Type of the supplied value.
        found: ColumnType,
    },
}

/// Errors raised while decoding key bytes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyDecodeError {
    /// A fixed-width column was cut short.
    #[error("key column {dimension} at offset {offset} needs {needed} bytes, {available} left")]
    Truncated {
        /// Key position.
        dimension: usize,
        /// Byte offset of the column.
        offset: usize,
        /// Bytes required.
        needed: usize,
        /// Bytes remaining.
        available: usize,
    },
    /// A variable-width column has no terminator.
    #[error("key column {dimension} at offset {offset} is unterminated")]
    Unterminated {
        /// Key position.
        dimension: usize,
        /// Byte offset of the column.
        offset: usize,
    },
    /// An escape byte is followed by an unknown marker.
    #[error("key column {dimension} has invalid escape 0x{byte:02x} at offset {offset}")]
    InvalidEscape {
        /// Key position.
        dimension: usize,
        /// Byte offset of the marker.
        offset: usize,
        /// Marker byte.
        byte: u8,
    },
    /// A boolean byte is neither `0x00` nor `0x01`.
    #[error("key column {dimension} has invalid boolean byte 0x{byte:02x} at offset {offset}")]
    InvalidBoolean {
        /// Key position.
        dimension: usize,
        /// Byte offset.
        offset: usize,
        /// Offending byte.
        byte: u8,
    },
    /// A string column holds invalid UTF-8.
    #[error("key column {dimension} at offset {offset} is not valid utf-8")]
    InvalidUtf8 {
        /// Key position.
        dimension: usize,
        /// Byte offset of the column.
        offset: usize,
    },
    /// Bytes remain after the last key column.
    #[error("{remaining} trailing bytes after the last key column at offset {offset}")]
    TrailingBytes {
        /// Offset of the first trailing byte.
        offset: usize,
        /// Number of trailing bytes.
        remaining: usize,
    },
    /// A full key was required but only a prefix was present.
    #[error("key holds {present} of {expected} columns")]
    Incomplete {
        /// Columns present.
        present: usize,
        /// Columns declared.
        expected: usize,
    },
}

/// Byte span of one encoded column inside a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeySpan {
    /// Offset of the first byte.
    pub offset: usize,
    /// Encoded length, including any terminator.
    pub len: usize,
}

impl KeySpan {
    /// Offset one past the last byte.
    pub fn end(&self) -> usize {
        self.offset + self.len
    }
}

/// Typed values decoded from a (possibly partial) key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedKey {
    values: Vec<KeyValue>,
    columns: usize,
}

impl DecodedKey {
    /// Number of columns present.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no column is present.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether every key column is present.
    pub fn is_complete(&self) -> bool {
        self.values.len() == self.columns
    }

    /// Value at key position `dimension`; `None` when that column is open.
    pub fn get(&self, dimension: usize) -> Option<&KeyValue> {
        self.values.get(dimension)
    }

    /// Present values in key order.
    pub fn values(&self) -> &[KeyValue] {
        &self.values
    }

    /// Consumes the key, requiring every column to be present.
    pub fn into_complete(self) -> Result<Vec<KeyValue>, KeyDecodeError> {
        if self.is_complete() {
            Ok(self.values)
        } else {
            Err(KeyDecodeError::Incomplete {
                present: self.values.len(),
                expected: self.columns,
            })
        }
    }

    /// Consumes the key, returning the present values.
    pub fn into_values(self) -> Vec<KeyValue> {
        self.values
    }
}

/// Encoder/decoder for one table's composite keys.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyCodec {
    types: Arc<[ColumnType]>,
}

impl KeyCodec {
    /// Codec for keys with the given column types, in key order.
    pub fn new(types: impl Into<Arc<[ColumnType]>>) -> Self {
        Self {
            types: types.into(),
        }
    }

    /// Column types in key order.
    pub fn types(&self) -> &[ColumnType] {
        &self.types
    }

    /// Encodes a full key or a key prefix.
    pub fn encode(&self, values: &[KeyValue]) -> Result<Vec<u8>, KeyEncodeError> {
        let mut out = Vec::new();
        self.encode_into(values, &mut out)?;
        Ok(out)
    }

    /// Appends the encoding of `values` (a full key or a prefix) to `out`.
    pub fn encode_into(&self, values: &[KeyValue], out: &mut Vec<u8>) -> Result<(), KeyEncodeError> {
        if values.len() > self.types.len() {
            return Err(KeyEncodeError::TooManyValues {
                given: values.len(),
                columns: self.types.len(),
            });
        }
        for (dimension, (value, expected)) in values.iter().zip(self.types.iter()).enumerate() {
            if value.column_type() != *expected {
                return Err(KeyEncodeError::TypeMismatch {
                    dimension,
                    expected: *expected,
                    found: value.column_type(),
                });
            }
            encode_value(value, out);
        }
        Ok(())
    }

    /// Locates each present column inside `bytes`.
    pub fn decode_spans(&self, bytes: &[u8]) -> Result<Vec<KeySpan>, KeyDecodeError> {
        let mut spans = Vec::with_capacity(self.types.len());
        let mut offset = 0;
        for (dimension, ty) in self.types.iter().enumerate() {
            if offset == bytes.len() {
                break;
            }
            let len = span_len(*ty, bytes, offset, dimension)?;
            spans.push(KeySpan { offset, len });
            offset += len;
        }
        if offset < bytes.len() {
            return Err(KeyDecodeError::TrailingBytes {
                offset,
                remaining: bytes.len() - offset,
            });
        }
        Ok(spans)
    }

    /// Decodes a full key or a key prefix into typed values.
    pub fn decode(&self, bytes: &[u8]) -> Result<DecodedKey, KeyDecodeError> {
        let spans = self.decode_spans(bytes)?;
        let mut values = Vec::with_capacity(spans.len());
        for (dimension, (span, ty)) in spans.iter().zip(self.types.iter()).enumerate() {
            values.push(decode_value(*ty, &bytes[span.offset..span.end()], span.offset, dimension)?);
        }
        Ok(DecodedKey {
            values,
            columns: self.types.len(),
        })
    }
}

/// Appends the order-preserving encoding of a single value.
pub fn encode_value(value: &KeyValue, out: &mut Vec<u8>) {
    match value {
        KeyValue::Boolean(v) => out.push(u8::from(*v)),
        KeyValue::Int32(v) => out.extend_from_slice(&((*v as u32) ^ SIGN_FLIP_32).to_be_bytes()),
        KeyValue::Int64(v) => out.extend_from_slice(&((*v as u64) ^ SIGN_FLIP_64).to_be_bytes()),
        KeyValue::Float64(v) => {
            let v = if *v == 0.0 { 0.0 } else { *v };
            let bits = v.to_bits();
            let ordered = if bits & SIGN_FLIP_64 != 0 {
                !bits
            } else {
                bits ^ SIGN_FLIP_64
            };
            out.extend_from_slice(&ordered.to_be_bytes());
        }
        KeyValue::Utf8(v) => encode_escaped(v.as_bytes(), out),
        KeyValue::Binary(v) => encode_escaped(v, out),
    }
}

fn encode_escaped(bytes: &[u8], out: &mut Vec<u8>) {
    for byte in bytes {
        out.push(*byte);
        if *byte == ESCAPE {
            out.push(ESCAPED_ZERO);
        }
    }
    out.push(ESCAPE);
    out.push(TERMINATOR);
}

fn span_len(
    ty: ColumnType,
    bytes: &[u8],
    offset: usize,
    dimension: usize,
) -> Result<usize, KeyDecodeError> {
    let fixed = match ty {
        ColumnType::Boolean => Some(1),
        ColumnType::Int32 => Some(4),
        ColumnType::Int64 | ColumnType::Float64 => Some(8),
        ColumnType::Utf8 | ColumnType::Binary => None,
    };
    let available = bytes.len() - offset;
    if let Some(needed) = fixed {
        if available < needed {
            return Err(KeyDecodeError::Truncated {
                dimension,
                offset,
                needed,
                available,
            });
        }
        return Ok(needed);
    }

    let mut cursor = offset;
    while cursor < bytes.len() {
        if bytes[cursor] != ESCAPE {
            cursor += 1;
            continue;
        }
        match bytes.get(cursor + 1) {
            Some(&TERMINATOR) => return Ok(cursor + 2 - offset),
            Some(&ESCAPED_ZERO) => cursor += 2,
            Some(&byte) => {
                return Err(KeyDecodeError::InvalidEscape {
                    dimension,
                    offset: cursor + 1,
                    byte,
                })
            }
            None => break,
        }
    }
    Err(KeyDecodeError::Unterminated { dimension, offset })
}

fn decode_value(
    ty: ColumnType,
    encoded: &[u8],
    offset: usize,
    dimension: usize,
) -> Result<KeyValue, KeyDecodeError> {
    let value = match ty {
        ColumnType::Boolean => match fixed_width::<1>(encoded, offset, dimension)? {
            [0] => KeyValue::Boolean(false),
            [1] => KeyValue::Boolean(true),
            [byte] => {
                return Err(KeyDecodeError::InvalidBoolean {
                    dimension,
                    offset,
                    byte,
                })
            }
        },
        ColumnType::Int32 => {
            let raw = u32::from_be_bytes(fixed_width(encoded, offset, dimension)?);
            KeyValue::Int32((raw ^ SIGN_FLIP_32) as i32)
        }
        ColumnType::Int64 => {
            let raw = u64::from_be_bytes(fixed_width(encoded, offset, dimension)?);
            KeyValue::Int64((raw ^ SIGN_FLIP_64) as i64)
        }
        ColumnType::Float64 => {
            let raw = u64::from_be_bytes(fixed_width(encoded, offset, dimension)?);
            let bits = if raw & SIGN_FLIP_64 != 0 {
                raw ^ SIGN_FLIP_64
            } else {
                !raw
            };
            KeyValue::float64(f64::from_bits(bits))
        }
        ColumnType::Utf8 => {
            let raw = unescape(encoded);
            let text = String::from_utf8(raw)
                .map_err(|_| KeyDecodeError::InvalidUtf8 { dimension, offset })?;
            KeyValue::Utf8(text)
        }
        ColumnType::Binary => KeyValue::Binary(unescape(encoded)),
    };
    Ok(value)
}

fn fixed_width<const N: usize>(
    encoded: &[u8],
    offset: usize,
    dimension: usize,
) -> Result<[u8; N], KeyDecodeError> {
    let Ok(bytes) = <[u8; N]>::try_from(encoded) else {
        return Err(KeyDecodeError::Truncated {
            dimension,
            offset,
            needed: N,
            available: encoded.len(),
        });
    };
    Ok(bytes)
}

// `encoded` is a validated span that ends with the terminator.
fn unescape(encoded: &[u8]) -> Vec<u8> {
    let body = &encoded[..encoded.len() - 2];
    let mut out = Vec::with_capacity(body.len());
    let mut idx = 0;
    while idx < body.len() {
        out.push(body[idx]);
        idx += if body[idx] == ESCAPE { 2 } else { 1 };
    }
    out
}

/// Smallest byte string greater than every string starting with `prefix`.
///
/// Returns `None` when no such string exists (empty or all-`0xFF` prefix),
/// meaning the range is unbounded above.
pub fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let keep = prefix.iter().rposition(|byte| *byte != u8::MAX)?;
    let mut out = prefix[..=keep].to_vec();
    out[keep] += 1;
    Some(out)
}
