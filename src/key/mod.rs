//! Typed key values and the composite row-key codec.

mod codec;
mod value;

pub use codec::{
    encode_value, prefix_successor, DecodedKey, KeyCodec, KeyDecodeError, KeyEncodeError,
    KeySpan,
};
pub use value::KeyValue;

use crate::schema::TableSchema;

/// Decodes raw row-key bytes into typed values using the table's key layout.
///
/// Partial keys decode to the columns they contain; trailing columns are open.
pub fn decode_key(bytes: &[u8], schema: &TableSchema) -> Result<DecodedKey, KeyDecodeError> {
    schema.key_codec().decode(bytes)
}

/// Encodes a full key or key prefix using the table's key layout.
pub fn encode_key(values: &[KeyValue], schema: &TableSchema) -> Result<Vec<u8>, KeyEncodeError> {
    schema.key_codec().encode(values)
}
