//! Common helpers for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;

use arrow_schema::{DataType, Field, Schema};
use keyspan::{
    schema::{FAMILY_METADATA, KEY_ORDER_METADATA},
    ColumnRef, ComparisonOp, KeyValue, Partition, Predicate, ScalarValue, TableSchema,
};

/// Builds a table schema from Arrow fields, marking `key` columns in order and
/// placing every other column in family `cf`.
pub fn schema_with_key(fields: Vec<(&str, DataType)>, key: &[&str]) -> TableSchema {
    let fields: Vec<Field> = fields
        .into_iter()
        .map(|(name, data_type)| {
            let metadata = match key.iter().position(|k| *k == name) {
                Some(order) => HashMap::from([(KEY_ORDER_METADATA.to_string(), order.to_string())]),
                None => HashMap::from([(FAMILY_METADATA.to_string(), "cf".to_string())]),
            };
            Field::new(name, data_type, true).with_metadata(metadata)
        })
        .collect();
    TableSchema::from_arrow("t", "ns:t", &Schema::new(fields)).expect("schema should build")
}

/// Shorthand for `column op literal`.
pub fn cmp(column: &str, op: ComparisonOp, value: impl Into<ScalarValue>) -> Predicate {
    Predicate::compare(ColumnRef::new(column), op, value.into())
}

/// Encodes a full key or key prefix.
pub fn key(schema: &TableSchema, values: &[KeyValue]) -> Vec<u8> {
    keyspan::encode_key(values, schema).expect("key should encode")
}

/// Partitions split at the given encoded keys, covering the whole keyspace.
pub fn split_at(splits: Vec<Vec<u8>>) -> Vec<Partition> {
    let mut bounds: Vec<Option<Vec<u8>>> = Vec::with_capacity(splits.len() + 2);
    bounds.push(None);
    bounds.extend(splits.into_iter().map(Some));
    bounds.push(None);
    bounds
        .windows(2)
        .enumerate()
        .map(|(index, pair)| Partition::new(index, pair[0].clone(), pair[1].clone()))
        .collect()
}
