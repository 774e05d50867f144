//! Table schema: composite key columns and value columns.
//!
//! A table declares an ordered set of key columns whose encoded values,
//! concatenated in key order, form the storage row key. Every other column
//! lives in a `(family, qualifier)` slot of the storage tier. Column types are
//! declared with Arrow [`DataType`]s and bound once, at build time, to the
//! closed [`ColumnType`] set understood by the key codec and the planners.

use std::{collections::HashMap, fmt, sync::Arc};

use arrow_schema::{DataType, Field, Schema};
use keyspan_predicate::ScalarValue;
use thiserror::Error;

use crate::key::{KeyCodec, KeyValue};

/// Field metadata key carrying a key column's position in the composite key.
pub const KEY_ORDER_METADATA: &str = "keyspan.key_order";
/// Field metadata key carrying a value column's family.
pub const FAMILY_METADATA: &str = "keyspan.family";
/// Field metadata key carrying a value column's qualifier.
pub const QUALIFIER_METADATA: &str = "keyspan.qualifier";

/// Closed set of column types supported by the key codec and planners.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// Boolean column.
    Boolean,
    /// 32-bit signed integer column.
    Int32,
    /// 64-bit signed integer column.
    Int64,
    /// 64-bit float column.
    Float64,
    /// UTF-8 string column.
    Utf8,
    /// Binary column.
    Binary,
}

impl ColumnType {
    /// Binds an Arrow data type to a supported column type.
    #[must_use]
    pub fn from_data_type(data_type: &DataType) -> Option<Self> {
        match data_type {
            DataType::Boolean => Some(ColumnType::Boolean),
            DataType::Int32 => Some(ColumnType::Int32),
            DataType::Int64 => Some(ColumnType::Int64),
            DataType::Float64 => Some(ColumnType::Float64),
            DataType::Utf8 | DataType::LargeUtf8 => Some(ColumnType::Utf8),
            DataType::Binary | DataType::LargeBinary => Some(ColumnType::Binary),
            _ => None,
        }
    }

    /// Arrow data type corresponding to this column type.
    #[must_use]
    pub fn data_type(self) -> DataType {
        match self {
            ColumnType::Boolean => DataType::Boolean,
            ColumnType::Int32 => DataType::Int32,
            ColumnType::Int64 => DataType::Int64,
            ColumnType::Float64 => DataType::Float64,
            ColumnType::Utf8 => DataType::Utf8,
            ColumnType::Binary => DataType::Binary,
        }
    }

    /// Whether every value of the type has a well-defined successor and predecessor.
    #[must_use]
    pub fn is_discrete(self) -> bool {
        matches!(
            self,
            ColumnType::Boolean | ColumnType::Int32 | ColumnType::Int64
        )
    }

    /// Converts a predicate literal into a typed key value for this column.
    ///
    /// Returns `None` for `NULL`, NaN, mismatched variants, and integers that
    /// do not fit the column width. Such literals can never be used to bound a
    /// scan and stay in the residual predicate.
    #[must_use]
    pub fn coerce(self, value: &ScalarValue) -> Option<KeyValue> {
        match (self, value) {
            (ColumnType::Boolean, ScalarValue::Boolean(v)) => Some(KeyValue::Boolean(*v)),
            (ColumnType::Int32, ScalarValue::Int64(v)) => {
                i32::try_from(*v).ok().map(KeyValue::Int32)
            }
            (ColumnType::Int64, ScalarValue::Int64(v)) => Some(KeyValue::Int64(*v)),
            (ColumnType::Float64, ScalarValue::Float64(v)) if !v.is_nan() => {
                Some(KeyValue::float64(*v))
            }
            (ColumnType::Utf8, ScalarValue::Utf8(v)) => Some(KeyValue::Utf8(v.clone())),
            (ColumnType::Binary, ScalarValue::Binary(v)) => Some(KeyValue::Binary(v.clone())),
            _ => None,
        }
    }

    /// Smallest value strictly greater than `value`, for discrete types.
    #[must_use]
    pub fn successor(self, value: &KeyValue) -> Option<KeyValue> {
        match (self, value) {
            (ColumnType::Boolean, KeyValue::Boolean(false)) => Some(KeyValue::Boolean(true)),
            (ColumnType::Int32, KeyValue::Int32(v)) => v.checked_add(1).map(KeyValue::Int32),
            (ColumnType::Int64, KeyValue::Int64(v)) => v.checked_add(1).map(KeyValue::Int64),
            _ => None,
        }
    }

    /// Largest value strictly smaller than `value`, for discrete types.
    #[must_use]
    pub fn predecessor(self, value: &KeyValue) -> Option<KeyValue> {
        match (self, value) {
            (ColumnType::Boolean, KeyValue::Boolean(true)) => Some(KeyValue::Boolean(false)),
            (ColumnType::Int32, KeyValue::Int32(v)) => v.checked_sub(1).map(KeyValue::Int32),
            (ColumnType::Int64, KeyValue::Int64(v)) => v.checked_sub(1).map(KeyValue::Int64),
            _ => None,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Boolean => "boolean",
            ColumnType::Int32 => "int32",
            ColumnType::Int64 => "int64",
            ColumnType::Float64 => "float64",
            ColumnType::Utf8 => "utf8",
            ColumnType::Binary => "binary",
        };
        f.write_str(name)
    }
}

/// Where a column's values live in the storage tier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ColumnRole {
    /// Part of the composite row key, at the given position.
    Key {
        /// Zero-based position within the composite key.
        order: usize,
    },
    /// Stored in a `(family, qualifier)` cell.
    Value {
        /// Column family.
        family: Arc<str>,
        /// Qualifier within the family.
        qualifier: Arc<str>,
    },
}

/// A declared column, before the schema binds it.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnDef {
    name: Arc<str>,
    data_type: DataType,
    role: ColumnRole,
}

impl ColumnDef {
    /// Declares a key column at position `order` of the composite key.
    pub fn key(name: impl Into<Arc<str>>, data_type: DataType, order: usize) -> Self {
        Self {
            name: name.into(),
            data_type,
            role: ColumnRole::Key { order },
        }
    }

    /// Declares a value column stored under `family:qualifier`.
    pub fn value(
        name: impl Into<Arc<str>>,
        data_type: DataType,
        family: impl Into<Arc<str>>,
        qualifier: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            name: name.into(),
            data_type,
            role: ColumnRole::Value {
                family: family.into(),
                qualifier: qualifier.into(),
            },
        }
    }

    /// Column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared Arrow type.
    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    /// Storage role.
    pub fn role(&self) -> &ColumnRole {
        &self.role
    }
}

/// A column bound into a [`TableSchema`].
#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    def: ColumnDef,
    column_type: ColumnType,
    index: usize,
}

impl Column {
    /// Column name.
    pub fn name(&self) -> &str {
        &self.def.name
    }

    /// Declared Arrow type.
    pub fn data_type(&self) -> &DataType {
        &self.def.data_type
    }

    /// Bound column type.
    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    /// Storage role.
    pub fn role(&self) -> &ColumnRole {
        &self.def.role
    }

    /// Position of the column in declaration order.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Key position when this is a key column.
    pub fn key_order(&self) -> Option<usize> {
        match self.def.role {
            ColumnRole::Key { order } => Some(order),
            ColumnRole::Value { .. } => None,
        }
    }
}

/// Errors raised while building a [`TableSchema`].
#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    /// The schema declares no key column.
    #[error("table `{table}` declares no key column")]
    NoKeyColumns {
        /// Table name.
        table: String,
    },
    /// Two columns share a name.
    #[error("duplicate column `{name}`")]
    DuplicateColumn {
        /// Offending column name.
        name: String,
    },
    /// Key orders are not exactly `0..n`.
    #[error("key column order {found} where {expected} was expected")]
    NonContiguousKeyOrder {
        /// Expected position.
        expected: usize,
        /// Position found after sorting.
        found: usize,
    },
    /// The column type is outside the supported set.
    #[error("column `{column}` has unsupported type {data_type}")]
    UnsupportedType {
        /// Column name.
        column: String,
        /// Declared Arrow type.
        data_type: DataType,
    },
    /// Arrow field metadata could not be interpreted.
    #[error("field `{field}` has invalid metadata: {reason}")]
    InvalidMetadata {
        /// Field name.
        field: String,
        /// Human readable reason.
        reason: String,
    },
}

/// Bound table schema shared by the pruning and pushdown passes.
#[derive(Clone, Debug)]
pub struct TableSchema {
    name: Arc<str>,
    storage_name: Arc<str>,
    columns: Vec<Column>,
    /// Column indices sorted by key order.
    key_columns: Vec<usize>,
    by_name: HashMap<Arc<str>, usize>,
    codec: KeyCodec,
}

impl TableSchema {
    /// Builds and validates a schema from column declarations.
    pub fn try_new(
        name: impl Into<Arc<str>>,
        storage_name: impl Into<Arc<str>>,
        defs: impl IntoIterator<Item = ColumnDef>,
    ) -> Result<Self, SchemaError> {
        let name = name.into();
        let mut columns = Vec::new();
        let mut by_name = HashMap::new();
        let mut keyed = Vec::new();
        for (index, def) in defs.into_iter().enumerate() {
            let column_type =
                ColumnType::from_data_type(&def.data_type).ok_or_else(|| {
                    SchemaError::UnsupportedType {
                        column: def.name.to_string(),
                        data_type: def.data_type.clone(),
                    }
                })?;
            if by_name.insert(Arc::clone(&def.name), index).is_some() {
                return Err(SchemaError::DuplicateColumn {
                    name: def.name.to_string(),
                });
            }
            if let ColumnRole::Key { order } = def.role {
                keyed.push((order, index));
            }
            columns.push(Column {
                def,
                column_type,
                index,
            });
        }

        if keyed.is_empty() {
            return Err(SchemaError::NoKeyColumns {
                table: name.to_string(),
            });
        }
        keyed.sort_unstable();
        for (expected, (found, _)) in keyed.iter().enumerate() {
            if *found != expected {
                return Err(SchemaError::NonContiguousKeyOrder {
                    expected,
                    found: *found,
                });
            }
        }
        let key_columns: Vec<usize> = keyed.into_iter().map(|(_, index)| index).collect();
        let codec = KeyCodec::new(
            key_columns
                .iter()
                .map(|index| columns[*index].column_type)
                .collect::<Vec<_>>(),
        );

        Ok(Self {
            name,
            storage_name: storage_name.into(),
            columns,
            key_columns,
            by_name,
            codec,
        })
    }

    /// Builds a schema from an Arrow schema annotated with field metadata.
    ///
    /// Key fields carry [`KEY_ORDER_METADATA`]; value fields carry
    /// [`FAMILY_METADATA`] and optionally [`QUALIFIER_METADATA`] (defaulting
    /// to the field name).
    pub fn from_arrow(
        name: impl Into<Arc<str>>,
        storage_name: impl Into<Arc<str>>,
        schema: &Schema,
    ) -> Result<Self, SchemaError> {
        let defs = schema
            .fields()
            .iter()
            .map(|field| column_def_from_field(field))
            .collect::<Result<Vec<_>, _>>()?;
        Self::try_new(name, storage_name, defs)
    }

    /// Logical table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the backing table in the storage tier.
    pub fn storage_name(&self) -> &str {
        &self.storage_name
    }

    /// Columns in declaration order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Looks up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.by_name.get(name).map(|index| &self.columns[*index])
    }

    /// Number of key columns.
    pub fn key_len(&self) -> usize {
        self.key_columns.len()
    }

    /// Key column at position `order`.
    pub fn key_column(&self, order: usize) -> Option<&Column> {
        self.key_columns.get(order).map(|index| &self.columns[*index])
    }

    /// Key position of the named column, if it is a key column.
    pub fn key_dimension(&self, name: &str) -> Option<usize> {
        self.column(name).and_then(Column::key_order)
    }

    /// Column type of the key column at position `order`.
    pub fn key_type(&self, order: usize) -> Option<ColumnType> {
        self.key_column(order).map(Column::column_type)
    }

    /// Codec for this table's composite row keys.
    pub fn key_codec(&self) -> &KeyCodec {
        &self.codec
    }

    /// Arrow schema describing the table, with key and storage metadata attached.
    pub fn to_arrow(&self) -> Schema {
        let fields: Vec<Field> = self
            .columns
            .iter()
            .map(|column| {
                let metadata = match column.role() {
                    ColumnRole::Key { order } => {
                        HashMap::from([(KEY_ORDER_METADATA.to_string(), order.to_string())])
                    }
                    ColumnRole::Value { family, qualifier } => HashMap::from([
                        (FAMILY_METADATA.to_string(), family.to_string()),
                        (QUALIFIER_METADATA.to_string(), qualifier.to_string()),
                    ]),
                };
                Field::new(
                    column.name(),
                    column.data_type().clone(),
                    column.key_order().is_none(),
                )
                .with_metadata(metadata)
            })
            .collect();
        Schema::new(fields)
    }
}

fn column_def_from_field(field: &Field) -> Result<ColumnDef, SchemaError> {
    let metadata = field.metadata();
    if let Some(order) = metadata.get(KEY_ORDER_METADATA) {
        let order = order
            .parse::<usize>()
            .map_err(|err| SchemaError::InvalidMetadata {
                field: field.name().clone(),
                reason: format!("{KEY_ORDER_METADATA}: {err}"),
            })?;
        return Ok(ColumnDef::key(
            field.name().as_str(),
            field.data_type().clone(),
            order,
        ));
    }
    let family = metadata
        .get(FAMILY_METADATA)
        .ok_or_else(|| SchemaError::InvalidMetadata {
            field: field.name().clone(),
            reason: format!("missing {KEY_ORDER_METADATA} or {FAMILY_METADATA}"),
        })?;
    let qualifier = metadata
        .get(QUALIFIER_METADATA)
        .map_or_else(|| field.name().as_str(), String::as_str);
    Ok(ColumnDef::value(
        field.name().as_str(),
        field.data_type().clone(),
        family.as_str(),
        qualifier,
    ))
}
