use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
};

use keyspan_predicate::ScalarValue;

use crate::schema::ColumnType;

/// Typed value of a single key (or value) column.
///
/// Ordering is total: floats compare with IEEE `totalOrder` after folding
/// `-0.0` into `+0.0`, which matches the byte order produced by the key codec.
#[derive(Clone, Debug)]
pub enum KeyValue {
    /// Boolean value.
    Boolean(bool),
    /// 32-bit signed integer.
    Int32(i32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit float.
    Float64(f64),
    /// UTF-8 string.
    Utf8(String),
    /// Binary blob.
    Binary(Vec<u8>),
}

impl KeyValue {
    /// Float value with `-0.0` folded into `+0.0`.
    #[must_use]
    pub fn float64(value: f64) -> Self {
        KeyValue::Float64(fold_zero(value))
    }

    /// Column type this value belongs to.
    #[must_use]
    pub fn column_type(&self) -> ColumnType {
        match self {
            KeyValue::Boolean(_) => ColumnType::Boolean,
            KeyValue::Int32(_) => ColumnType::Int32,
            KeyValue::Int64(_) => ColumnType::Int64,
            KeyValue::Float64(_) => ColumnType::Float64,
            KeyValue::Utf8(_) => ColumnType::Utf8,
            KeyValue::Binary(_) => ColumnType::Binary,
        }
    }

    /// Whether this is a float NaN.
    #[must_use]
    pub fn is_nan(&self) -> bool {
        matches!(self, KeyValue::Float64(v) if v.is_nan())
    }

    /// Converts back into a predicate literal.
    #[must_use]
    pub fn to_scalar(&self) -> ScalarValue {
        match self {
            KeyValue::Boolean(v) => ScalarValue::Boolean(*v),
            KeyValue::Int32(v) => ScalarValue::Int64(i64::from(*v)),
            KeyValue::Int64(v) => ScalarValue::Int64(*v),
            KeyValue::Float64(v) => ScalarValue::Float64(*v),
            KeyValue::Utf8(v) => ScalarValue::Utf8(v.clone()),
            KeyValue::Binary(v) => ScalarValue::Binary(v.clone()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            KeyValue::Boolean(_) => 0,
            KeyValue::Int32(_) => 1,
            KeyValue::Int64(_) => 2,
            KeyValue::Float64(_) => 3,
            KeyValue::Utf8(_) => 4,
            KeyValue::Binary(_) => 5,
        }
    }
}

fn fold_zero(value: f64) -> f64 {
    if value == 0.0 {
        0.0
    } else {
        value
    }
}

impl Ord for KeyValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyValue::Boolean(a), KeyValue::Boolean(b)) => a.cmp(b),
            (KeyValue::Int32(a), KeyValue::Int32(b)) => a.cmp(b),
            (KeyValue::Int64(a), KeyValue::Int64(b)) => a.cmp(b),
            (KeyValue::Float64(a), KeyValue::Float64(b)) => {
                fold_zero(*a).total_cmp(&fold_zero(*b))
            }
            (KeyValue::Utf8(a), KeyValue::Utf8(b)) => a.cmp(b),
            (KeyValue::Binary(a), KeyValue::Binary(b)) => a.cmp(b),
            // Mixed variants never share a column; order them by variant.
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for KeyValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for KeyValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyValue {}

impl Hash for KeyValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            KeyValue::Boolean(v) => v.hash(state),
            KeyValue::Int32(v) => v.hash(state),
            KeyValue::Int64(v) => v.hash(state),
            KeyValue::Float64(v) => fold_zero(*v).to_bits().hash(state),
            KeyValue::Utf8(v) => v.hash(state),
            KeyValue::Binary(v) => v.hash(state),
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.to_scalar().fmt(f)
    }
}
