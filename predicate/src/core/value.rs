use std::{cmp::Ordering, fmt};

/// Literal values accepted by predicate operands.
#[derive(Clone, Debug, PartialEq)]
pub enum ScalarValue {
    /// Represents SQL `NULL`.
    Null,
    /// Boolean literal.
    Boolean(bool),
    /// Signed 64-bit integer.
    Int64(i64),
    /// Unsigned 64-bit integer.
    UInt64(u64),
    /// 64-bit floating point.
    Float64(f64),
    /// UTF-8 string.
    Utf8(String),
    /// Binary blob.
    Binary(Vec<u8>),
}

impl ScalarValue {
    /// Returns true when the literal is the `Null` variant.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    /// Compares this scalar with another, returning the ordering when both sides are comparable.
    ///
    /// `NULL` is never comparable, and neither are values of different variants. Floats follow
    /// IEEE partial ordering, so a NaN on either side yields `None`.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        use ScalarValue::*;
        match (self, other) {
            (Null, _) | (_, Null) => None,
            (Boolean(lhs), Boolean(rhs)) => Some(lhs.cmp(rhs)),
            (Int64(lhs), Int64(rhs)) => Some(lhs.cmp(rhs)),
            (UInt64(lhs), UInt64(rhs)) => Some(lhs.cmp(rhs)),
            (Float64(lhs), Float64(rhs)) => lhs.partial_cmp(rhs),
            (Utf8(lhs), Utf8(rhs)) => Some(lhs.cmp(rhs)),
            (Binary(lhs), Binary(rhs)) => Some(lhs.cmp(rhs)),
            _ => None,
        }
    }

    /// Short name of the literal's variant, used in diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            ScalarValue::Null => "null",
            ScalarValue::Boolean(_) => "boolean",
            ScalarValue::Int64(_) => "int64",
            ScalarValue::UInt64(_) => "uint64",
            ScalarValue::Float64(_) => "float64",
            ScalarValue::Utf8(_) => "utf8",
            ScalarValue::Binary(_) => "binary",
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => f.write_str("NULL"),
            ScalarValue::Boolean(v) => write!(f, "{v}"),
            ScalarValue::Int64(v) => write!(f, "{v}"),
            ScalarValue::UInt64(v) => write!(f, "{v}u"),
            ScalarValue::Float64(v) => write!(f, "{v:?}"),
            ScalarValue::Utf8(v) => write!(f, "{v:?}"),
            ScalarValue::Binary(v) => {
                f.write_str("0x")?;
                for byte in v {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        ScalarValue::Boolean(value)
    }
}

impl From<i32> for ScalarValue {
    fn from(value: i32) -> Self {
        ScalarValue::Int64(i64::from(value))
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        ScalarValue::Int64(value)
    }
}

impl From<u64> for ScalarValue {
    fn from(value: u64) -> Self {
        ScalarValue::UInt64(value)
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        ScalarValue::Float64(value)
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        ScalarValue::Utf8(value)
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::Utf8(value.to_owned())
    }
}

impl From<Vec<u8>> for ScalarValue {
    fn from(value: Vec<u8>) -> Self {
        ScalarValue::Binary(value)
    }
}

impl From<&[u8]> for ScalarValue {
    fn from(value: &[u8]) -> Self {
        ScalarValue::Binary(value.to_vec())
    }
}
