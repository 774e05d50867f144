use std::{fmt, sync::Arc};

use super::ScalarValue;

/// Reference identifying a column used inside predicates.
///
/// This is a logical column reference using only the column name.
/// Binding to key dimensions or value columns happens against a table
/// schema during planning, not at predicate construction time.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnRef {
    /// Canonical column name.
    pub name: Arc<str>,
}

impl ColumnRef {
    /// Creates a new column reference from a name.
    #[must_use]
    pub fn new<N>(name: N) -> Self
    where
        N: Into<Arc<str>>,
    {
        Self { name: name.into() }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Operand used by predicate comparisons.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    /// Reference to a column.
    Column(ColumnRef),
    /// Literal value.
    Literal(ScalarValue),
}

impl Operand {
    /// Returns the column reference when the operand is a column.
    #[must_use]
    pub fn as_column(&self) -> Option<&ColumnRef> {
        match self {
            Operand::Column(column) => Some(column),
            Operand::Literal(_) => None,
        }
    }

    /// Returns the literal when the operand is a literal.
    #[must_use]
    pub fn as_literal(&self) -> Option<&ScalarValue> {
        match self {
            Operand::Column(_) => None,
            Operand::Literal(value) => Some(value),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Column(column) => column.fmt(f),
            Operand::Literal(value) => value.fmt(f),
        }
    }
}

impl From<ColumnRef> for Operand {
    fn from(value: ColumnRef) -> Self {
        Self::Column(value)
    }
}

impl From<ScalarValue> for Operand {
    fn from(value: ScalarValue) -> Self {
        Self::Literal(value)
    }
}
