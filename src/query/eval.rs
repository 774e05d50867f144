//! Row-level predicate evaluation with SQL three-valued logic.

use std::cmp::Ordering;

use super::{Operand, Predicate, PredicateNode, ScalarValue};
use crate::{
    key::{KeyDecodeError, KeyValue},
    schema::TableSchema,
};

/// A materialized row: one value per schema column, in declaration order.
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    values: Vec<ScalarValue>,
}

impl Row {
    /// Row from positional values. Missing trailing columns read as `NULL`.
    pub fn new(values: Vec<ScalarValue>) -> Self {
        Self { values }
    }

    /// Materializes a row from its encoded key and named value cells.
    ///
    /// Value columns without a cell are `NULL`; cells for unknown or key
    /// columns are ignored.
    pub fn from_key<'a, I>(schema: &TableSchema, key: &[u8], cells: I) -> Result<Self, KeyDecodeError>
    where
        I: IntoIterator<Item = (&'a str, ScalarValue)>,
    {
        let key_values = schema.key_codec().decode(key)?.into_complete()?;
        let mut values = vec![ScalarValue::Null; schema.columns().len()];
        for (order, value) in key_values.iter().enumerate() {
            if let Some(column) = schema.key_column(order) {
                values[column.index()] = value.to_scalar();
            }
        }
        for (name, value) in cells {
            if let Some(column) = schema.column(name).filter(|c| c.key_order().is_none()) {
                values[column.index()] = value;
            }
        }
        Ok(Self { values })
    }

    /// Value of the column at `index`.
    pub fn get(&self, index: usize) -> &ScalarValue {
        static NULL: ScalarValue = ScalarValue::Null;
        self.values.get(index).unwrap_or(&NULL)
    }

    /// Typed key values of the row, in key order.
    ///
    /// `None` when a key column holds `NULL` or a value its type cannot hold.
    pub fn key(&self, schema: &TableSchema) -> Option<Vec<KeyValue>> {
        (0..schema.key_len())
            .map(|order| {
                let column = schema.key_column(order)?;
                column.column_type().coerce(self.get(column.index()))
            })
            .collect()
    }

    /// Values in declaration order.
    pub fn values(&self) -> &[ScalarValue] {
        &self.values
    }
}

/// Evaluates `predicate` on `row`: `Some(true)`, `Some(false)`, or `None`
/// for unknown.
///
/// Comparisons involving `NULL`, NaN, unknown columns or mismatched types are
/// unknown.
pub fn evaluate(predicate: &Predicate, schema: &TableSchema, row: &Row) -> Option<bool> {
    match predicate.kind() {
        PredicateNode::True => Some(true),
        PredicateNode::False => Some(false),
        PredicateNode::Compare { left, op, right } => {
            let ordering = resolve(left, schema, row)?.compare(resolve(right, schema, row)?)?;
            Some(op.test_ordering(ordering))
        }
        PredicateNode::InList {
            expr,
            list,
            negated,
        } => {
            let value = resolve(expr, schema, row)?;
            let mut unknown = false;
            for candidate in list {
                match value.compare(candidate) {
                    Some(Ordering::Equal) => return Some(!negated),
                    Some(_) => {}
                    None => unknown = true,
                }
            }
            if unknown {
                None
            } else {
                Some(*negated)
            }
        }
        PredicateNode::Not(inner) => evaluate(inner, schema, row).map(|value| !value),
        PredicateNode::And(children) => {
            let mut unknown = false;
            for child in children {
                match evaluate(child, schema, row) {
                    Some(false) => return Some(false),
                    Some(true) => {}
                    None => unknown = true,
                }
            }
            if unknown {
                None
            } else {
                Some(true)
            }
        }
        PredicateNode::Or(children) => {
            let mut unknown = false;
            for child in children {
                match evaluate(child, schema, row) {
                    Some(true) => return Some(true),
                    Some(false) => {}
                    None => unknown = true,
                }
            }
            if unknown {
                None
            } else {
                Some(false)
            }
        }
    }
}

/// Whether `row` satisfies `predicate`; unknown counts as not satisfied.
pub fn matches(predicate: &Predicate, schema: &TableSchema, row: &Row) -> bool {
    evaluate(predicate, schema, row) == Some(true)
}

fn resolve<'a>(operand: &'a Operand, schema: &TableSchema, row: &'a Row) -> Option<&'a ScalarValue> {
    match operand {
        Operand::Literal(value) => Some(value),
        Operand::Column(column) => schema
            .column(&column.name)
            .map(|column| row.get(column.index())),
    }
}
