//! Translation of predicates into storage-native filters.
//!
//! The storage tier understands a small filter language: comparisons of a row
//! key column or a `(family, qualifier)` cell against a typed literal, joined
//! with AND/OR. [`pushdown`] splits a predicate into the part expressed in
//! that language and a residual evaluated on returned rows, such that
//! `native AND residual` accepts exactly the rows the predicate accepts.
//!
//! Row key comparisons are exact. Cell comparisons are pushed as pre-filters
//! only: the storage tier does not reproduce three-valued logic for missing
//! cells, so those leaves are kept in the residual too.

use std::{cmp::Ordering, fmt, sync::Arc};

use super::{column_literal, eval::Row, ComparisonOp, Predicate, PredicateNode};
use crate::{
    key::KeyValue,
    schema::{Column, ColumnRole, TableSchema},
};

/// Comparison operators understood by the storage tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterOp {
    /// `=`
    Equal,
    /// `<`
    Less,
    /// `<=`
    LessOrEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterOrEqual,
}

impl FilterOp {
    fn as_str(self) -> &'static str {
        match self {
            FilterOp::Equal => "=",
            FilterOp::Less => "<",
            FilterOp::LessOrEqual => "<=",
            FilterOp::Greater => ">",
            FilterOp::GreaterOrEqual => ">=",
        }
    }

    fn test(self, ordering: Ordering) -> bool {
        let op = match self {
            FilterOp::Equal => ComparisonOp::Equal,
            FilterOp::Less => ComparisonOp::LessThan,
            FilterOp::LessOrEqual => ComparisonOp::LessThanOrEqual,
            FilterOp::Greater => ComparisonOp::GreaterThan,
            FilterOp::GreaterOrEqual => ComparisonOp::GreaterThanOrEqual,
        };
        op.test_ordering(ordering)
    }
}

/// What a native comparison reads.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FilterTarget {
    /// A component of the row key.
    RowKey {
        /// Key position.
        dimension: usize,
    },
    /// A cell.
    Cell {
        /// Column family.
        family: Arc<str>,
        /// Qualifier.
        qualifier: Arc<str>,
    },
}

/// Storage-native filter tree.
#[derive(Clone, Debug, PartialEq)]
pub enum NativeFilter {
    /// Compares one column with a literal.
    Compare {
        /// Schema index of the column.
        column: usize,
        /// Storage location of the column.
        target: FilterTarget,
        /// Operator.
        op: FilterOp,
        /// Typed literal.
        value: KeyValue,
    },
    /// All children must pass.
    And(Vec<NativeFilter>),
    /// At least one child must pass.
    Or(Vec<NativeFilter>),
}

impl NativeFilter {
    fn all(mut filters: Vec<NativeFilter>) -> Option<Self> {
        match filters.len() {
            0 => None,
            1 => filters.pop(),
            _ => Some(NativeFilter::And(filters)),
        }
    }

    fn any(mut filters: Vec<NativeFilter>) -> Option<Self> {
        match filters.len() {
            0 => None,
            1 => filters.pop(),
            _ => Some(NativeFilter::Or(filters)),
        }
    }

    /// Evaluates the filter the way the storage tier would, with unknown
    /// (`None`) for cells that are missing or hold an incomparable value.
    pub fn evaluate(&self, schema: &TableSchema, row: &Row) -> Option<bool> {
        match self {
            NativeFilter::Compare {
                column, op, value, ..
            } => {
                let column = schema.columns().get(*column)?;
                let cell = column.column_type().coerce(row.get(column.index()))?;
                Some(op.test(cell.cmp(value)))
            }
            NativeFilter::And(children) => {
                let mut unknown = false;
                for child in children {
                    match child.evaluate(schema, row) {
                        Some(false) => return Some(false),
                        Some(true) => {}
                        None => unknown = true,
                    }
                }
                (!unknown).then_some(true)
            }
            NativeFilter::Or(children) => {
                let mut unknown = false;
                for child in children {
                    match child.evaluate(schema, row) {
                        Some(true) => return Some(true),
                        Some(false) => {}
                        None => unknown = true,
                    }
                }
                (!unknown).then_some(false)
            }
        }
    }

    /// Whether any comparison reads a row key component.
    pub fn reads_row_key(&self) -> bool {
        match self {
            NativeFilter::Compare { target, .. } => matches!(target, FilterTarget::RowKey { .. }),
            NativeFilter::And(children) | NativeFilter::Or(children) => {
                children.iter().any(NativeFilter::reads_row_key)
            }
        }
    }
}

impl fmt::Display for NativeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeFilter::Compare {
                target, op, value, ..
            } => {
                match target {
                    FilterTarget::RowKey { dimension } => write!(f, "key[{dimension}]")?,
                    FilterTarget::Cell { family, qualifier } => write!(f, "{family}:{qualifier}")?,
                }
                write!(f, " {} {value}", op.as_str())
            }
            NativeFilter::And(children) | NativeFilter::Or(children) => {
                let sep = if matches!(self, NativeFilter::And(_)) {
                    " AND "
                } else {
                    " OR "
                };
                f.write_str("(")?;
                for (idx, child) in children.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(sep)?;
                    }
                    write!(f, "{child}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Result of splitting a predicate for pushdown.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Pushdown {
    /// Filter evaluated by the storage tier.
    pub filter: Option<NativeFilter>,
    /// Predicate evaluated on rows the storage tier returns.
    pub residual: Option<Predicate>,
}

impl Pushdown {
    /// Whether a row passes both halves.
    pub fn matches(&self, schema: &TableSchema, row: &Row) -> bool {
        self.filter
            .as_ref()
            .map_or(true, |filter| filter.evaluate(schema, row) == Some(true))
            && self
                .residual
                .as_ref()
                .map_or(true, |residual| super::eval::matches(residual, schema, row))
    }
}

/// Splits `predicate` into a native filter and a residual.
pub fn pushdown(predicate: &Predicate, schema: &TableSchema) -> Pushdown {
    translate(&predicate.clone().to_nnf(), schema)
}

fn translate(predicate: &Predicate, schema: &TableSchema) -> Pushdown {
    match predicate.kind() {
        PredicateNode::True => Pushdown::default(),
        PredicateNode::False => Pushdown {
            filter: None,
            residual: Some(Predicate::never()),
        },
        PredicateNode::Compare { .. } | PredicateNode::InList { .. } | PredicateNode::Not(_) => {
            match translate_leaf(predicate, schema) {
                Some((filter, exact)) => Pushdown {
                    filter: Some(filter),
                    residual: (!exact).then(|| predicate.clone()),
                },
                None => Pushdown {
                    filter: None,
                    residual: Some(predicate.clone()),
                },
            }
        }
        PredicateNode::And(children) => {
            let mut filters = Vec::new();
            let mut residuals = Vec::new();
            for child in children {
                let Pushdown { filter, residual } = translate(child, schema);
                filters.extend(filter);
                residuals.extend(residual);
            }
            Pushdown {
                filter: NativeFilter::all(filters),
                residual: Predicate::conjunction(residuals),
            }
        }
        PredicateNode::Or(children) => {
            let parts: Vec<Pushdown> = children.iter().map(|child| translate(child, schema)).collect();
            let filter = if parts.iter().all(|part| part.filter.is_some()) {
                NativeFilter::any(parts.iter().filter_map(|part| part.filter.clone()).collect())
            } else {
                None
            };
            // A residual on any branch forces the whole disjunction back into
            // the residual.
            let residual = parts
                .iter()
                .any(|part| part.residual.is_some())
                .then(|| predicate.clone());
            Pushdown { filter, residual }
        }
    }
}

/// Native form of a leaf and whether it is exact.
fn translate_leaf(predicate: &Predicate, schema: &TableSchema) -> Option<(NativeFilter, bool)> {
    match predicate.kind() {
        PredicateNode::Compare { left, op, right } => {
            let (column, op, literal) = column_literal(left, *op, right)?;
            let column = schema.column(&column.name)?;
            let value = column.column_type().coerce(literal)?;
            let filter = match op {
                ComparisonOp::Equal => compare(column, FilterOp::Equal, value),
                ComparisonOp::LessThan => compare(column, FilterOp::Less, value),
                ComparisonOp::LessThanOrEqual => compare(column, FilterOp::LessOrEqual, value),
                ComparisonOp::GreaterThan => compare(column, FilterOp::Greater, value),
                ComparisonOp::GreaterThanOrEqual => {
                    compare(column, FilterOp::GreaterOrEqual, value)
                }
                ComparisonOp::NotEqual => not_equal(column, value),
            };
            Some((filter, is_exact(column)))
        }
        PredicateNode::InList {
            expr,
            list,
            negated,
        } => {
            let column = schema.column(&expr.as_column()?.name)?;
            let values = list
                .iter()
                .map(|literal| column.column_type().coerce(literal))
                .collect::<Option<Vec<_>>>()?;
            let filters: Vec<NativeFilter> = if *negated {
                values.into_iter().map(|value| not_equal(column, value)).collect()
            } else {
                values
                    .into_iter()
                    .map(|value| compare(column, FilterOp::Equal, value))
                    .collect()
            };
            let filter = if *negated {
                NativeFilter::all(filters)?
            } else {
                NativeFilter::any(filters)?
            };
            Some((filter, is_exact(column)))
        }
        _ => None,
    }
}

fn is_exact(column: &Column) -> bool {
    column.key_order().is_some()
}

fn compare(column: &Column, op: FilterOp, value: KeyValue) -> NativeFilter {
    let target = match column.role() {
        ColumnRole::Key { order } => FilterTarget::RowKey { dimension: *order },
        ColumnRole::Value { family, qualifier } => FilterTarget::Cell {
            family: family.clone(),
            qualifier: qualifier.clone(),
        },
    };
    NativeFilter::Compare {
        column: column.index(),
        target,
        op,
        value,
    }
}

// `x != v` has no native operator; it becomes `x < v OR x > v`.
fn not_equal(column: &Column, value: KeyValue) -> NativeFilter {
    NativeFilter::Or(vec![
        compare(column, FilterOp::Less, value.clone()),
        compare(column, FilterOp::Greater, value),
    ])
}
