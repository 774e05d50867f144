//! Predicate analysis for the read path.
//!
//! This module re-exports the `predicate` crate's surface and hosts the passes
//! that turn a predicate into key ranges and storage-native filters:
//! critical point extraction, partial evaluation over key ranges,
//! multi-dimensional range composition, and filter pushdown.

pub mod compose;
pub mod critical;
pub mod eval;
pub mod partial;
pub mod pushdown;

pub use keyspan_predicate::{
    ColumnRef, ComparisonOp, Operand, Predicate, PredicateBuilder, PredicateNode, ScalarValue,
};

/// Normalizes a comparison to `column op literal`, flipping the operator when
/// the literal is on the left. Returns `None` for column/column and
/// literal/literal comparisons.
pub(crate) fn column_literal<'a>(
    left: &'a Operand,
    op: ComparisonOp,
    right: &'a Operand,
) -> Option<(&'a ColumnRef, ComparisonOp, &'a ScalarValue)> {
    match (left, right) {
        (Operand::Column(column), Operand::Literal(value)) => Some((column, op, value)),
        (Operand::Literal(value), Operand::Column(column)) => Some((column, op.flipped(), value)),
        _ => None,
    }
}
