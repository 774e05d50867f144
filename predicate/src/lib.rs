#![deny(missing_docs)]
//! keyspan predicate facade crate.
//!
//! Predicates are immutable trees over column references and literals. Every
//! transformation (negation, negation normal form, simplification) consumes a
//! tree and returns a new one, so callers can share predicates freely across
//! threads and planning passes.

mod core;

pub use core::{ColumnRef, ComparisonOp, Operand, Predicate, PredicateBuilder, PredicateNode, ScalarValue};
