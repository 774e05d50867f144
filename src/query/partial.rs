//! Three-valued partial evaluation of a predicate over a key range.
//!
//! The evaluator answers, for every row whose leading key columns equal a
//! pinned prefix and whose next key column falls in a range, whether the
//! predicate is definitely true, definitely false, or depends on columns the
//! range does not determine. In the last case the answer carries the residual
//! predicate that must still be checked per row.

use std::ops::Bound;

use super::{column_literal, ComparisonOp, Operand, Predicate, PredicateNode, ScalarValue};
use crate::{
    key::KeyValue,
    range::KeyRange,
    schema::{ColumnType, TableSchema},
};

/// Outcome of partially evaluating a predicate.
#[derive(Clone, Debug, PartialEq)]
pub enum Truth {
    /// Every row in scope satisfies the predicate.
    True,
    /// No row in scope satisfies the predicate.
    False,
    /// Rows in scope satisfy the predicate exactly when they satisfy the
    /// carried residual.
    Maybe(Predicate),
}

impl Truth {
    /// Lifts a definite boolean.
    #[must_use]
    pub fn from_bool(value: bool) -> Self {
        if value {
            Truth::True
        } else {
            Truth::False
        }
    }

    /// Residual left to evaluate; `None` when the answer is definite.
    #[must_use]
    pub fn residual(&self) -> Option<&Predicate> {
        match self {
            Truth::Maybe(residual) => Some(residual),
            Truth::True | Truth::False => None,
        }
    }

    /// Kleene conjunction; stops at the first `False`.
    pub fn all<I>(children: I) -> Self
    where
        I: IntoIterator<Item = Truth>,
    {
        let mut residuals = Vec::new();
        for child in children {
            match child {
                Truth::False => return Truth::False,
                Truth::True => {}
                Truth::Maybe(residual) => residuals.push(residual),
            }
        }
        Predicate::conjunction(residuals).map_or(Truth::True, Truth::Maybe)
    }

    /// Kleene disjunction; stops at the first `True`.
    pub fn any<I>(children: I) -> Self
    where
        I: IntoIterator<Item = Truth>,
    {
        let mut residuals = Vec::new();
        for child in children {
            match child {
                Truth::True => return Truth::True,
                Truth::False => {}
                Truth::Maybe(residual) => residuals.push(residual),
            }
        }
        Predicate::disjunction(residuals).map_or(Truth::False, Truth::Maybe)
    }

    /// Kleene negation.
    #[must_use]
    pub fn negate(self) -> Self {
        match self {
            Truth::True => Truth::False,
            Truth::False => Truth::True,
            Truth::Maybe(residual) => Truth::Maybe(residual.negate()),
        }
    }
}

/// Key bindings for one partial evaluation.
///
/// Key dimensions `0..pinned.len()` hold exactly the pinned values, the next
/// dimension (when a range is given) lies in `range`, and every other column
/// is unknown.
#[derive(Clone, Copy, Debug)]
pub struct PartialRow<'a> {
    pinned: &'a [KeyValue],
    range: Option<&'a KeyRange<KeyValue>>,
}

enum Binding<'a> {
    Pinned(&'a KeyValue),
    Range(&'a KeyRange<KeyValue>),
    Free,
}

impl<'a> PartialRow<'a> {
    /// Binds a pinned prefix and a range on the dimension that follows it.
    pub fn new(pinned: &'a [KeyValue], range: &'a KeyRange<KeyValue>) -> Self {
        Self {
            pinned,
            range: Some(range),
        }
    }

    /// Binds a pinned prefix only.
    pub fn pinned(pinned: &'a [KeyValue]) -> Self {
        Self {
            pinned,
            range: None,
        }
    }

    /// Key dimension bound to the range.
    pub fn dimension(&self) -> usize {
        self.pinned.len()
    }

    fn binding(&self, dimension: usize) -> Binding<'a> {
        if let Some(value) = self.pinned.get(dimension) {
            return Binding::Pinned(value);
        }
        match self.range {
            Some(range) if dimension == self.pinned.len() => Binding::Range(range),
            _ => Binding::Free,
        }
    }
}

/// Evaluates `predicate` against the bindings of `row`.
///
/// Leaves on non-key columns, on key dimensions past the bound one, or with
/// literals the column type cannot hold stay in the residual unchanged.
/// Callers should pass predicates in negation normal form: definite answers
/// on float ranges are only reported where NaN keys cannot change them.
pub fn evaluate_partial(predicate: &Predicate, schema: &TableSchema, row: &PartialRow<'_>) -> Truth {
    match predicate.kind() {
        PredicateNode::True => Truth::True,
        PredicateNode::False => Truth::False,
        PredicateNode::Compare { left, op, right } => {
            evaluate_compare(predicate, left, *op, right, schema, row)
        }
        PredicateNode::InList {
            expr,
            list,
            negated,
        } => evaluate_in_list(predicate, expr, list, *negated, schema, row),
        PredicateNode::Not(inner) => evaluate_partial(inner, schema, row).negate(),
        PredicateNode::And(children) => Truth::all(
            children
                .iter()
                .map(|child| evaluate_partial(child, schema, row)),
        ),
        PredicateNode::Or(children) => Truth::any(
            children
                .iter()
                .map(|child| evaluate_partial(child, schema, row)),
        ),
    }
}

fn key_binding(schema: &TableSchema, name: &str) -> Option<(usize, ColumnType)> {
    let dimension = schema.key_dimension(name)?;
    Some((dimension, schema.key_type(dimension)?))
}

// A definite `true` is only reported when no NaN key can be in scope: NaN
// fails every comparison when rows are evaluated.
fn settle(leaf: &Predicate, outcome: Option<bool>, nan_in_scope: bool) -> Truth {
    match outcome {
        Some(true) if nan_in_scope => Truth::Maybe(leaf.clone()),
        Some(value) => Truth::from_bool(value),
        None => Truth::Maybe(leaf.clone()),
    }
}

fn may_hold_nan(range: &KeyRange<KeyValue>, ty: ColumnType) -> bool {
    if ty != ColumnType::Float64 {
        return false;
    }
    let open_or_nan = |bound: &Bound<KeyValue>| match bound {
        Bound::Unbounded => true,
        Bound::Included(value) | Bound::Excluded(value) => value.is_nan(),
    };
    open_or_nan(&range.start) || open_or_nan(&range.end)
}

fn evaluate_compare(
    leaf: &Predicate,
    left: &Operand,
    op: ComparisonOp,
    right: &Operand,
    schema: &TableSchema,
    row: &PartialRow<'_>,
) -> Truth {
    if let Some((column, op, literal)) = column_literal(left, op, right) {
        let Some((dimension, ty)) = key_binding(schema, &column.name) else {
            return Truth::Maybe(leaf.clone());
        };
        let Some(value) = ty.coerce(literal) else {
            return Truth::Maybe(leaf.clone());
        };
        return match row.binding(dimension) {
            Binding::Pinned(pinned) => settle(
                leaf,
                Some(op.test_ordering(pinned.cmp(&value))),
                pinned.is_nan(),
            ),
            Binding::Range(range) => settle(
                leaf,
                range_outcome(range, op, &value),
                may_hold_nan(range, ty),
            ),
            Binding::Free => Truth::Maybe(leaf.clone()),
        };
    }

    match (left, right) {
        (Operand::Column(a), Operand::Column(b)) => {
            let pinned = |name: &str| {
                let (dimension, ty) = key_binding(schema, name)?;
                match row.binding(dimension) {
                    Binding::Pinned(value) => Some((value, ty)),
                    Binding::Range(_) | Binding::Free => None,
                }
            };
            match (pinned(&a.name), pinned(&b.name)) {
                (Some((lhs, lty)), Some((rhs, rty))) if lty == rty => settle(
                    leaf,
                    Some(op.test_ordering(lhs.cmp(rhs))),
                    lhs.is_nan() || rhs.is_nan(),
                ),
                _ => Truth::Maybe(leaf.clone()),
            }
        }
        (Operand::Literal(a), Operand::Literal(b)) => match a.compare(b) {
            Some(ordering) => Truth::from_bool(op.test_ordering(ordering)),
            None => Truth::Maybe(leaf.clone()),
        },
        _ => Truth::Maybe(leaf.clone()),
    }
}

/// Definite outcome of `key op value` over every key in `range`, if any.
fn range_outcome(range: &KeyRange<KeyValue>, op: ComparisonOp, value: &KeyValue) -> Option<bool> {
    let is_point = range.as_point() == Some(value);
    match op {
        ComparisonOp::Equal if is_point => Some(true),
        ComparisonOp::Equal if !range.contains(value) => Some(false),
        ComparisonOp::NotEqual if is_point => Some(false),
        ComparisonOp::NotEqual if !range.contains(value) => Some(true),
        ComparisonOp::LessThan if range.all_below(value) => Some(true),
        ComparisonOp::LessThan if range.all_at_least(value) => Some(false),
        ComparisonOp::LessThanOrEqual if range.all_at_most(value) => Some(true),
        ComparisonOp::LessThanOrEqual if range.all_above(value) => Some(false),
        ComparisonOp::GreaterThan if range.all_above(value) => Some(true),
        ComparisonOp::GreaterThan if range.all_at_most(value) => Some(false),
        ComparisonOp::GreaterThanOrEqual if range.all_at_least(value) => Some(true),
        ComparisonOp::GreaterThanOrEqual if range.all_below(value) => Some(false),
        _ => None,
    }
}

fn evaluate_in_list(
    leaf: &Predicate,
    expr: &Operand,
    list: &[ScalarValue],
    negated: bool,
    schema: &TableSchema,
    row: &PartialRow<'_>,
) -> Truth {
    let Some((dimension, ty)) = expr
        .as_column()
        .and_then(|column| key_binding(schema, &column.name))
    else {
        return Truth::Maybe(leaf.clone());
    };
    let mut values = Vec::with_capacity(list.len());
    let mut all_typed = true;
    for literal in list {
        match ty.coerce(literal) {
            Some(value) => values.push(value),
            None => all_typed = false,
        }
    }

    let (hit, miss, nan_in_scope) = match row.binding(dimension) {
        Binding::Pinned(pinned) => (values.contains(pinned), true, pinned.is_nan()),
        Binding::Range(range) => {
            let hit = range
                .as_point()
                .is_some_and(|point| values.contains(point));
            let miss = !values.iter().any(|value| range.contains(value));
            (hit, miss, may_hold_nan(range, ty))
        }
        Binding::Free => return Truth::Maybe(leaf.clone()),
    };
    // `hit`: every key in scope is in the list. `miss`: none is, provided
    // every literal could be compared.
    let outcome = if hit {
        Some(!negated)
    } else if miss && all_typed {
        Some(negated)
    } else {
        None
    };
    settle(leaf, outcome, nan_in_scope)
}

#[cfg(test)]
mod tests {
    use arrow_schema::DataType;

    use super::*;
    use crate::{query::ColumnRef, schema::ColumnDef};

    fn schema() -> TableSchema {
        TableSchema::try_new(
            "t",
            "t",
            [
                ColumnDef::key("a", DataType::Utf8, 0),
                ColumnDef::key("b", DataType::Int32, 1),
                ColumnDef::key("f", DataType::Float64, 2),
                ColumnDef::value("v", DataType::Int64, "cf", "v"),
            ],
        )
        .unwrap()
    }

    fn cmp(column: &str, op: ComparisonOp, value: impl Into<ScalarValue>) -> Predicate {
        Predicate::compare(ColumnRef::new(column), op, value.into())
    }

    fn int_range(lo: i32, hi: i32) -> KeyRange<KeyValue> {
        KeyRange::new(
            Bound::Included(KeyValue::Int32(lo)),
            Bound::Included(KeyValue::Int32(hi)),
        )
    }

    #[test]
    fn comparison_over_range() {
        let schema = schema();
        let pinned = [KeyValue::Utf8("abc".into())];
        let range = int_range(1024, 1024);
        let row = PartialRow::new(&pinned, &range);
        let both = Predicate::and([
            cmp("b", ComparisonOp::GreaterThan, 1023i64),
            cmp("b", ComparisonOp::LessThan, 1025i64),
        ]);
        assert_eq!(evaluate_partial(&both, &schema, &row), Truth::True);

        let range = int_range(1025, 2047);
        let row = PartialRow::new(&pinned, &range);
        assert_eq!(evaluate_partial(&both, &schema, &row), Truth::False);

        let straddle = cmp("b", ComparisonOp::GreaterThanOrEqual, 2000i64);
        assert_eq!(
            evaluate_partial(&straddle, &schema, &row),
            Truth::Maybe(straddle.clone())
        );
    }

    #[test]
    fn pinned_prefix_is_evaluated_concretely() {
        let schema = schema();
        let pinned = [KeyValue::Utf8("abc".into())];
        let range = KeyRange::all();
        let row = PartialRow::new(&pinned, &range);
        assert_eq!(
            evaluate_partial(&cmp("a", ComparisonOp::Equal, "abc"), &schema, &row),
            Truth::True
        );
        assert_eq!(
            evaluate_partial(&cmp("a", ComparisonOp::GreaterThan, "abc"), &schema, &row),
            Truth::False
        );
        let literal_left = Predicate::compare(
            ScalarValue::from("abd"),
            ComparisonOp::GreaterThan,
            ColumnRef::new("a"),
        );
        assert_eq!(evaluate_partial(&literal_left, &schema, &row), Truth::True);
    }

    #[test]
    fn residual_keeps_only_undetermined_leaves() {
        let schema = schema();
        let range = KeyRange::point(KeyValue::Utf8("abc".into()));
        let row = PartialRow::new(&[], &range);
        let value_leaf = cmp("v", ComparisonOp::Equal, 3i64);
        let later_key = cmp("b", ComparisonOp::Equal, 8i64);
        let predicate = Predicate::and([
            cmp("a", ComparisonOp::Equal, "abc"),
            Predicate::or([later_key.clone(), cmp("a", ComparisonOp::Equal, "zzz")]),
            value_leaf.clone(),
        ]);
        assert_eq!(
            evaluate_partial(&predicate, &schema, &row),
            Truth::Maybe(Predicate::and([later_key, value_leaf]))
        );
    }

    #[test]
    fn kleene_connectives() {
        let unknown = cmp("v", ComparisonOp::Equal, 1i64);
        assert_eq!(
            Truth::all([Truth::True, Truth::Maybe(unknown.clone())]),
            Truth::Maybe(unknown.clone())
        );
        assert_eq!(
            Truth::all([Truth::Maybe(unknown.clone()), Truth::False]),
            Truth::False
        );
        assert_eq!(
            Truth::any([Truth::Maybe(unknown.clone()), Truth::True]),
            Truth::True
        );
        assert_eq!(Truth::any([Truth::False, Truth::False]), Truth::False);
        assert_eq!(Truth::all(Vec::new()), Truth::True);
        assert_eq!(
            Truth::Maybe(unknown.clone()).negate(),
            Truth::Maybe(unknown.negate())
        );
    }

    #[test]
    fn not_is_evaluated_by_negation() {
        let schema = schema();
        let range = int_range(0, 10);
        let pinned = [KeyValue::Utf8("k".into())];
        let row = PartialRow::new(&pinned, &range);
        let predicate = Predicate::not(cmp("b", ComparisonOp::GreaterThan, 20i64));
        assert_eq!(evaluate_partial(&predicate, &schema, &row), Truth::True);
    }

    #[test]
    fn in_list_over_range() {
        let schema = schema();
        let pinned = [KeyValue::Utf8("k".into())];
        let list = [ScalarValue::from(3i64), ScalarValue::from(7i64)];
        let in_list = Predicate::in_list(ColumnRef::new("b"), list.clone(), false);
        let not_in = Predicate::in_list(ColumnRef::new("b"), list, true);

        let point = int_range(7, 7);
        let row = PartialRow::new(&pinned, &point);
        assert_eq!(evaluate_partial(&in_list, &schema, &row), Truth::True);
        assert_eq!(evaluate_partial(&not_in, &schema, &row), Truth::False);

        let outside = int_range(8, 100);
        let row = PartialRow::new(&pinned, &outside);
        assert_eq!(evaluate_partial(&in_list, &schema, &row), Truth::False);
        assert_eq!(evaluate_partial(&not_in, &schema, &row), Truth::True);

        let spanning = int_range(0, 5);
        let row = PartialRow::new(&pinned, &spanning);
        assert_eq!(
            evaluate_partial(&in_list, &schema, &row),
            Truth::Maybe(in_list.clone())
        );

        let with_null = Predicate::in_list(
            ColumnRef::new("b"),
            [ScalarValue::from(3i64), ScalarValue::Null],
            true,
        );
        let row = PartialRow::new(&pinned, &outside);
        assert_eq!(
            evaluate_partial(&with_null, &schema, &row),
            Truth::Maybe(with_null.clone())
        );
    }

    #[test]
    fn float_ranges_never_report_true_when_nan_may_be_present() {
        let schema = schema();
        let pinned = [KeyValue::Utf8("k".into()), KeyValue::Int32(1)];
        let above = KeyRange::new(Bound::Excluded(KeyValue::Float64(5.0)), Bound::Unbounded);
        let row = PartialRow::new(&pinned, &above);
        let leaf = cmp("f", ComparisonOp::GreaterThan, 5.0);
        assert_eq!(evaluate_partial(&leaf, &schema, &row), Truth::Maybe(leaf.clone()));

        let bounded = KeyRange::new(
            Bound::Excluded(KeyValue::Float64(5.0)),
            Bound::Included(KeyValue::Float64(9.0)),
        );
        let row = PartialRow::new(&pinned, &bounded);
        assert_eq!(evaluate_partial(&leaf, &schema, &row), Truth::True);
        let below = cmp("f", ComparisonOp::LessThanOrEqual, 5.0);
        assert_eq!(evaluate_partial(&below, &schema, &row), Truth::False);
    }

    #[test]
    fn column_pairs_and_literal_pairs() {
        let schema = schema();
        let pinned = [KeyValue::Utf8("k".into()), KeyValue::Int32(4)];
        let row = PartialRow::pinned(&pinned);
        let pair = Predicate::compare(ColumnRef::new("a"), ComparisonOp::Equal, ColumnRef::new("b"));
        assert_eq!(evaluate_partial(&pair, &schema, &row), Truth::Maybe(pair.clone()));

        let literals = Predicate::compare(
            ScalarValue::from(1i64),
            ComparisonOp::LessThan,
            ScalarValue::from(2i64),
        );
        assert_eq!(evaluate_partial(&literals, &schema, &row), Truth::True);
        let null = Predicate::compare(ScalarValue::Null, ComparisonOp::Equal, ScalarValue::Null);
        assert_eq!(evaluate_partial(&null, &schema, &row), Truth::Maybe(null.clone()));
    }
}
