//! Critical point extraction for a single key dimension.
//!
//! A critical point is a literal value at which the truth of some predicate
//! leaf may change when moving along one key dimension. Splitting the
//! dimension at every critical point yields candidate ranges on which each
//! leaf is constant, apart from leaves that reference other columns.

use std::{fmt, ops::Bound};

use super::{column_literal, ComparisonOp, Predicate, PredicateNode};
use crate::{
    key::KeyValue,
    range::KeyRange,
    schema::{ColumnType, TableSchema},
};

/// Whether a critical point's value itself satisfies the leaf that produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BoundaryKind {
    /// The value is included (`=`, `<=`, `>=`, `IN`).
    Closed,
    /// The value is excluded (`<`, `>`, `!=`).
    Open,
}

/// A boundary value on one key dimension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CriticalPoint {
    /// Boundary value.
    pub value: KeyValue,
    /// Boundary kind.
    pub kind: BoundaryKind,
}

impl fmt::Display for CriticalPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            BoundaryKind::Closed => write!(f, "[{}]", self.value),
            BoundaryKind::Open => write!(f, "({})", self.value),
        }
    }
}

/// Collects the sorted, de-duplicated critical points of `predicate` on key
/// dimension `dimension`.
///
/// Negation does not change where a leaf's truth flips, so `NOT` is walked
/// through unchanged. On discrete types `> v` and `< v` contribute the closed
/// neighbour `v + 1` / `v - 1`. When several leaves contribute the same value,
/// a closed contribution wins.
pub fn critical_points(
    predicate: &Predicate,
    schema: &TableSchema,
    dimension: usize,
) -> Vec<CriticalPoint> {
    let Some(ty) = schema.key_type(dimension) else {
        return Vec::new();
    };
    let mut points = Vec::new();
    collect(predicate, schema, dimension, ty, &mut points);
    points.sort_by(|a, b| a.value.cmp(&b.value));

    let mut out: Vec<CriticalPoint> = Vec::with_capacity(points.len());
    for point in points {
        match out.last_mut() {
            Some(last) if last.value == point.value => {
                if point.kind == BoundaryKind::Closed {
                    last.kind = BoundaryKind::Closed;
                }
            }
            _ => out.push(point),
        }
    }
    out
}

fn collect(
    predicate: &Predicate,
    schema: &TableSchema,
    dimension: usize,
    ty: ColumnType,
    out: &mut Vec<CriticalPoint>,
) {
    match predicate.kind() {
        PredicateNode::True | PredicateNode::False => {}
        PredicateNode::Compare { left, op, right } => {
            let Some((column, op, literal)) = column_literal(left, *op, right) else {
                return;
            };
            if schema.key_dimension(&column.name) != Some(dimension) {
                return;
            }
            if let Some(value) = ty.coerce(literal) {
                out.push(point_for(op, value, ty));
            }
        }
        PredicateNode::InList { expr, list, .. } => {
            let Some(column) = expr.as_column() else {
                return;
            };
            if schema.key_dimension(&column.name) != Some(dimension) {
                return;
            }
            out.extend(list.iter().filter_map(|literal| ty.coerce(literal)).map(|value| {
                CriticalPoint {
                    value,
                    kind: BoundaryKind::Closed,
                }
            }));
        }
        PredicateNode::Not(inner) => collect(inner, schema, dimension, ty, out),
        PredicateNode::And(children) | PredicateNode::Or(children) => {
            for child in children {
                collect(child, schema, dimension, ty, out);
            }
        }
    }
}

fn point_for(op: ComparisonOp, value: KeyValue, ty: ColumnType) -> CriticalPoint {
    let neighbour = match op {
        ComparisonOp::GreaterThan => ty.successor(&value),
        ComparisonOp::LessThan => ty.predecessor(&value),
        _ => None,
    };
    if let Some(value) = neighbour {
        return CriticalPoint {
            value,
            kind: BoundaryKind::Closed,
        };
    }
    let kind = match op {
        ComparisonOp::Equal | ComparisonOp::LessThanOrEqual | ComparisonOp::GreaterThanOrEqual => {
            BoundaryKind::Closed
        }
        ComparisonOp::NotEqual | ComparisonOp::LessThan | ComparisonOp::GreaterThan => {
            BoundaryKind::Open
        }
    };
    CriticalPoint { value, kind }
}

/// Splits a dimension into candidate ranges around sorted critical points.
///
/// Each point gets its own `[v, v]` range; the gaps between consecutive
/// points and the two unbounded ends become the remaining candidates. Gaps
/// that hold no value of the column type are dropped, so the candidates
/// cover the dimension without overlap or zero-width gaps.
pub fn candidate_ranges(points: &[CriticalPoint], ty: ColumnType) -> Vec<KeyRange<KeyValue>> {
    let mut out = Vec::with_capacity(points.len() * 2 + 1);
    let mut lower = Bound::Unbounded;
    for point in points {
        let gap = KeyRange::new(lower, Bound::Excluded(point.value.clone()));
        out.extend(gap.canonicalize(ty));
        out.push(KeyRange::point(point.value.clone()));
        lower = Bound::Excluded(point.value.clone());
    }
    out.extend(KeyRange::new(lower, Bound::Unbounded).canonicalize(ty));
    out
}

#[cfg(test)]
mod tests {
    use arrow_schema::DataType;

    use super::*;
    use crate::{
        query::{ColumnRef, ScalarValue},
        schema::ColumnDef,
    };

    fn schema() -> TableSchema {
        TableSchema::try_new(
            "t",
            "t",
            [
                ColumnDef::key("x", DataType::Int64, 0),
                ColumnDef::key("s", DataType::Utf8, 1),
                ColumnDef::value("v", DataType::Int64, "cf", "v"),
            ],
        )
        .unwrap()
    }

    fn x(op: ComparisonOp, v: i64) -> Predicate {
        Predicate::compare(ColumnRef::new("x"), op, ScalarValue::from(v))
    }

    fn values(points: &[CriticalPoint]) -> Vec<KeyValue> {
        points.iter().map(|p| p.value.clone()).collect()
    }

    #[test]
    fn discrete_strict_bounds_use_neighbours() {
        let predicate = Predicate::or([
            Predicate::and([x(ComparisonOp::GreaterThan, 1023), x(ComparisonOp::LessThan, 1025)]),
            x(ComparisonOp::GreaterThanOrEqual, 2048),
            x(ComparisonOp::Equal, 512),
        ]);
        let points = critical_points(&predicate, &schema(), 0);
        assert_eq!(
            values(&points),
            vec![KeyValue::Int64(512), KeyValue::Int64(1024), KeyValue::Int64(2048)]
        );
        assert!(points.iter().all(|p| p.kind == BoundaryKind::Closed));
    }

    #[test]
    fn dense_strict_bounds_stay_open() {
        let predicate = Predicate::and([
            Predicate::compare(ColumnRef::new("s"), ComparisonOp::GreaterThan, ScalarValue::from("m")),
            Predicate::compare(ColumnRef::new("s"), ComparisonOp::NotEqual, ScalarValue::from("q")),
            Predicate::compare(ColumnRef::new("s"), ComparisonOp::LessThanOrEqual, ScalarValue::from("m")),
        ]);
        let points = critical_points(&predicate, &schema(), 1);
        assert_eq!(
            points,
            vec![
                CriticalPoint {
                    value: KeyValue::Utf8("m".into()),
                    kind: BoundaryKind::Closed,
                },
                CriticalPoint {
                    value: KeyValue::Utf8("q".into()),
                    kind: BoundaryKind::Open,
                },
            ]
        );
    }

    #[test]
    fn ignores_other_columns_and_untyped_literals() {
        let predicate = Predicate::and([
            Predicate::compare(ColumnRef::new("v"), ComparisonOp::Equal, ScalarValue::from(1i64)),
            Predicate::compare(ColumnRef::new("x"), ComparisonOp::Equal, ScalarValue::from("a")),
            Predicate::compare(ColumnRef::new("x"), ComparisonOp::Equal, ScalarValue::Null),
            Predicate::compare(ColumnRef::new("x"), ComparisonOp::Equal, ColumnRef::new("v")),
        ]);
        assert!(critical_points(&predicate, &schema(), 0).is_empty());
    }

    #[test]
    fn not_and_in_lists_contribute_points() {
        let predicate = Predicate::not(Predicate::in_list(
            ScalarValue::from(0i64),
            [ScalarValue::from(1i64)],
            false,
        ));
        assert!(critical_points(&predicate, &schema(), 0).is_empty());

        let predicate = Predicate::not(Predicate::in_list(
            ColumnRef::new("x"),
            [ScalarValue::from(9i64), ScalarValue::from(3i64), ScalarValue::from(9i64)],
            true,
        ));
        assert_eq!(
            values(&critical_points(&predicate, &schema(), 0)),
            vec![KeyValue::Int64(3), KeyValue::Int64(9)]
        );
    }

    #[test]
    fn overflowing_neighbour_keeps_open_point() {
        let points = critical_points(&x(ComparisonOp::GreaterThan, i64::MAX), &schema(), 0);
        assert_eq!(
            points,
            vec![CriticalPoint {
                value: KeyValue::Int64(i64::MAX),
                kind: BoundaryKind::Open,
            }]
        );
    }

    #[test]
    fn candidates_cover_dimension_without_gaps() {
        let points = critical_points(
            &Predicate::or([x(ComparisonOp::LessThanOrEqual, 5), x(ComparisonOp::Equal, 6)]),
            &schema(),
            0,
        );
        let ranges = candidate_ranges(&points, ColumnType::Int64);
        let rendered: Vec<String> = ranges.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["(-inf, 4]", "[5, 5]", "[6, 6]", "[7, +inf)"]);

        assert_eq!(candidate_ranges(&[], ColumnType::Utf8), vec![KeyRange::all()]);
    }
}
