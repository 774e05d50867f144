mod common;

use arrow_schema::DataType;
use common::{key, schema_with_key, split_at};
use keyspan::{
    prune, pushdown,
    query::eval::{self, Row},
    ColumnRef, ColumnType, ComparisonOp, KeyValue, Partition, Predicate, PruningConfig, Pruner,
    ScalarValue, TableSchema,
};
use proptest::{collection::vec, prelude::*};

const OPS: [ComparisonOp; 6] = [
    ComparisonOp::Equal,
    ComparisonOp::NotEqual,
    ComparisonOp::LessThan,
    ComparisonOp::LessThanOrEqual,
    ComparisonOp::GreaterThan,
    ComparisonOp::GreaterThanOrEqual,
];

fn schema() -> TableSchema {
    schema_with_key(
        vec![("a", DataType::Int32), ("b", DataType::Int32), ("v", DataType::Int64)],
        &["a", "b"],
    )
}

fn literal() -> impl Strategy<Value = ScalarValue> {
    prop_oneof![
        8 => (-2i64..8).prop_map(ScalarValue::Int64),
        1 => Just(ScalarValue::Null),
    ]
}

fn column() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("a"), Just("b"), Just("v")]
}

fn leaf() -> impl Strategy<Value = Predicate> {
    prop_oneof![
        6 => (column(), 0..OPS.len(), literal(), any::<bool>()).prop_map(|(column, op, value, flipped)| {
            if flipped {
                Predicate::compare(value, OPS[op].flipped(), ColumnRef::new(column))
            } else {
                Predicate::compare(ColumnRef::new(column), OPS[op], value)
            }
        }),
        2 => (column(), vec(literal(), 0..4), any::<bool>())
            .prop_map(|(column, list, negated)| Predicate::in_list(ColumnRef::new(column), list, negated)),
        1 => any::<bool>().prop_map(|value| if value { Predicate::always() } else { Predicate::never() }),
    ]
}

fn predicate() -> impl Strategy<Value = Predicate> {
    leaf().prop_recursive(4, 32, 4, |inner| {
        prop_oneof![
            vec(inner.clone(), 1..4).prop_map(Predicate::and),
            vec(inner.clone(), 1..4).prop_map(Predicate::or),
            inner.prop_map(Predicate::not),
        ]
    })
}

/// Split keys over `(a, b)` or the prefix `a` alone, deduplicated and sorted.
fn partitions(schema: &TableSchema) -> impl Strategy<Value = Vec<Partition>> {
    let schema = schema.clone();
    vec((-1i32..7, prop::option::of(-1i32..7)), 0..5).prop_map(move |splits| {
        let mut keys: Vec<Vec<u8>> = splits
            .into_iter()
            .map(|(a, b)| {
                let mut values = vec![KeyValue::Int32(a)];
                values.extend(b.map(KeyValue::Int32));
                key(&schema, &values)
            })
            .collect();
        keys.sort();
        keys.dedup();
        split_at(keys)
    })
}

/// Strings around the escape byte; `"a\0"` sorts between `"a"` and `"a\0b"`.
const TEXTS: [&str; 6] = ["", "a", "a\0", "a\0b", "ab", "b\0"];
const FLOATS: [f64; 7] = [f64::NEG_INFINITY, -1.0, -0.0, 0.0, 0.5, 2.0, f64::INFINITY];

fn mixed_schema() -> TableSchema {
    schema_with_key(
        vec![
            ("s", DataType::Utf8),
            ("f", DataType::Float64),
            ("flag", DataType::Boolean),
            ("v", DataType::Int64),
        ],
        &["s", "f", "flag"],
    )
}

fn mixed_leaf() -> impl Strategy<Value = Predicate> {
    let text = prop::sample::select(TEXTS.to_vec()).prop_map(ScalarValue::from);
    let float = prop_oneof![
        6 => prop::sample::select(FLOATS.to_vec()),
        1 => Just(f64::NAN),
        1 => Just(1.0),
    ]
    .prop_map(ScalarValue::Float64);
    let operand = prop_oneof![
        3 => (Just("s"), text),
        3 => (Just("f"), float),
        2 => (Just("flag"), any::<bool>().prop_map(ScalarValue::Boolean)),
        1 => (Just("v"), (0i64..5).prop_map(ScalarValue::Int64)),
        1 => (prop_oneof![Just("s"), Just("f"), Just("flag")], Just(ScalarValue::Null)),
    ]
    .boxed();
    prop_oneof![
        5 => (operand.clone(), 0..OPS.len())
            .prop_map(|((column, value), op)| Predicate::compare(ColumnRef::new(column), OPS[op], value)),
        1 => (vec(operand, 1..4), any::<bool>()).prop_map(|(items, negated)| {
            let column = items[0].0;
            let list = items.into_iter().filter(|(c, _)| *c == column).map(|(_, value)| value);
            Predicate::in_list(ColumnRef::new(column), list, negated)
        }),
    ]
}

fn mixed_predicate() -> impl Strategy<Value = Predicate> {
    mixed_leaf().prop_recursive(3, 16, 3, |inner| {
        prop_oneof![
            vec(inner.clone(), 1..4).prop_map(Predicate::and),
            vec(inner.clone(), 1..4).prop_map(Predicate::or),
            inner.prop_map(Predicate::not),
        ]
    })
}

/// Split keys over `(s)`, `(s, f)` or `(s, f, flag)`.
fn mixed_partitions(schema: &TableSchema) -> impl Strategy<Value = Vec<Partition>> {
    let schema = schema.clone();
    let split = (
        0..TEXTS.len(),
        prop::option::of((0..FLOATS.len(), prop::option::of(any::<bool>()))),
    );
    vec(split, 0..5).prop_map(move |splits| {
        let mut keys: Vec<Vec<u8>> = splits
            .into_iter()
            .map(|(s, rest)| {
                let mut values = vec![KeyValue::Utf8(TEXTS[s].into())];
                if let Some((f, flag)) = rest {
                    values.push(KeyValue::float64(FLOATS[f]));
                    values.extend(flag.map(KeyValue::Boolean));
                }
                key(&schema, &values)
            })
            .collect();
        keys.sort();
        keys.dedup();
        split_at(keys)
    })
}

fn mixed_rows(schema: &TableSchema) -> Vec<(Vec<u8>, Row)> {
    let mut out = Vec::new();
    for s in TEXTS {
        for f in FLOATS.into_iter().chain([f64::NAN, 1.0]) {
            for flag in [false, true] {
                for v in [ScalarValue::Null, ScalarValue::Int64(3)] {
                    let key = key(
                        schema,
                        &[KeyValue::Utf8(s.into()), KeyValue::float64(f), KeyValue::Boolean(flag)],
                    );
                    let row = Row::new(vec![
                        ScalarValue::from(s),
                        ScalarValue::Float64(f),
                        ScalarValue::Boolean(flag),
                        v,
                    ]);
                    out.push((key, row));
                }
            }
        }
    }
    out
}

fn key_value(ty: ColumnType) -> BoxedStrategy<KeyValue> {
    match ty {
        ColumnType::Boolean => any::<bool>().prop_map(KeyValue::Boolean).boxed(),
        ColumnType::Int32 => any::<i32>().prop_map(KeyValue::Int32).boxed(),
        ColumnType::Int64 => any::<i64>().prop_map(KeyValue::Int64).boxed(),
        ColumnType::Float64 => prop_oneof![
            any::<f64>().prop_filter("NaN has no tuple order", |f| !f.is_nan()),
            prop::sample::select(FLOATS.to_vec()),
        ]
        .prop_map(KeyValue::float64)
        .boxed(),
        ColumnType::Utf8 => vec(prop_oneof![Just('\0'), Just('a'), any::<char>()], 0..5)
            .prop_map(|chars| KeyValue::Utf8(chars.into_iter().collect()))
            .boxed(),
        ColumnType::Binary => vec(prop_oneof![Just(0u8), Just(1u8), Just(0xff), any::<u8>()], 0..5)
            .prop_map(KeyValue::Binary)
            .boxed(),
    }
}

const ALL_TYPES: [(&str, DataType, ColumnType); 6] = [
    ("b", DataType::Boolean, ColumnType::Boolean),
    ("i", DataType::Int32, ColumnType::Int32),
    ("l", DataType::Int64, ColumnType::Int64),
    ("f", DataType::Float64, ColumnType::Float64),
    ("s", DataType::Utf8, ColumnType::Utf8),
    ("y", DataType::Binary, ColumnType::Binary),
];

/// A key over every column type, in a random column order, with two tuples
/// drawn for it.
fn typed_tuples() -> impl Strategy<Value = (Vec<usize>, Vec<KeyValue>, Vec<KeyValue>)> {
    Just((0..ALL_TYPES.len()).collect::<Vec<_>>())
        .prop_shuffle()
        .prop_flat_map(|order| {
            let tuple: Vec<_> = order.iter().map(|i| key_value(ALL_TYPES[*i].2)).collect();
            (Just(order), tuple.clone(), tuple)
        })
}

fn rows(schema: &TableSchema) -> Vec<(Vec<u8>, Row)> {
    let mut out = Vec::new();
    for a in -1..7 {
        for b in -1..7 {
            for v in [ScalarValue::Null, ScalarValue::Int64(0), ScalarValue::Int64(3)] {
                let key = key(schema, &[KeyValue::Int32(a), KeyValue::Int32(b)]);
                let row = Row::new(vec![ScalarValue::Int64(a.into()), ScalarValue::Int64(b.into()), v]);
                out.push((key, row));
            }
        }
    }
    out
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn key_encoding_preserves_order_for_every_column_type(
        (order, lhs, rhs) in typed_tuples(),
        cut in (0usize..=6, 0usize..=6),
    ) {
        let fields: Vec<_> = order.iter().map(|i| (ALL_TYPES[*i].0, ALL_TYPES[*i].1.clone())).collect();
        let names: Vec<_> = order.iter().map(|i| ALL_TYPES[*i].0).collect();
        let schema = schema_with_key(fields, &names);
        prop_assert_eq!(key(&schema, &lhs).cmp(&key(&schema, &rhs)), lhs.cmp(&rhs));
        let (lhs, rhs) = (&lhs[..cut.0], &rhs[..cut.1]);
        prop_assert_eq!(key(&schema, lhs).cmp(&key(&schema, rhs)), lhs.cmp(rhs));
    }

    #[test]
    fn mixed_type_pruning_is_sound_and_exact(
        predicate in mixed_predicate(),
        max_ranges in prop_oneof![Just(usize::MAX), 1usize..6],
        layout in mixed_partitions(&mixed_schema()),
    ) {
        let schema = mixed_schema();
        let pruner = Pruner::new(PruningConfig::default().max_ranges(max_ranges));
        let pruned = pruner.prune(Some(&predicate), &layout, &schema).expect("prune");

        for (key, row) in mixed_rows(&schema) {
            let expected = eval::matches(&predicate, &schema, &row);
            let covering: Vec<_> = pruned
                .iter()
                .filter(|entry| entry.byte_range().contains(&key))
                .collect();
            prop_assert!(covering.len() <= 1, "overlapping scan ranges for {:?}", row);
            match covering.first() {
                Some(entry) => {
                    let found = entry
                        .residual
                        .as_ref()
                        .map_or(true, |residual| eval::matches(residual, &schema, &row));
                    prop_assert_eq!(found, expected, "row {:?} in {:?}", row, entry);
                }
                None => prop_assert!(!expected, "pruned away qualifying row {:?}", row),
            }
        }
    }

    #[test]
    fn mixed_type_pushdown_preserves_predicate(predicate in mixed_predicate()) {
        let schema = mixed_schema();
        let split = pushdown(&predicate, &schema);
        for (_, row) in mixed_rows(&schema) {
            let expected = eval::matches(&predicate, &schema, &row);
            prop_assert_eq!(split.matches(&schema, &row), expected, "row {:?}", row);
            if expected {
                if let Some(filter) = &split.filter {
                    prop_assert_eq!(filter.evaluate(&schema, &row), Some(true));
                }
            }
        }
    }

    #[test]
    fn pruning_is_sound_and_residuals_are_exact(
        predicate in predicate(),
        max_ranges in prop_oneof![Just(usize::MAX), 1usize..6],
        layout in partitions(&schema()),
    ) {
        let schema = schema();
        let pruner = Pruner::new(PruningConfig::default().max_ranges(max_ranges));
        let pruned = pruner.prune(Some(&predicate), &layout, &schema).expect("prune");

        for (key, row) in rows(&schema) {
            let expected = eval::matches(&predicate, &schema, &row);
            let covering: Vec<_> = pruned
                .iter()
                .filter(|entry| entry.byte_range().contains(&key))
                .collect();
            prop_assert!(covering.len() <= 1, "overlapping scan ranges for {:?}", row);
            match covering.first() {
                Some(entry) => {
                    let found = entry
                        .residual
                        .as_ref()
                        .map_or(true, |residual| eval::matches(residual, &schema, &row));
                    prop_assert_eq!(found, expected, "row {:?} in {:?}", row, entry);
                }
                None => prop_assert!(!expected, "pruned away qualifying row {:?}", row),
            }
        }
    }

    #[test]
    fn pushdown_preserves_predicate(predicate in predicate()) {
        let schema = schema();
        let split = pushdown(&predicate, &schema);
        for (_, row) in rows(&schema) {
            let expected = eval::matches(&predicate, &schema, &row);
            prop_assert_eq!(split.matches(&schema, &row), expected);
            if expected {
                if let Some(filter) = &split.filter {
                    prop_assert_eq!(filter.evaluate(&schema, &row), Some(true));
                }
            }
        }
    }

    #[test]
    fn negation_normal_form_is_idempotent(predicate in predicate()) {
        let once = predicate.clone().to_nnf();
        prop_assert!(once.is_nnf());
        prop_assert_eq!(once.clone().to_nnf(), once.clone());
        let schema = schema();
        for (_, row) in rows(&schema) {
            prop_assert_eq!(
                eval::evaluate(&once, &schema, &row),
                eval::evaluate(&predicate, &schema, &row)
            );
        }
    }

    #[test]
    fn default_pruner_matches_free_function(
        predicate in predicate(),
        layout in partitions(&schema()),
    ) {
        let schema = schema();
        prop_assert_eq!(
            prune(Some(&predicate), &layout, &schema).expect("prune"),
            Pruner::default().prune(Some(&predicate), &layout, &schema).expect("prune")
        );
    }
}
