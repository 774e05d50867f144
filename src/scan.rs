//! Scan planning: pruning followed by per-partition filter pushdown.

use std::sync::Arc;

use crate::{
    logging::keyspan_log,
    pruning::{partition::PartitionSnapshot, PrunedPartition, Pruner},
    query::{
        eval::{self, Row},
        pushdown::{pushdown, NativeFilter},
        Predicate,
    },
    schema::TableSchema,
};

/// Work for one scan range: where to read, what the storage tier filters,
/// and what is rechecked on returned rows.
#[derive(Clone, Debug, PartialEq)]
pub struct PartitionScan {
    /// Pruned interval to read.
    pub partition: PrunedPartition,
    /// Filter handed to the storage tier.
    pub filter: Option<NativeFilter>,
    /// Predicate evaluated on returned rows.
    pub residual: Option<Predicate>,
}

impl PartitionScan {
    /// Whether a row read from the interval belongs in the result.
    ///
    /// Rows outside the pruned interval never match.
    pub fn matches(&self, schema: &TableSchema, key: &[u8], row: &Row) -> bool {
        self.partition.byte_range().contains(key)
            && self
                .filter
                .as_ref()
                .map_or(true, |filter| filter.evaluate(schema, row) == Some(true))
            && self
                .residual
                .as_ref()
                .map_or(true, |residual| eval::matches(residual, schema, row))
    }
}

/// Scan work for one query against one partition snapshot.
#[derive(Clone, Debug)]
pub struct ScanPlan {
    /// Storage name of the table.
    pub table: Arc<str>,
    /// Version of the partition snapshot the plan was built from.
    pub snapshot_version: u64,
    /// Scans in key order.
    pub scans: Vec<PartitionScan>,
}

impl ScanPlan {
    /// Whether the plan reads nothing.
    pub fn is_empty(&self) -> bool {
        self.scans.is_empty()
    }

    /// Number of distinct physical partitions touched.
    pub fn partitions_touched(&self) -> usize {
        let mut touched: Vec<usize> = self.scans.iter().map(|scan| scan.partition.partition).collect();
        touched.dedup();
        touched.len()
    }
}

/// Builds the scan plan for `predicate` over the partitions in `snapshot`.
///
/// Pruning falls back to scanning every partition when it fails, so planning
/// itself never errors.
pub fn plan_scan(
    predicate: Option<&Predicate>,
    snapshot: &PartitionSnapshot,
    schema: &TableSchema,
    pruner: &Pruner,
) -> ScanPlan {
    let scans: Vec<PartitionScan> = pruner
        .prune_or_all(predicate, snapshot.partitions(), schema)
        .into_iter()
        .map(|partition| {
            let split = partition
                .residual
                .as_ref()
                .map(|residual| pushdown(residual, schema))
                .unwrap_or_default();
            PartitionScan {
                partition,
                filter: split.filter,
                residual: split.residual,
            }
        })
        .collect();

    keyspan_log!(
        log::Level::Debug,
        "scan_planned",
        "table={} version={} scans={} native_filters={}",
        schema.storage_name(),
        snapshot.version(),
        scans.len(),
        scans.iter().filter(|scan| scan.filter.is_some()).count()
    );
    ScanPlan {
        table: Arc::from(schema.storage_name()),
        snapshot_version: snapshot.version(),
        scans,
    }
}

#[cfg(test)]
mod tests {
    use arrow_schema::DataType;

    use super::*;
    use crate::{
        key::{encode_key, KeyValue},
        pruning::partition::Partition,
        query::{ColumnRef, ComparisonOp, ScalarValue},
        schema::ColumnDef,
    };

    fn schema() -> TableSchema {
        TableSchema::try_new(
            "metrics",
            "ns:metrics",
            [
                ColumnDef::key("host", DataType::Utf8, 0),
                ColumnDef::key("ts", DataType::Int64, 1),
                ColumnDef::value("cpu", DataType::Float64, "m", "cpu"),
            ],
        )
        .unwrap()
    }

    fn key(schema: &TableSchema, host: &str, ts: i64) -> Vec<u8> {
        encode_key(&[KeyValue::Utf8(host.into()), KeyValue::Int64(ts)], schema).unwrap()
    }

    fn snapshot(schema: &TableSchema) -> PartitionSnapshot {
        let split = encode_key(&[KeyValue::Utf8("m".into())], schema).unwrap();
        PartitionSnapshot::try_new(
            vec![
                Partition::new(0, None, Some(split.clone())),
                Partition::new(1, Some(split), None),
            ],
            7,
        )
        .unwrap()
    }

    fn row(schema: &TableSchema, host: &str, ts: i64, cpu: f64) -> (Vec<u8>, Row) {
        let key = key(schema, host, ts);
        let row = Row::from_key(schema, &key, [("cpu", ScalarValue::Float64(cpu))]).unwrap();
        (key, row)
    }

    #[test]
    fn plans_key_ranges_and_pushes_value_filters() {
        let schema = schema();
        let snapshot = snapshot(&schema);
        let predicate = Predicate::and([
            Predicate::compare(ColumnRef::new("host"), ComparisonOp::Equal, ScalarValue::from("web")),
            Predicate::compare(ColumnRef::new("ts"), ComparisonOp::GreaterThanOrEqual, ScalarValue::from(100i64)),
            Predicate::compare(ColumnRef::new("cpu"), ComparisonOp::GreaterThan, ScalarValue::from(0.5)),
        ]);
        let plan = plan_scan(Some(&predicate), &snapshot, &schema, &Pruner::default());
        assert_eq!(&*plan.table, "ns:metrics");
        assert_eq!(plan.snapshot_version, 7);
        assert_eq!(plan.scans.len(), 1);
        assert_eq!(plan.partitions_touched(), 1);

        let scan = &plan.scans[0];
        assert_eq!(scan.partition.partition, 1);
        assert!(scan.filter.as_ref().is_some_and(|filter| !filter.reads_row_key()));

        let (key, hit) = row(&schema, "web", 150, 0.9);
        assert!(scan.matches(&schema, &key, &hit));
        let (key, cold) = row(&schema, "web", 150, 0.1);
        assert!(!scan.matches(&schema, &key, &cold));
        let (key, early) = row(&schema, "web", 50, 0.9);
        assert!(!scan.matches(&schema, &key, &early));
    }

    #[test]
    fn no_predicate_reads_everything_unfiltered() {
        let schema = schema();
        let snapshot = snapshot(&schema);
        let plan = plan_scan(None, &snapshot, &schema, &Pruner::default());
        assert_eq!(plan.scans.len(), 2);
        assert!(plan
            .scans
            .iter()
            .all(|scan| scan.filter.is_none() && scan.residual.is_none()));
    }
}
