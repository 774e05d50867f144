#![deny(missing_docs)]
//! Predicate-driven partition pruning and filter pushdown for
//! range-partitioned, sorted composite-key stores.
//!
//! A query's filter predicate is used twice. Its key-bearing part is turned
//! into ordered key ranges, dimension by dimension, and intersected with the
//! table's partitions so only partitions that may hold qualifying rows are
//! visited. What remains is split into a filter the storage tier evaluates
//! during the scan and a residual rechecked on returned rows.

mod logging;

/// Typed key values and the order-preserving composite key codec.
pub mod key;

/// Partition pruning, partition metadata and pruning configuration.
pub mod pruning;

/// Predicate passes: critical points, partial evaluation, range composition,
/// row evaluation and pushdown.
pub mod query;

/// Key ranges over typed values and encoded bytes.
pub mod range;

/// Scan planning over a partition snapshot.
pub mod scan;

/// Table schemas and key column layout.
pub mod schema;

pub use crate::{
    key::{decode_key, encode_key, DecodedKey, KeyDecodeError, KeyEncodeError, KeyValue},
    pruning::{
        config::PruningConfig,
        partition::{Partition, PartitionCache, PartitionDirectory, PartitionSnapshot},
        prune, PruneError, PrunedPartition, Pruner,
    },
    query::{
        compose::{generate_ranges, CriticalPointRange, MultiDimCriticalPointRange},
        pushdown::{pushdown, NativeFilter, Pushdown},
        ColumnRef, ComparisonOp, Predicate, PredicateBuilder, ScalarValue,
    },
    range::{ByteRange, KeyRange},
    scan::{plan_scan, PartitionScan, ScanPlan},
    schema::{ColumnDef, ColumnType, SchemaError, TableSchema},
};
