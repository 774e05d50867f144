//! Partition pruning.
//!
//! The pruner maps the ranges composed for a predicate onto the physical
//! partition list of a table. Every partition that may hold a qualifying row
//! survives, clipped to the key intervals that can match and tagged with the
//! residual predicate rows in those intervals must still satisfy. Partitions
//! no composed range touches are dropped.

pub mod config;
pub mod partition;

use std::sync::Arc;

use thiserror::Error;

use self::{config::PruningConfig, partition::Partition};
use crate::{
    key::{DecodedKey, KeyCodec, KeyDecodeError, KeyEncodeError},
    logging::keyspan_log,
    query::{
        compose::{CriticalPointRange, PartitionExtent, RangeComposer},
        Predicate,
    },
    range::ByteRange,
    schema::TableSchema,
};

/// Errors raised while pruning.
#[derive(Debug, Error)]
pub enum PruneError {
    /// A key dimension beyond the table's key columns was requested.
    #[error("key dimension {dimension} out of range for {key_columns} key columns")]
    DimensionOutOfRange {
        /// Requested dimension.
        dimension: usize,
        /// Number of key columns in the schema.
        key_columns: usize,
    },
    /// A composed bound could not be encoded.
    #[error(transparent)]
    Encode(#[from] KeyEncodeError),
}

/// A partition that survived pruning, clipped to the interval that can match.
#[derive(Clone, Debug, PartialEq)]
pub struct PrunedPartition {
    /// Position in the pruned output.
    pub index: usize,
    /// Index of the physical partition in the input list.
    pub partition: usize,
    /// Inclusive start key of the interval to scan; `None` is unbounded.
    pub start: Option<Vec<u8>>,
    /// Exclusive end key of the interval to scan; `None` is unbounded.
    pub end: Option<Vec<u8>>,
    /// Server holding the partition, when known.
    pub location: Option<Arc<str>>,
    /// Predicate rows in the interval must still satisfy; `None` when
    /// position alone satisfies the query.
    pub residual: Option<Predicate>,
}

impl PrunedPartition {
    fn whole(partition: &Partition, residual: Option<Predicate>) -> Self {
        Self {
            index: 0,
            partition: partition.index(),
            start: partition.start().map(<[u8]>::to_vec),
            end: partition.end().map(<[u8]>::to_vec),
            location: partition.location().cloned(),
            residual,
        }
    }

    fn clipped(partition: &Partition, range: ByteRange, residual: Option<Predicate>) -> Self {
        let (start, end) = range.into_parts();
        Self {
            index: 0,
            partition: partition.index(),
            start,
            end,
            location: partition.location().cloned(),
            residual,
        }
    }

    /// Encoded key interval to scan.
    pub fn byte_range(&self) -> ByteRange {
        ByteRange::new(self.start.clone(), self.end.clone())
    }
}

/// Pruning entry point holding the pruning configuration.
#[derive(Clone, Debug, Default)]
pub struct Pruner {
    config: PruningConfig,
}

impl Pruner {
    /// Pruner with an explicit configuration.
    pub fn new(config: PruningConfig) -> Self {
        Self { config }
    }

    /// Active configuration.
    pub fn config(&self) -> &PruningConfig {
        &self.config
    }

    /// Selects the partitions, and the intervals within them, that may hold
    /// rows satisfying `predicate`.
    ///
    /// Without a predicate every partition is returned unchanged. The output
    /// is ordered by key and re-indexed from zero.
    pub fn prune(
        &self,
        predicate: Option<&Predicate>,
        partitions: &[Partition],
        schema: &TableSchema,
    ) -> Result<Vec<PrunedPartition>, PruneError> {
        let Some(predicate) = predicate else {
            return Ok(reindex(
                partitions
                    .iter()
                    .map(|partition| PrunedPartition::whole(partition, None))
                    .collect(),
            ));
        };
        if self.config.is_disabled() {
            keyspan_log!(
                log::Level::Debug,
                "prune_skipped",
                "table={} reason=disabled partitions={}",
                schema.name(),
                partitions.len()
            );
            return Ok(keep_all(partitions, predicate));
        }

        let normalized = predicate.clone().to_nnf();
        match normalized.as_constant() {
            Some(false) => {
                keyspan_log!(
                    log::Level::Debug,
                    "prune_complete",
                    "table={} partitions={} kept=0 reason=contradiction",
                    schema.name(),
                    partitions.len()
                );
                return Ok(Vec::new());
            }
            Some(true) => {
                return Ok(reindex(
                    partitions
                        .iter()
                        .map(|partition| PrunedPartition::whole(partition, None))
                        .collect(),
                ));
            }
            None => {}
        }
        if !normalized.references(|name| schema.key_dimension(name).is_some()) {
            keyspan_log!(
                log::Level::Debug,
                "prune_skipped",
                "table={} reason=no_key_columns partitions={}",
                schema.name(),
                partitions.len()
            );
            return Ok(keep_all(partitions, predicate));
        }

        let composer = RangeComposer::new(schema);
        let codec = schema.key_codec();
        let mut per_partition = Vec::with_capacity(partitions.len());
        for partition in partitions {
            let extent = match partition_extent(partition, codec) {
                Ok(extent) => extent,
                Err(err) => {
                    keyspan_log!(
                        log::Level::Warn,
                        "partition_boundary_undecodable",
                        "table={} partition={} error={}",
                        schema.name(),
                        partition.index(),
                        err
                    );
                    per_partition.push(vec![PrunedPartition::whole(partition, Some(predicate.clone()))]);
                    continue;
                }
            };
            let tree = composer.compose_within(&normalized, &extent)?;
            per_partition.push(clip_to_partition(&tree, partition, codec)?);
        }

        let total: usize = per_partition.iter().map(Vec::len).sum();
        let limit = self.config.range_limit();
        if total > limit {
            keyspan_log!(
                log::Level::Info,
                "range_budget_exceeded",
                "table={} ranges={} limit={}",
                schema.name(),
                total,
                limit
            );
            per_partition = per_partition
                .into_iter()
                .map(|ranges| coalesce(ranges, predicate))
                .collect();
        }

        let kept = per_partition.iter().filter(|ranges| !ranges.is_empty()).count();
        let pruned = reindex(per_partition.into_iter().flatten().collect());
        keyspan_log!(
            log::Level::Debug,
            "prune_complete",
            "table={} partitions={} kept={} ranges={}",
            schema.name(),
            partitions.len(),
            kept,
            pruned.len()
        );
        Ok(pruned)
    }

    /// Like [`Pruner::prune`], but falls back to scanning every partition with
    /// the full predicate when pruning fails.
    pub fn prune_or_all(
        &self,
        predicate: Option<&Predicate>,
        partitions: &[Partition],
        schema: &TableSchema,
    ) -> Vec<PrunedPartition> {
        match self.prune(predicate, partitions, schema) {
            Ok(pruned) => pruned,
            Err(err) => {
                keyspan_log!(
                    log::Level::Warn,
                    "prune_fallback",
                    "table={} error={}",
                    schema.name(),
                    err
                );
                match predicate {
                    Some(predicate) => keep_all(partitions, predicate),
                    None => reindex(
                        partitions
                            .iter()
                            .map(|partition| PrunedPartition::whole(partition, None))
                            .collect(),
                    ),
                }
            }
        }
    }
}

/// Prunes `partitions` for `predicate` with the default configuration.
pub fn prune(
    predicate: Option<&Predicate>,
    partitions: &[Partition],
    schema: &TableSchema,
) -> Result<Vec<PrunedPartition>, PruneError> {
    Pruner::default().prune(predicate, partitions, schema)
}

fn keep_all(partitions: &[Partition], predicate: &Predicate) -> Vec<PrunedPartition> {
    reindex(
        partitions
            .iter()
            .map(|partition| PrunedPartition::whole(partition, Some(predicate.clone())))
            .collect(),
    )
}

fn reindex(mut pruned: Vec<PrunedPartition>) -> Vec<PrunedPartition> {
    for (index, entry) in pruned.iter_mut().enumerate() {
        entry.index = index;
    }
    pruned
}

fn partition_extent(partition: &Partition, codec: &KeyCodec) -> Result<PartitionExtent, KeyDecodeError> {
    let decode = |bytes: Option<&[u8]>| -> Result<Option<DecodedKey>, KeyDecodeError> {
        bytes.map(|bytes| codec.decode(bytes)).transpose()
    };
    Ok(PartitionExtent::new(
        decode(partition.start())?,
        decode(partition.end())?,
    ))
}

/// Encodes the composed ranges, clips them to the partition and merges
/// neighbours that abut and share a residual.
fn clip_to_partition(
    tree: &[CriticalPointRange],
    partition: &Partition,
    codec: &KeyCodec,
) -> Result<Vec<PrunedPartition>, PruneError> {
    let bounds = partition.byte_range();
    let mut out: Vec<(ByteRange, Option<Predicate>)> = Vec::new();
    for flat in tree.iter().flat_map(CriticalPointRange::flatten) {
        let Some(range) = flat.to_byte_range(codec)? else {
            continue;
        };
        let Some(range) = range.intersect(&bounds) else {
            continue;
        };
        if let Some((last, _)) = out
            .last_mut()
            .filter(|(last, residual)| last.abuts(&range) && *residual == flat.residual)
        {
            *last = last.hull(&range);
            continue;
        }
        out.push((range, flat.residual));
    }
    Ok(out
        .into_iter()
        .map(|(range, residual)| PrunedPartition::clipped(partition, range, residual))
        .collect())
}

/// Collapses one partition's intervals into their hull. The hull covers gaps
/// no composed range admitted, so it carries the full predicate.
fn coalesce(ranges: Vec<PrunedPartition>, predicate: &Predicate) -> Vec<PrunedPartition> {
    if ranges.len() <= 1 {
        return ranges;
    }
    let mut iter = ranges.into_iter();
    let Some(mut merged) = iter.next() else {
        return Vec::new();
    };
    let hull = iter.fold(merged.byte_range(), |hull, next| hull.hull(&next.byte_range()));
    let (start, end) = hull.into_parts();
    merged.start = start;
    merged.end = end;
    merged.residual = Some(predicate.clone());
    vec![merged]
}

#[cfg(test)]
mod tests {
    use arrow_schema::DataType;

    use super::*;
    use crate::{
        key::KeyValue,
        query::{ColumnRef, ComparisonOp, ScalarValue},
        schema::ColumnDef,
    };

    fn schema() -> TableSchema {
        TableSchema::try_new(
            "events",
            "events",
            [
                ColumnDef::key("k", DataType::Int64, 0),
                ColumnDef::value("v", DataType::Int64, "cf", "v"),
            ],
        )
        .unwrap()
    }

    fn key(schema: &TableSchema, v: i64) -> Vec<u8> {
        schema.key_codec().encode(&[KeyValue::Int64(v)]).unwrap()
    }

    fn partitions(schema: &TableSchema) -> Vec<Partition> {
        vec![
            Partition::new(0, None, Some(key(schema, 100))),
            Partition::new(1, Some(key(schema, 100)), Some(key(schema, 200))).with_location("rs2"),
            Partition::new(2, Some(key(schema, 200)), None),
        ]
    }

    fn cmp(column: &str, op: ComparisonOp, value: i64) -> Predicate {
        Predicate::compare(ColumnRef::new(column), op, ScalarValue::from(value))
    }

    #[test]
    fn absent_predicate_keeps_everything() {
        let schema = schema();
        let parts = partitions(&schema);
        let pruned = prune(None, &parts, &schema).unwrap();
        assert_eq!(pruned.len(), 3);
        assert!(pruned.iter().all(|p| p.residual.is_none()));
        assert_eq!(pruned[1].location.as_deref(), Some("rs2"));
        assert_eq!(pruned[1].start, Some(key(&schema, 100)));
    }

    #[test]
    fn drops_partitions_outside_the_range() {
        let schema = schema();
        let parts = partitions(&schema);
        let predicate = Predicate::and([
            cmp("k", ComparisonOp::GreaterThanOrEqual, 120),
            cmp("k", ComparisonOp::LessThan, 150),
        ]);
        let pruned = prune(Some(&predicate), &parts, &schema).unwrap();
        assert_eq!(pruned.len(), 1);
        assert_eq!(pruned[0].index, 0);
        assert_eq!(pruned[0].partition, 1);
        assert_eq!(pruned[0].residual, None);
        assert!(pruned[0].byte_range().contains(&key(&schema, 149)));
        assert!(!pruned[0].byte_range().contains(&key(&schema, 150)));
        assert!(!pruned[0].byte_range().contains(&key(&schema, 119)));
    }

    #[test]
    fn non_key_predicate_keeps_all_with_full_residual() {
        let schema = schema();
        let parts = partitions(&schema);
        let predicate = cmp("v", ComparisonOp::Equal, 3);
        let pruned = prune(Some(&predicate), &parts, &schema).unwrap();
        assert_eq!(pruned.len(), 3);
        assert!(pruned.iter().all(|p| p.residual.as_ref() == Some(&predicate)));
    }

    #[test]
    fn contradiction_prunes_everything() {
        let schema = schema();
        let parts = partitions(&schema);
        let predicate = Predicate::not(Predicate::always());
        assert!(prune(Some(&predicate), &parts, &schema).unwrap().is_empty());
        assert!(prune(Some(&predicate), &[], &schema).unwrap().is_empty());
    }

    #[test]
    fn undecodable_boundary_keeps_partition_whole() {
        let schema = schema();
        let mut parts = partitions(&schema);
        parts[2] = Partition::new(2, Some(vec![0xFF, 0x01]), None);
        let predicate = cmp("k", ComparisonOp::GreaterThan, 500);
        let pruned = prune(Some(&predicate), &parts, &schema).unwrap();
        assert_eq!(pruned.len(), 1);
        assert_eq!(pruned[0].partition, 2);
        assert_eq!(pruned[0].start, Some(vec![0xFF, 0x01]));
        assert_eq!(pruned[0].residual.as_ref(), Some(&predicate));
    }

    #[test]
    fn disabled_pruning_scans_everything() {
        let schema = schema();
        let parts = partitions(&schema);
        let predicate = cmp("k", ComparisonOp::Equal, 5);
        let pruner = Pruner::new(PruningConfig::default().no_pruning(true));
        let pruned = pruner.prune(Some(&predicate), &parts, &schema).unwrap();
        assert_eq!(pruned.len(), 3);
        assert!(pruned.iter().all(|p| p.residual.as_ref() == Some(&predicate)));
    }

    #[test]
    fn range_budget_coalesces_per_partition() {
        let schema = schema();
        let parts = partitions(&schema);
        let predicate = Predicate::in_list(
            ColumnRef::new("k"),
            [10i64, 20, 30, 110].map(ScalarValue::from),
            false,
        );
        let unlimited = prune(Some(&predicate), &parts, &schema).unwrap();
        assert_eq!(unlimited.len(), 4);
        assert!(unlimited.iter().all(|p| p.residual.is_none()));

        let pruner = Pruner::new(PruningConfig::default().max_ranges(2));
        let pruned = pruner.prune(Some(&predicate), &parts, &schema).unwrap();
        assert_eq!(pruned.len(), 2);
        assert_eq!(pruned[0].partition, 0);
        let hull = pruned[0].byte_range();
        assert!(hull.contains(&key(&schema, 10)));
        assert!(hull.contains(&key(&schema, 30)));
        assert!(!hull.contains(&key(&schema, 31)));
        assert_eq!(pruned[0].residual.as_ref(), Some(&predicate));
        assert_eq!(pruned[1].partition, 1);
        assert_eq!(pruned[1].residual, None);
    }
}
