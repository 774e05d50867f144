//! Multi-dimensional range composition.
//!
//! The composer walks key dimensions in order. At each dimension it splits
//! the candidate space at the predicate's critical points, partially
//! evaluates the predicate on every candidate and drops the ones that are
//! definitely false. A candidate that pins the dimension to a single value,
//! and whose residual still mentions a later key column, is refined
//! recursively at the next dimension under that pinned value. Every other
//! surviving candidate is final.

use std::ops::Bound;

use super::{
    critical::{candidate_ranges, critical_points},
    partial::{evaluate_partial, PartialRow, Truth},
    Predicate,
};
use crate::{
    key::{prefix_successor, DecodedKey, KeyCodec, KeyEncodeError, KeyValue},
    pruning::PruneError,
    range::{ByteRange, KeyRange},
    schema::TableSchema,
};

/// A composed range on one key dimension, optionally refined on the next.
#[derive(Clone, Debug, PartialEq)]
pub struct CriticalPointRange {
    /// Key dimension the range applies to.
    pub dimension: usize,
    /// Values of the dimension covered.
    pub range: KeyRange<KeyValue>,
    /// Residual for rows in the range; `None` when every row matches.
    ///
    /// For refined nodes this is the predicate handed to the children.
    pub residual: Option<Predicate>,
    /// Refinement on the next dimension. Only present when `range` is a point.
    pub children: Vec<CriticalPointRange>,
}

impl CriticalPointRange {
    /// Whether the node is final (not refined further).
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Flattens the tree into one range per final node, in key order.
    pub fn flatten(&self) -> Vec<MultiDimCriticalPointRange> {
        let mut out = Vec::new();
        self.flatten_into(&mut Vec::new(), &mut out);
        out
    }

    fn flatten_into(&self, prefix: &mut Vec<KeyValue>, out: &mut Vec<MultiDimCriticalPointRange>) {
        if self.is_leaf() {
            out.push(MultiDimCriticalPointRange {
                prefix: prefix.clone(),
                range: self.range.clone(),
                residual: self.residual.clone(),
            });
            return;
        }
        // Refined nodes are always points.
        let Some(point) = self.range.as_point() else {
            return;
        };
        prefix.push(point.clone());
        for child in &self.children {
            child.flatten_into(prefix, out);
        }
        prefix.pop();
    }
}

/// A fully composed range: a pinned key prefix and a range on the next
/// dimension, with the residual still to be checked per row.
#[derive(Clone, Debug, PartialEq)]
pub struct MultiDimCriticalPointRange {
    /// Pinned values of the leading key dimensions.
    pub prefix: Vec<KeyValue>,
    /// Range on dimension `prefix.len()`.
    pub range: KeyRange<KeyValue>,
    /// Residual for rows in the range; `None` when every row matches.
    pub residual: Option<Predicate>,
}

impl MultiDimCriticalPointRange {
    /// Key dimension of `range`.
    pub fn dimension(&self) -> usize {
        self.prefix.len()
    }

    /// Encoded key interval `[start, end)` covering every row in the range.
    ///
    /// Returns `None` when the interval is empty.
    pub fn to_byte_range(&self, codec: &KeyCodec) -> Result<Option<ByteRange>, KeyEncodeError> {
        let prefix = codec.encode(&self.prefix)?;
        let with_value = |value: &KeyValue| {
            let mut values = self.prefix.clone();
            values.push(value.clone());
            codec.encode(&values)
        };

        let start = match &self.range.start {
            Bound::Unbounded => prefix.clone(),
            Bound::Included(value) => with_value(value)?,
            Bound::Excluded(value) => match prefix_successor(&with_value(value)?) {
                Some(next) => next,
                None => return Ok(None),
            },
        };
        let end = match &self.range.end {
            Bound::Unbounded => prefix_successor(&prefix),
            Bound::Included(value) => prefix_successor(&with_value(value)?),
            Bound::Excluded(value) => Some(with_value(value)?),
        };
        let range = ByteRange::new(Some(start), end);
        Ok((!range.is_empty()).then_some(range))
    }
}

/// Extent of a partition on each key dimension, derived from its decoded
/// boundary keys.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PartitionExtent {
    start: Option<DecodedKey>,
    end: Option<DecodedKey>,
}

impl PartitionExtent {
    /// The whole keyspace.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Extent from decoded boundaries; `end` is exclusive. Empty boundaries
    /// are treated as unbounded.
    pub fn new(start: Option<DecodedKey>, end: Option<DecodedKey>) -> Self {
        Self {
            start: start.filter(|key| !key.is_empty()),
            end: end.filter(|key| !key.is_empty()),
        }
    }

    /// Values of `dimension` that keys beginning with `prefix` may take inside
    /// the partition. `None` when no such key lies in the partition.
    ///
    /// The lower side is only bounded while `prefix` still equals the start
    /// key's leading values. The upper side becomes exclusive when the end key
    /// stops right after `dimension`.
    pub fn span(&self, dimension: usize, prefix: &[KeyValue]) -> Option<KeyRange<KeyValue>> {
        let lower = match &self.start {
            Some(start) if start.len() > dimension && start.values()[..dimension] == *prefix => {
                Bound::Included(start.values()[dimension].clone())
            }
            _ => Bound::Unbounded,
        };
        let upper = match &self.end {
            Some(end) if end.len() >= dimension && end.values()[..dimension] == *prefix => {
                if end.len() == dimension {
                    return None;
                } else if end.len() == dimension + 1 {
                    Bound::Excluded(end.values()[dimension].clone())
                } else {
                    Bound::Included(end.values()[dimension].clone())
                }
            }
            _ => Bound::Unbounded,
        };
        let span = KeyRange::new(lower, upper);
        (!span.is_empty()).then_some(span)
    }
}

/// Composes per-dimension critical point ranges into a range tree.
#[derive(Clone, Copy, Debug)]
pub struct RangeComposer<'a> {
    schema: &'a TableSchema,
}

impl<'a> RangeComposer<'a> {
    /// Composer for a table schema.
    pub fn new(schema: &'a TableSchema) -> Self {
        Self { schema }
    }

    /// Composes ranges over the whole keyspace.
    pub fn compose(&self, predicate: &Predicate) -> Result<Vec<CriticalPointRange>, PruneError> {
        self.compose_within(predicate, &PartitionExtent::unbounded())
    }

    /// Composes ranges restricted to a partition's extent.
    ///
    /// Pinning follows the partition as well as the predicate: when the
    /// partition holds a single value on a dimension, the composer refines
    /// under it even if the predicate never constrains that dimension.
    pub fn compose_within(
        &self,
        predicate: &Predicate,
        extent: &PartitionExtent,
    ) -> Result<Vec<CriticalPointRange>, PruneError> {
        let predicate = predicate.clone().to_nnf();
        self.compose_dimension(&predicate, 0, &mut Vec::new(), extent)
    }

    fn compose_dimension(
        &self,
        predicate: &Predicate,
        dimension: usize,
        prefix: &mut Vec<KeyValue>,
        extent: &PartitionExtent,
    ) -> Result<Vec<CriticalPointRange>, PruneError> {
        let Some(ty) = self.schema.key_type(dimension) else {
            return Err(PruneError::DimensionOutOfRange {
                dimension,
                key_columns: self.schema.key_len(),
            });
        };
        let Some(span) = extent.span(dimension, prefix) else {
            return Ok(Vec::new());
        };

        let points = critical_points(predicate, self.schema, dimension);
        let mut out: Vec<CriticalPointRange> = Vec::new();
        for candidate in candidate_ranges(&points, ty) {
            let Some(range) = candidate
                .intersect(&span)
                .and_then(|range| range.canonicalize(ty))
            else {
                continue;
            };
            let residual = match evaluate_partial(predicate, self.schema, &PartialRow::new(prefix, &range)) {
                Truth::False => continue,
                Truth::True => None,
                Truth::Maybe(residual) => Some(residual),
            };

            let refine_at = match (&residual, range.as_point()) {
                (Some(residual), Some(point)) if self.mentions_later_key(residual, dimension) => {
                    Some((residual.clone(), point.clone()))
                }
                _ => None,
            };
            if let Some((residual, point)) = refine_at {
                prefix.push(point);
                let children = self.compose_dimension(&residual, dimension + 1, prefix, extent);
                prefix.pop();
                let children = children?;
                if children.is_empty() {
                    continue;
                }
                out.push(CriticalPointRange {
                    dimension,
                    range,
                    residual: Some(residual),
                    children,
                });
                continue;
            }

            let node = CriticalPointRange {
                dimension,
                range,
                residual,
                children: Vec::new(),
            };
            if let Some(last) = out
                .last_mut()
                .filter(|last| last.is_leaf() && last.residual == node.residual)
            {
                if let Some(merged) = last.range.merge_adjacent(&node.range, ty) {
                    last.range = merged;
                    continue;
                }
            }
            out.push(node);
        }
        Ok(out)
    }

    fn mentions_later_key(&self, predicate: &Predicate, dimension: usize) -> bool {
        predicate.references(|name| {
            self.schema
                .key_dimension(name)
                .is_some_and(|other| other > dimension)
        })
    }
}

/// Composes ranges for `predicate` over the whole keyspace.
pub fn generate_ranges(
    predicate: &Predicate,
    schema: &TableSchema,
) -> Result<Vec<CriticalPointRange>, PruneError> {
    RangeComposer::new(schema).compose(predicate)
}
