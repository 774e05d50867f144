//! Partition metadata and its time-bounded cache.

use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::RwLock;
use thiserror::Error;

use super::config::PruningConfig;
use crate::{logging::keyspan_log, range::ByteRange};

/// A contiguous key range stored together, with its network location.
///
/// `start` is inclusive and `end` exclusive; `None` (or an empty key) means
/// unbounded on that side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Partition {
    index: usize,
    start: Option<Vec<u8>>,
    end: Option<Vec<u8>>,
    location: Option<Arc<str>>,
}

impl Partition {
    /// Partition `index` covering `[start, end)`.
    pub fn new(index: usize, start: Option<Vec<u8>>, end: Option<Vec<u8>>) -> Self {
        Self {
            index,
            start: start.filter(|key| !key.is_empty()),
            end: end.filter(|key| !key.is_empty()),
            location: None,
        }
    }

    /// Attaches the address of the server holding the partition.
    pub fn with_location(mut self, location: impl Into<Arc<str>>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Position of the partition in the table's partition list.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Inclusive start key.
    pub fn start(&self) -> Option<&[u8]> {
        self.start.as_deref()
    }

    /// Exclusive end key.
    pub fn end(&self) -> Option<&[u8]> {
        self.end.as_deref()
    }

    /// Server address, when known.
    pub fn location(&self) -> Option<&Arc<str>> {
        self.location.as_ref()
    }

    /// Encoded key interval covered by the partition.
    pub fn byte_range(&self) -> ByteRange {
        ByteRange::new(self.start.clone(), self.end.clone())
    }
}

/// Errors raised while fetching or validating partition metadata.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The metadata source could not be reached.
    #[error("partition directory unavailable: {0}")]
    Unavailable(String),
    /// The fetched partitions are out of order or overlap.
    #[error("partition {index} overlaps or precedes its predecessor")]
    Overlapping {
        /// Index of the offending partition.
        index: usize,
    },
    /// A partition ends before it starts.
    #[error("partition {index} has an empty key range")]
    EmptyPartition {
        /// Index of the offending partition.
        index: usize,
    },
}

/// Source of partition metadata for a table.
pub trait PartitionDirectory: Send + Sync {
    /// Fetches the table's partitions in key order.
    fn fetch(&self, table: &str) -> Result<Vec<Partition>, DirectoryError>;
}

/// Immutable view of a table's partitions at one point in time.
#[derive(Clone)]
pub struct PartitionSnapshot {
    partitions: Arc<[Partition]>,
    version: u64,
    fetched_at: Instant,
}

impl PartitionSnapshot {
    /// Validates and wraps a partition list.
    ///
    /// Partitions must be sorted by start key, non-overlapping, and non-empty.
    pub fn try_new(partitions: Vec<Partition>, version: u64) -> Result<Self, DirectoryError> {
        for (position, partition) in partitions.iter().enumerate() {
            if partition.byte_range().is_empty() {
                return Err(DirectoryError::EmptyPartition {
                    index: partition.index,
                });
            }
            let Some(previous) = position.checked_sub(1).map(|prev| &partitions[prev]) else {
                continue;
            };
            let ordered = match (previous.end(), partition.start()) {
                (Some(previous_end), Some(start)) => previous_end <= start,
                _ => false,
            };
            if !ordered {
                return Err(DirectoryError::Overlapping {
                    index: partition.index,
                });
            }
        }
        Ok(Self {
            partitions: partitions.into(),
            version,
            fetched_at: Instant::now(),
        })
    }

    fn empty() -> Self {
        Self {
            partitions: Arc::from(Vec::new()),
            version: 0,
            fetched_at: Instant::now(),
        }
    }

    /// Partitions in key order.
    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    /// Monotonic version assigned by the cache.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// When the snapshot was built.
    pub fn fetched_at(&self) -> Instant {
        self.fetched_at
    }
}

impl fmt::Debug for PartitionSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionSnapshot")
            .field("version", &self.version)
            .field("partitions", &self.partitions.len())
            .finish()
    }
}

/// Shared, expiring cache of a table's partition metadata.
///
/// Readers take cheap `Arc` snapshots; a refresh swaps the snapshot
/// atomically, so a prune in flight keeps the view it started with.
pub struct PartitionCache {
    table: Arc<str>,
    ttl: Duration,
    state: RwLock<CacheState>,
}

struct CacheState {
    current: Option<Arc<PartitionSnapshot>>,
    // Survives invalidation so versions never repeat.
    last_version: u64,
}

impl PartitionCache {
    /// Empty cache for `table`; the first refresh always fetches.
    pub fn new(table: impl Into<Arc<str>>, ttl: Duration) -> Self {
        Self {
            table: table.into(),
            ttl,
            state: RwLock::new(CacheState {
                current: None,
                last_version: 0,
            }),
        }
    }

    /// Empty cache for `table` whose TTL is the configured partition
    /// expiration.
    pub fn with_config(table: impl Into<Arc<str>>, config: &PruningConfig) -> Self {
        Self::new(table, config.expiration())
    }

    /// How long a fetched snapshot stays fresh.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The current snapshot; empty before the first refresh.
    pub fn snapshot(&self) -> Arc<PartitionSnapshot> {
        self.state
            .read()
            .current
            .clone()
            .unwrap_or_else(|| Arc::new(PartitionSnapshot::empty()))
    }

    /// Whether the cached snapshot is missing or older than the TTL at `now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        match self.state.read().current.as_ref() {
            Some(snapshot) => now.saturating_duration_since(snapshot.fetched_at) >= self.ttl,
            None => true,
        }
    }

    /// Drops the cached snapshot so the next refresh fetches.
    pub fn invalidate(&self) {
        self.state.write().current = None;
    }

    /// Installs a freshly fetched partition list and returns its snapshot.
    pub fn install(&self, partitions: Vec<Partition>) -> Result<Arc<PartitionSnapshot>, DirectoryError> {
        let snapshot = {
            let mut state = self.state.write();
            let version = state.last_version + 1;
            let snapshot = Arc::new(PartitionSnapshot::try_new(partitions, version)?);
            state.last_version = version;
            state.current = Some(Arc::clone(&snapshot));
            snapshot
        };
        keyspan_log!(
            log::Level::Debug,
            "partition_cache_refresh",
            "table={} version={} partitions={}",
            self.table,
            snapshot.version(),
            snapshot.partitions().len()
        );
        Ok(snapshot)
    }

    /// Returns the cached snapshot, fetching a new one from `directory` when
    /// it has expired.
    pub fn refresh_if_expired(
        &self,
        directory: &dyn PartitionDirectory,
    ) -> Result<Arc<PartitionSnapshot>, DirectoryError> {
        if !self.is_expired(Instant::now()) {
            return Ok(self.snapshot());
        }
        let partitions = directory.fetch(&self.table)?;
        self.install(partitions)
    }
}

impl fmt::Debug for PartitionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionCache")
            .field("table", &self.table)
            .field("ttl", &self.ttl)
            .finish()
    }
}
