//! Pruning configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default cap on the number of scan ranges a single prune may emit.
pub const DEFAULT_MAX_RANGES: usize = 4096;
/// Default lifetime of cached partition metadata.
pub const DEFAULT_PARTITION_EXPIRATION: Duration = Duration::from_secs(600);

/// Configuration for pruning behavior.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PruningConfig {
    pub(crate) no_pruning: bool,
    pub(crate) max_ranges: usize,
    #[serde(with = "duration_secs")]
    pub(crate) partition_expiration: Duration,
}

impl Default for PruningConfig {
    fn default() -> Self {
        Self {
            no_pruning: false,
            max_ranges: DEFAULT_MAX_RANGES,
            partition_expiration: DEFAULT_PARTITION_EXPIRATION,
        }
    }
}

impl PruningConfig {
    /// Disable pruning: every partition is scanned with the full predicate.
    pub fn no_pruning(self, no_pruning: bool) -> Self {
        PruningConfig { no_pruning, ..self }
    }

    /// Cap on emitted scan ranges; past it, each partition is scanned whole.
    pub fn max_ranges(self, max_ranges: usize) -> Self {
        PruningConfig {
            max_ranges: max_ranges.max(1),
            ..self
        }
    }

    /// How long fetched partition metadata stays fresh.
    pub fn partition_expiration(self, partition_expiration: Duration) -> Self {
        PruningConfig {
            partition_expiration,
            ..self
        }
    }

    /// Whether pruning is disabled.
    pub fn is_disabled(&self) -> bool {
        self.no_pruning
    }

    /// Cap on emitted scan ranges.
    pub fn range_limit(&self) -> usize {
        self.max_ranges
    }

    /// Lifetime of cached partition metadata.
    pub fn expiration(&self) -> Duration {
        self.partition_expiration
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_setters() {
        let config = PruningConfig::default()
            .no_pruning(true)
            .max_ranges(0)
            .partition_expiration(Duration::from_secs(5));
        assert!(config.is_disabled());
        assert_eq!(config.range_limit(), 1);
        assert_eq!(config.expiration(), Duration::from_secs(5));
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: PruningConfig =
            serde_json::from_str(r#"{"max_ranges": 16, "partition_expiration": 30}"#).unwrap();
        assert_eq!(
            config,
            PruningConfig::default()
                .max_ranges(16)
                .partition_expiration(Duration::from_secs(30))
        );
    }
}
