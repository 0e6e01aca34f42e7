//! Key-to-partition placement.
//!
//! Keyed messages are placed by a stable hash of the key bytes so that
//! the same key always lands in the same partition for the life of the
//! topic. Keyless messages are spread by a topic-scoped round-robin
//! counter instead; that counter lives on the topic, not here.

use std::hash::{Hash, Hasher};

use brook_core::PartitionId;

/// Maps a message key to a partition index.
///
/// Implementations must be deterministic: the same key and partition
/// count always yield the same partition.
pub trait KeyHasher: std::fmt::Debug + Send + Sync {
    /// Returns the partition for `key` in a topic with `partition_count`
    /// partitions. `partition_count` is always at least one.
    fn partition_for(&self, key: &[u8], partition_count: u32) -> PartitionId;
}

/// Default placement: stable byte hash modulo partition count.
#[derive(Debug, Clone, Copy, Default)]
pub struct StableKeyHasher;

impl KeyHasher for StableKeyHasher {
    fn partition_for(&self, key: &[u8], partition_count: u32) -> PartitionId {
        debug_assert!(partition_count > 0);

        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        // Safe cast: the modulus is bounded by a u32.
        #[allow(clippy::cast_possible_truncation)]
        PartitionId::new((hasher.finish() % u64::from(partition_count)) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_key_same_partition() {
        let hasher = StableKeyHasher;
        let first = hasher.partition_for(b"user-123", 8);
        let second = hasher.partition_for(b"user-123", 8);
        assert_eq!(first, second);
    }

    #[test]
    fn test_partition_in_range() {
        let hasher = StableKeyHasher;
        for key in [&b"a"[..], b"b", b"c", b"d", b"e", b"f", b"g"] {
            let partition = hasher.partition_for(key, 3);
            assert!(partition.get() < 3);
        }
    }

    #[test]
    fn test_single_partition_topic() {
        let hasher = StableKeyHasher;
        assert_eq!(hasher.partition_for(b"anything", 1), PartitionId::new(0));
    }
}
