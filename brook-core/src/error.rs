//! Broker error types.
//!
//! The taxonomy is a closed set of kinds; callers pattern-match on the
//! variant rather than on message text. Lifecycle violations (`*Closed`)
//! are surfaced immediately and are not retryable.

use thiserror::Error;

use crate::{Offset, PartitionId};

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in broker operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// The broker has been closed.
    #[error("broker is closed")]
    BrokerClosed,

    /// The topic has been closed.
    #[error("topic {topic} is closed")]
    TopicClosed {
        /// The closed topic.
        topic: String,
    },

    /// The producer has been closed.
    #[error("producer is closed")]
    ProducerClosed,

    /// The consumer has been closed.
    #[error("consumer is closed")]
    ConsumerClosed,

    /// The named topic does not exist.
    #[error("unknown topic: {topic}")]
    UnknownTopic {
        /// The topic that was not found.
        topic: String,
    },

    /// The partition index is outside the topic's partition range.
    #[error("partition {partition} out of range (topic has {partition_count} partitions)")]
    InvalidPartition {
        /// The requested partition.
        partition: PartitionId,
        /// Number of partitions in the topic.
        partition_count: u32,
    },

    /// The requested partition count is not acceptable.
    #[error("invalid partition count: {count}")]
    InvalidPartitionCount {
        /// The requested count.
        count: u32,
    },

    /// A read cursor points past the end of the partition log.
    #[error("offset {offset} past end of log (len {len})")]
    InvalidOffset {
        /// The requested offset.
        offset: Offset,
        /// Current length of the partition log.
        len: u64,
    },

    /// A configuration value is unusable.
    #[error("invalid config '{name}': {reason}")]
    InvalidConfig {
        /// The configuration field.
        name: &'static str,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A commit would move a group cursor backwards or past the log end.
    #[error(
        "out-of-order commit on {partition}: requested {requested}, committed {committed}"
    )]
    OutOfOrderCommit {
        /// The partition being committed.
        partition: PartitionId,
        /// The cursor currently committed.
        committed: Offset,
        /// The rejected cursor.
        requested: Offset,
    },

    /// The consumer group is at its member limit.
    #[error("group {group} is full ({max} members)")]
    GroupFull {
        /// The full group.
        group: String,
        /// Maximum members allowed.
        max: u32,
    },

    /// The consumer's streaming channel has already been handed out.
    #[error("consumer is already streaming")]
    AlreadyStreaming,

    /// The caller's cancellation context fired.
    #[error("operation cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidPartition {
            partition: PartitionId::new(7),
            partition_count: 4,
        };
        let msg = err.to_string();
        assert!(msg.contains("partition-7"));
        assert!(msg.contains('4'));
    }

    #[test]
    fn test_error_equality() {
        assert_eq!(Error::BrokerClosed, Error::BrokerClosed);
        assert_ne!(
            Error::BrokerClosed,
            Error::TopicClosed {
                topic: "orders".to_string()
            }
        );
    }

    #[test]
    fn test_out_of_order_commit_display() {
        let err = Error::OutOfOrderCommit {
            partition: PartitionId::new(1),
            committed: Offset::new(5),
            requested: Offset::new(3),
        };
        let msg = err.to_string();
        assert!(msg.contains('5'));
        assert!(msg.contains('3'));
    }
}
