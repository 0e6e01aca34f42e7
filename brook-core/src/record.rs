//! The message model of the partition log.
//!
//! A message carries an opaque value, an optional key used for partition
//! placement, and optional string-keyed headers. The broker stamps the
//! `topic`, `partition_id`, and `offset` fields on append; they are
//! immutable from then on and delivered messages are shared read-only.

use std::collections::HashMap;

use bytes::Bytes;

use crate::PartitionId;

/// Zero-based position of a message within its partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Offset(u64);

impl Offset {
    /// Creates an offset from a raw value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw offset value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns the next offset.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl std::fmt::Display for Offset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single message in a topic.
///
/// Clients fill in `key`, `value`, and `headers`; the broker assigns
/// `topic`, `partition_id`, and `offset` when the message is appended.
/// Clients never supply an offset.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    /// Optional key. Messages with the same non-empty key always land in
    /// the same partition of a topic.
    pub key: Option<Bytes>,
    /// The message payload.
    pub value: Bytes,
    /// Optional string-keyed metadata.
    pub headers: HashMap<String, Bytes>,
    /// Topic name, assigned on append.
    pub topic: String,
    /// Partition the message landed in, assigned on append.
    pub partition_id: PartitionId,
    /// Position within the partition, assigned on append.
    pub offset: Offset,
}

impl Message {
    /// Creates a message with just a value.
    #[must_use]
    pub fn new(value: impl Into<Bytes>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }

    /// Creates a message with a key and a value.
    #[must_use]
    pub fn with_key(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            key: Some(key.into()),
            value: value.into(),
            ..Self::default()
        }
    }

    /// Adds a header, returning the message for chaining.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Returns true if the message carries a non-empty key.
    #[must_use]
    pub fn has_key(&self) -> bool {
        self.key.as_ref().is_some_and(|key| !key.is_empty())
    }
}
