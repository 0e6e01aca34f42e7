//! The producer handle.
//!
//! A producer is bound to one topic. It is safe for arbitrary concurrent
//! callers; appends interleave freely at the topic boundary and ordering
//! between producers is unspecified. Two appends from the same caller to
//! the same partition keep their order: the topic never reorders.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use brook_core::{Error, Message, Offset, PartitionId, Result};
use tokio_util::sync::CancellationToken;

use crate::topic::Topic;

/// Where a produced message landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProduceResult {
    /// Partition the message was appended to.
    pub partition_id: PartitionId,
    /// Offset assigned within that partition.
    pub offset: Offset,
}

/// Handle for appending messages to one topic.
///
/// Obtained from [`Topic::producer`] or
/// [`Broker::producer`](crate::Broker::producer).
#[derive(Debug)]
pub struct Producer {
    topic: Arc<Topic>,
    closed: AtomicBool,
}

impl Producer {
    pub(crate) fn new(topic: Arc<Topic>) -> Self {
        Self {
            topic,
            closed: AtomicBool::new(false),
        }
    }

    /// Returns true once the producer has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Appends a message, choosing the partition automatically.
    ///
    /// Messages with a non-empty key are placed by the topic's key
    /// hasher, so equal keys always share a partition; keyless messages
    /// are spread round-robin.
    ///
    /// # Errors
    /// Returns `Cancelled` if `ctx` is already cancelled and
    /// `ProducerClosed` once the producer (or its topic) is closed.
    pub fn produce(&self, ctx: &CancellationToken, msg: Message) -> Result<ProduceResult> {
        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if self.is_closed() {
            return Err(Error::ProducerClosed);
        }
        self.topic.append(msg, None)
    }

    /// Appends a message to an explicit partition.
    ///
    /// # Errors
    /// Returns `InvalidPartition` if the partition is out of range, plus
    /// the same errors as [`produce`](Self::produce).
    pub fn produce_with_partition(
        &self,
        ctx: &CancellationToken,
        msg: Message,
        partition: PartitionId,
    ) -> Result<ProduceResult> {
        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if self.is_closed() {
            return Err(Error::ProducerClosed);
        }
        self.topic.append(msg, Some(partition))
    }

    /// Closes the producer. Idempotent; all later produces fail with
    /// `ProducerClosed`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
