//! The in-memory partition log.
//!
//! A partition log is an append-only ordered sequence of messages. One
//! writer at a time stamps offsets under the write lock; readers observe
//! a prefix-consistent snapshot under the read lock. Appends wake any
//! pump parked on the data-available notifier, and the notifier fires
//! only after the new length is visible, so a reader that registers
//! before re-checking the length can never miss a wakeup.

use std::sync::Arc;

use brook_core::{Error, Message, Offset, PartitionId, Result};
use parking_lot::RwLock;
use tokio::sync::Notify;
use tracing::debug;

/// Initial capacity of a partition's message vector.
const DEFAULT_PARTITION_CAPACITY: usize = 64;

#[derive(Debug)]
struct LogInner {
    messages: Vec<Arc<Message>>,
    closed: bool,
}

/// One ordered shard of a topic.
#[derive(Debug)]
pub(crate) struct PartitionLog {
    topic: String,
    partition_id: PartitionId,
    inner: RwLock<LogInner>,
    data_available: Notify,
}

impl PartitionLog {
    /// Creates an empty log for `(topic, partition_id)`.
    pub(crate) fn new(topic: String, partition_id: PartitionId) -> Self {
        Self {
            topic,
            partition_id,
            inner: RwLock::new(LogInner {
                messages: Vec::with_capacity(DEFAULT_PARTITION_CAPACITY),
                closed: false,
            }),
            data_available: Notify::new(),
        }
    }

    /// Appends a message, stamping its offset with the current length.
    ///
    /// The message must already carry its topic and partition id; the
    /// offset is the one broker-assigned field stamped here. Readers
    /// parked on the notifier are woken after the append is visible.
    ///
    /// # Errors
    /// Returns `TopicClosed` if the log has been closed.
    pub(crate) fn append(&self, mut msg: Message) -> Result<Offset> {
        let offset = {
            let mut inner = self.inner.write();
            if inner.closed {
                return Err(Error::TopicClosed {
                    topic: self.topic.clone(),
                });
            }
            let offset = Offset::new(inner.messages.len() as u64);
            msg.offset = offset;
            inner.messages.push(Arc::new(msg));
            offset
        };
        self.data_available.notify_waiters();
        Ok(offset)
    }

    /// Reads up to `max` messages starting at `cursor`.
    ///
    /// A cursor equal to the log length yields an empty batch; a cursor
    /// past the length is an error. Earlier entries are immutable, so the
    /// returned slice is a consistent prefix snapshot even while appends
    /// extend the tail.
    ///
    /// # Errors
    /// Returns `InvalidOffset` if `cursor` is past the end of the log,
    /// `TopicClosed` if the log has been closed.
    pub(crate) fn read_from(&self, cursor: Offset, max: usize) -> Result<Vec<Arc<Message>>> {
        let inner = self.inner.read();
        if inner.closed {
            return Err(Error::TopicClosed {
                topic: self.topic.clone(),
            });
        }
        let len = inner.messages.len();
        let start = usize::try_from(cursor.get()).unwrap_or(usize::MAX);
        if start > len {
            return Err(Error::InvalidOffset {
                offset: cursor,
                len: len as u64,
            });
        }
        let end = len.min(start.saturating_add(max));
        Ok(inner.messages[start..end].to_vec())
    }

    /// Returns the number of messages in the log.
    pub(crate) fn len(&self) -> u64 {
        self.inner.read().messages.len() as u64
    }

    /// Waits until new data may be available.
    ///
    /// Callers must register (enable) the returned future before
    /// re-checking the log length, then await it.
    pub(crate) fn data_available(&self) -> &Notify {
        &self.data_available
    }

    /// Closes the log and releases its memory. Parked readers are woken
    /// and observe `TopicClosed` on their next read.
    pub(crate) fn close(&self) {
        {
            let mut inner = self.inner.write();
            inner.closed = true;
            inner.messages = Vec::new();
        }
        self.data_available.notify_waiters();
        debug!(topic = %self.topic, partition = %self.partition_id, "partition log closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_log() -> PartitionLog {
        PartitionLog::new("orders".to_string(), PartitionId::new(0))
    }

    #[test]
    fn test_append_stamps_monotonic_offsets() {
        let log = make_log();
        for i in 0..5 {
            let offset = log.append(Message::new(format!("m{i}"))).unwrap();
            assert_eq!(offset, Offset::new(i));
        }
        assert_eq!(log.len(), 5);
    }

    #[test]
    fn test_read_window() {
        let log = make_log();
        for i in 0..10 {
            log.append(Message::new(format!("m{i}"))).unwrap();
        }

        let batch = log.read_from(Offset::new(3), 4).unwrap();
        assert_eq!(batch.len(), 4);
        assert_eq!(batch[0].offset, Offset::new(3));
        assert_eq!(batch[3].offset, Offset::new(6));
    }

    #[test]
    fn test_read_at_end_is_empty() {
        let log = make_log();
        log.append(Message::new("m")).unwrap();

        let batch = log.read_from(Offset::new(1), 8).unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn test_read_past_end_fails() {
        let log = make_log();
        log.append(Message::new("m")).unwrap();

        let err = log.read_from(Offset::new(2), 8).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidOffset {
                offset: Offset::new(2),
                len: 1
            }
        );
    }

    #[test]
    fn test_read_does_not_over_read() {
        let log = make_log();
        for i in 0..4 {
            log.append(Message::new(format!("m{i}"))).unwrap();
        }

        // Window is [cursor, cursor + max), not one past it.
        let batch = log.read_from(Offset::new(0), 2).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1].offset, Offset::new(1));
    }

    #[test]
    fn test_closed_log_rejects_operations() {
        let log = make_log();
        log.append(Message::new("m")).unwrap();
        log.close();

        assert!(log.append(Message::new("m")).is_err());
        assert!(log.read_from(Offset::new(0), 1).is_err());
    }

    #[tokio::test]
    async fn test_append_wakes_parked_reader() {
        let log = Arc::new(make_log());

        let reader = {
            let log = Arc::clone(&log);
            tokio::spawn(async move {
                loop {
                    let notified = log.data_available().notified();
                    tokio::pin!(notified);
                    notified.as_mut().enable();
                    if log.len() > 0 {
                        return log.read_from(Offset::new(0), 1).unwrap();
                    }
                    notified.await;
                }
            })
        };

        tokio::task::yield_now().await;
        log.append(Message::new("wake")).unwrap();

        let batch = tokio::time::timeout(std::time::Duration::from_secs(1), reader)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(batch[0].value, bytes::Bytes::from("wake"));
    }
}
