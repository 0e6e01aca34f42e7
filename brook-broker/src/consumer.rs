//! The consumer handle and its delivery pump.
//!
//! Each consumer runs a supervisor task that watches the group's
//! generation and keeps one pump task alive per owned partition. A pump
//! acquires exclusive pump ownership of its partition (waiting for the
//! previous owner to release it), reads batches from the log, sends
//! message by message on the delivery channel, and commits the cursor
//! after every delivered message. When a partition is revoked the pump
//! finishes the batch it has already fetched, then releases ownership;
//! the next owner resumes from the committed cursor with nothing lost
//! and nothing redelivered.
//!
//! Pumps park on a composite wait when their partition is drained: new
//! data, a generation change, or close. No lock is held across the
//! channel send.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use brook_core::{Error, Generation, MemberId, Message, Result};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::group::ConsumerGroup;

/// One member of a consumer group.
///
/// Obtained from [`Topic::consumer`](crate::Topic::consumer) or
/// [`Broker::consumer`](crate::Broker::consumer). Dropping the handle
/// closes it.
#[derive(Debug)]
pub struct Consumer {
    member_id: MemberId,
    group: Arc<ConsumerGroup>,
    cancel: CancellationToken,
    closed: AtomicBool,
    receiver: tokio::sync::Mutex<Option<mpsc::Receiver<Arc<Message>>>>,
}

impl Consumer {
    pub(crate) fn new(
        member_id: MemberId,
        group: Arc<ConsumerGroup>,
        cancel: CancellationToken,
        receiver: mpsc::Receiver<Arc<Message>>,
    ) -> Self {
        Self {
            member_id,
            group,
            cancel,
            closed: AtomicBool::new(false),
            receiver: tokio::sync::Mutex::new(Some(receiver)),
        }
    }

    /// Returns this member's group-scoped id.
    #[must_use]
    pub fn member_id(&self) -> MemberId {
        self.member_id
    }

    /// Returns the consumer group this member belongs to.
    #[must_use]
    pub fn group(&self) -> &Arc<ConsumerGroup> {
        &self.group
    }

    /// Returns true once the consumer has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Returns the next message for this consumer.
    ///
    /// Messages from a single partition arrive in strictly increasing
    /// offset order; interleaving across partitions is unspecified.
    /// Blocks until a message is available, `ctx` is cancelled, or the
    /// consumer is closed.
    ///
    /// # Errors
    /// Returns `ConsumerClosed` once closed, `Cancelled` if `ctx` fires,
    /// and `AlreadyStreaming` if the streaming channel has been handed
    /// out via [`consume_chan`](Self::consume_chan).
    pub async fn consume(&self, ctx: &CancellationToken) -> Result<Arc<Message>> {
        if self.is_closed() {
            return Err(Error::ConsumerClosed);
        }
        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let mut guard = self.receiver.lock().await;
        let receiver = guard.as_mut().ok_or(Error::AlreadyStreaming)?;
        tokio::select! {
            msg = receiver.recv() => msg.ok_or(Error::ConsumerClosed),
            () = ctx.cancelled() => Err(Error::Cancelled),
            () = self.cancel.cancelled() => Err(Error::ConsumerClosed),
        }
    }

    /// Returns the streaming delivery channel.
    ///
    /// The channel yields messages in per-partition order and is closed
    /// exactly once, when the consumer (or its topic or broker) is
    /// closed. The channel can be handed out only once.
    ///
    /// # Errors
    /// Returns `ConsumerClosed` once closed, `Cancelled` if `ctx` is
    /// already cancelled, and `AlreadyStreaming` on a second call.
    pub async fn consume_chan(
        &self,
        ctx: &CancellationToken,
    ) -> Result<mpsc::Receiver<Arc<Message>>> {
        if self.is_closed() {
            return Err(Error::ConsumerClosed);
        }
        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.receiver.lock().await.take().ok_or(Error::AlreadyStreaming)
    }

    /// Closes the consumer.
    ///
    /// Idempotent and safe to call from any task. Stops the delivery
    /// pumps (closing the delivery channel exactly once), and leaves the
    /// group so its partitions are rebalanced to the remaining members.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();
        self.group.leave(self.member_id);
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        self.close();
    }
}

/// Keeps one pump per owned partition until the consumer is closed.
///
/// Spawned by the topic when the consumer is created. Holds the only
/// long-lived clone of the delivery sender; when the supervisor and its
/// pumps exit, the channel closes.
pub(crate) async fn run_supervisor(
    group: Arc<ConsumerGroup>,
    member: MemberId,
    sender: mpsc::Sender<Arc<Message>>,
    cancel: CancellationToken,
    max_read_batch: usize,
) {
    let mut generations = group.subscribe();
    let mut pumps: HashMap<brook_core::PartitionId, JoinHandle<()>> = HashMap::new();

    loop {
        pumps.retain(|_, pump| !pump.is_finished());
        let snapshot = group.snapshot(member);
        for partition in snapshot.partitions {
            if pumps.contains_key(&partition) {
                continue;
            }
            let Ok(log) = group.log(partition) else {
                continue;
            };
            let pump = tokio::spawn(run_pump(
                Arc::clone(&group),
                member,
                partition,
                log,
                sender.clone(),
                cancel.clone(),
                group.subscribe(),
                max_read_batch,
            ));
            pumps.insert(partition, pump);
        }

        tokio::select! {
            () = cancel.cancelled() => break,
            changed = generations.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    for (_, pump) in pumps {
        let _ = pump.await;
    }
    debug!(member = %member, "delivery supervisor stopped");
}

/// Streams one partition to the delivery channel.
#[allow(clippy::too_many_arguments)]
async fn run_pump(
    group: Arc<ConsumerGroup>,
    member: MemberId,
    partition: brook_core::PartitionId,
    log: Arc<crate::log::PartitionLog>,
    sender: mpsc::Sender<Arc<Message>>,
    cancel: CancellationToken,
    mut generations: watch::Receiver<Generation>,
    max_read_batch: usize,
) {
    if !group.acquire(member, partition, &cancel, &mut generations).await {
        return;
    }
    debug!(member = %member, partition = %partition, "pump started");

    let Ok(mut cursor) = group.committed(partition) else {
        group.release(member, partition);
        return;
    };

    'pump: loop {
        if cancel.is_cancelled() || !group.owns(member, partition) {
            break;
        }

        let batch = match log.read_from(cursor, max_read_batch) {
            Ok(batch) => batch,
            // Log closed under us: the topic is shutting down.
            Err(_) => break,
        };

        if batch.is_empty() {
            let notified = log.data_available().notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if log.len() > cursor.get() {
                continue;
            }
            tokio::select! {
                () = &mut notified => {}
                _ = generations.changed() => {}
                () = cancel.cancelled() => break 'pump,
            }
            continue;
        }

        // Deliver the fetched batch even if the partition is revoked
        // mid-batch; the commit after each send keeps the handoff exact
        // because the next owner cannot acquire until we release.
        for msg in batch {
            tokio::select! {
                sent = sender.send(msg) => {
                    if sent.is_err() {
                        break 'pump;
                    }
                }
                () = cancel.cancelled() => break 'pump,
            }
            cursor = cursor.next();
            if !group.commit_delivered(member, partition, cursor) {
                break 'pump;
            }
        }
    }

    group.release(member, partition);
    debug!(member = %member, partition = %partition, "pump stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignor::RangeAssignor;
    use crate::log::PartitionLog;
    use brook_core::PartitionId;
    use std::time::Duration;
    use tokio::time::timeout;

    fn make_consumer() -> (Arc<ConsumerGroup>, Consumer) {
        let logs = vec![Arc::new(PartitionLog::new(
            "orders".to_string(),
            PartitionId::new(0),
        ))];
        let group = Arc::new(ConsumerGroup::new(
            "orders".to_string(),
            "billing".to_string(),
            logs,
            Arc::new(RangeAssignor),
            64,
        ));
        let member = group.join(None).unwrap();
        let cancel = CancellationToken::new();
        let (sender, receiver) = mpsc::channel(8);
        tokio::spawn(run_supervisor(
            Arc::clone(&group),
            member,
            sender,
            cancel.clone(),
            16,
        ));
        let consumer = Consumer::new(member, Arc::clone(&group), cancel, receiver);
        (group, consumer)
    }

    #[tokio::test]
    async fn test_consume_delivers_appended_message() {
        let (group, consumer) = make_consumer();
        let ctx = CancellationToken::new();

        let mut msg = Message::with_key("k", "v");
        msg.topic = "orders".to_string();
        group.log(PartitionId::new(0)).unwrap().append(msg).unwrap();

        let delivered = timeout(Duration::from_secs(1), consumer.consume(&ctx))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivered.value, bytes::Bytes::from("v"));
    }

    #[tokio::test]
    async fn test_consume_chan_taken_once() {
        let (_group, consumer) = make_consumer();
        let ctx = CancellationToken::new();

        let _chan = consumer.consume_chan(&ctx).await.unwrap();
        let err = consumer.consume_chan(&ctx).await.unwrap_err();
        assert_eq!(err, Error::AlreadyStreaming);

        let err = consumer.consume(&ctx).await.unwrap_err();
        assert_eq!(err, Error::AlreadyStreaming);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_leaves_group() {
        let (group, consumer) = make_consumer();
        assert_eq!(group.member_count(), 1);

        consumer.close();
        consumer.close();
        assert!(consumer.is_closed());
        assert_eq!(group.member_count(), 0);

        let ctx = CancellationToken::new();
        let err = consumer.consume(&ctx).await.unwrap_err();
        assert_eq!(err, Error::ConsumerClosed);
        let err = consumer.consume_chan(&ctx).await.unwrap_err();
        assert_eq!(err, Error::ConsumerClosed);
    }

    #[tokio::test]
    async fn test_close_wakes_blocked_consume() {
        let (group, consumer) = make_consumer();
        let consumer = Arc::new(consumer);
        let ctx = CancellationToken::new();

        let blocked = {
            let consumer = Arc::clone(&consumer);
            tokio::spawn(async move { consumer.consume(&ctx).await })
        };
        tokio::task::yield_now().await;
        consumer.close();

        let result = timeout(Duration::from_secs(1), blocked).await.unwrap().unwrap();
        assert_eq!(result.unwrap_err(), Error::ConsumerClosed);
        drop(group);
    }

    #[tokio::test]
    async fn test_cancelled_context_rejected() {
        let (_group, consumer) = make_consumer();
        let ctx = CancellationToken::new();
        ctx.cancel();

        let err = consumer.consume(&ctx).await.unwrap_err();
        assert_eq!(err, Error::Cancelled);
        let err = consumer.consume_chan(&ctx).await.unwrap_err();
        assert_eq!(err, Error::Cancelled);
    }

    #[tokio::test]
    async fn test_channel_closes_on_close() {
        let (_group, consumer) = make_consumer();
        let ctx = CancellationToken::new();

        let mut chan = consumer.consume_chan(&ctx).await.unwrap();
        consumer.close();

        let end = timeout(Duration::from_secs(1), chan.recv()).await.unwrap();
        assert!(end.is_none());
    }
}
