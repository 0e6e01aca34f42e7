//! Topics: named, partitioned, append-only log namespaces.
//!
//! A topic owns its fixed partition vector, the lifetimes of its
//! producers and consumers (held as weak handles so the caller's drop is
//! still authoritative), and its consumer groups. Close cascades in
//! order: producers, then consumers and their delivery channels, then
//! partition memory.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use brook_core::{Error, Limits, Message, PartitionId, Result};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::assignor::PartitionAssignor;
use crate::consumer::{run_supervisor, Consumer};
use crate::group::ConsumerGroup;
use crate::log::PartitionLog;
use crate::partitioner::KeyHasher;
use crate::producer::{ProduceResult, Producer};

/// A named, partitioned, append-only log namespace.
#[derive(Debug)]
pub struct Topic {
    name: String,
    partition_count: u32,
    partitions: Vec<Arc<PartitionLog>>,
    hasher: Arc<dyn KeyHasher>,
    assignor: Arc<dyn PartitionAssignor>,
    limits: Limits,
    round_robin: AtomicU64,
    closed: AtomicBool,
    producers: Mutex<Vec<Weak<Producer>>>,
    consumers: Mutex<Vec<Weak<Consumer>>>,
    groups: Mutex<HashMap<String, Arc<ConsumerGroup>>>,
}

impl Topic {
    pub(crate) fn new(
        name: String,
        partition_count: u32,
        hasher: Arc<dyn KeyHasher>,
        assignor: Arc<dyn PartitionAssignor>,
        limits: Limits,
    ) -> Self {
        debug_assert!(partition_count > 0);

        let partitions = (0..partition_count)
            .map(|p| Arc::new(PartitionLog::new(name.clone(), PartitionId::new(p))))
            .collect();
        info!(topic = %name, partitions = partition_count, "topic created");
        Self {
            name,
            partition_count,
            partitions,
            hasher,
            assignor,
            limits,
            round_robin: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            producers: Mutex::new(Vec::new()),
            consumers: Mutex::new(Vec::new()),
            groups: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the topic name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the fixed number of partitions.
    #[must_use]
    pub const fn partition_count(&self) -> u32 {
        self.partition_count
    }

    /// Returns true once the topic has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Appends a message, stamping its broker-assigned fields.
    ///
    /// With an explicit partition the index is validated against the
    /// partition range; otherwise keyed messages are hashed and keyless
    /// messages take the next round-robin slot.
    ///
    /// # Errors
    /// Returns `TopicClosed` if the topic is closed and
    /// `InvalidPartition` for an out-of-range explicit partition.
    pub(crate) fn append(
        &self,
        mut msg: Message,
        partition: Option<PartitionId>,
    ) -> Result<ProduceResult> {
        if self.is_closed() {
            return Err(Error::TopicClosed {
                topic: self.name.clone(),
            });
        }

        let partition = match partition {
            Some(p) => {
                if p.get() >= self.partition_count {
                    return Err(Error::InvalidPartition {
                        partition: p,
                        partition_count: self.partition_count,
                    });
                }
                p
            }
            None => self.place(&msg),
        };

        msg.topic = self.name.clone();
        msg.partition_id = partition;
        let offset = self.partitions[partition.get() as usize].append(msg)?;
        Ok(ProduceResult {
            partition_id: partition,
            offset,
        })
    }

    /// Chooses a partition for a message without an explicit placement.
    fn place(&self, msg: &Message) -> PartitionId {
        if msg.has_key() {
            let key = msg.key.as_ref().map_or(&[][..], |key| key.as_ref());
            return self.hasher.partition_for(key, self.partition_count);
        }
        let slot = self.round_robin.fetch_add(1, Ordering::Relaxed);
        // Safe cast: the modulus is bounded by a u32.
        #[allow(clippy::cast_possible_truncation)]
        PartitionId::new((slot % u64::from(self.partition_count)) as u32)
    }

    /// Registers a new producer bound to this topic.
    ///
    /// # Errors
    /// Returns `TopicClosed` if the topic is closed.
    pub fn producer(self: &Arc<Self>) -> Result<Arc<Producer>> {
        if self.is_closed() {
            return Err(Error::TopicClosed {
                topic: self.name.clone(),
            });
        }
        let producer = Arc::new(Producer::new(Arc::clone(self)));
        self.producers.lock().push(Arc::downgrade(&producer));
        Ok(producer)
    }

    /// Joins the named consumer group and returns the new member's
    /// handle, starting its delivery pump.
    ///
    /// The group is created on first use. Joining triggers a rebalance;
    /// cursors are untouched, so partitions hand off at exactly their
    /// committed cursors. The delivery pump is spawned on the ambient
    /// Tokio runtime, so this must be called from within one.
    ///
    /// # Errors
    /// Returns `TopicClosed` if the topic is closed and `GroupFull` if
    /// the group is at its member limit.
    pub fn consumer(self: &Arc<Self>, group_name: &str) -> Result<Arc<Consumer>> {
        self.consumer_inner(group_name, None)
    }

    /// Joins the named consumer group under a caller-chosen member id.
    ///
    /// Rejoining an id that is already a member bumps the generation
    /// without growing the member list.
    ///
    /// # Errors
    /// Returns `TopicClosed` if the topic is closed and `GroupFull` if
    /// the group is at its member limit.
    pub fn consumer_with_id(
        self: &Arc<Self>,
        group_name: &str,
        member: brook_core::MemberId,
    ) -> Result<Arc<Consumer>> {
        self.consumer_inner(group_name, Some(member))
    }

    fn consumer_inner(
        self: &Arc<Self>,
        group_name: &str,
        member: Option<brook_core::MemberId>,
    ) -> Result<Arc<Consumer>> {
        if self.is_closed() {
            return Err(Error::TopicClosed {
                topic: self.name.clone(),
            });
        }

        let group = {
            let mut groups = self.groups.lock();
            Arc::clone(groups.entry(group_name.to_string()).or_insert_with(|| {
                Arc::new(ConsumerGroup::new(
                    self.name.clone(),
                    group_name.to_string(),
                    self.partitions.clone(),
                    Arc::clone(&self.assignor),
                    self.limits.max_members_per_group,
                ))
            }))
        };

        let member = group.join(member)?;
        let cancel = CancellationToken::new();
        let (sender, receiver) =
            mpsc::channel(self.limits.delivery_channel_capacity as usize);
        tokio::spawn(run_supervisor(
            Arc::clone(&group),
            member,
            sender,
            cancel.clone(),
            self.limits.max_read_batch as usize,
        ));

        let consumer = Arc::new(Consumer::new(member, group, cancel, receiver));
        self.consumers.lock().push(Arc::downgrade(&consumer));
        Ok(consumer)
    }

    /// Closes the topic.
    ///
    /// Idempotent. Closes all producers, then all consumers (revoking
    /// every group member and closing each delivery channel), then
    /// releases partition memory.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let producers: Vec<_> = self.producers.lock().drain(..).collect();
        for producer in producers.iter().filter_map(Weak::upgrade) {
            producer.close();
        }

        let consumers: Vec<_> = self.consumers.lock().drain(..).collect();
        for consumer in consumers.iter().filter_map(Weak::upgrade) {
            consumer.close();
        }

        self.groups.lock().clear();
        for partition in &self.partitions {
            partition.close();
        }
        info!(topic = %self.name, "topic closed");
    }

    /// Returns the named group, if any consumer has created it.
    #[must_use]
    pub fn group(&self, group_name: &str) -> Option<Arc<ConsumerGroup>> {
        self.groups.lock().get(group_name).cloned()
    }
}
