//! The broker: a scoped registry of topics.
//!
//! The broker is an ordinary value, not a process singleton. Tests
//! instantiate one per suite and close it on teardown; close cascades
//! through every topic and from there to every producer and consumer.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use brook_core::{Error, Limits, Result};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::assignor::{PartitionAssignor, RangeAssignor};
use crate::consumer::Consumer;
use crate::partitioner::{KeyHasher, StableKeyHasher};
use crate::producer::Producer;
use crate::topic::Topic;

/// Configuration for a broker.
#[derive(Clone)]
pub struct BrokerConfig {
    /// Resource bounds applied to every topic.
    pub limits: Limits,
    /// Key-to-partition placement for keyed messages.
    pub hasher: Arc<dyn KeyHasher>,
    /// Member-to-partition assignment for consumer groups.
    pub assignor: Arc<dyn PartitionAssignor>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            limits: Limits::new(),
            hasher: Arc::new(StableKeyHasher),
            assignor: Arc::new(RangeAssignor),
        }
    }
}

impl fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("limits", &self.limits)
            .field("hasher", &self.hasher)
            .field("assignor", &self.assignor)
            .finish()
    }
}

/// Top-level registry of topics.
#[derive(Debug)]
pub struct Broker {
    config: BrokerConfig,
    topics: RwLock<HashMap<String, Arc<Topic>>>,
    closed: AtomicBool,
}

impl Broker {
    /// Creates a broker with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::from_config(BrokerConfig::default())
    }

    /// Creates a broker with custom configuration.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if the configured limits are unusable.
    pub fn with_config(config: BrokerConfig) -> Result<Self> {
        config.limits.validate()?;
        Ok(Self::from_config(config))
    }

    fn from_config(config: BrokerConfig) -> Self {
        Self {
            config,
            topics: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns true once the broker has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Creates the named topic, or returns it unchanged if it already
    /// exists.
    ///
    /// The partition count is fixed at creation; on a pre-existing topic
    /// the requested count is ignored (no resizing).
    ///
    /// # Errors
    /// Returns `BrokerClosed` if the broker is closed, `Cancelled` if
    /// `ctx` is already cancelled, and `InvalidPartitionCount` if the
    /// count is zero or above the configured limit.
    pub fn topic(
        &self,
        ctx: &CancellationToken,
        name: &str,
        partition_count: u32,
    ) -> Result<Arc<Topic>> {
        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if self.is_closed() {
            return Err(Error::BrokerClosed);
        }
        if partition_count == 0 || partition_count > self.config.limits.max_partitions_per_topic
        {
            return Err(Error::InvalidPartitionCount {
                count: partition_count,
            });
        }

        let mut topics = self.topics.write();
        let topic = topics.entry(name.to_string()).or_insert_with(|| {
            Arc::new(Topic::new(
                name.to_string(),
                partition_count,
                Arc::clone(&self.config.hasher),
                Arc::clone(&self.config.assignor),
                self.config.limits,
            ))
        });
        Ok(Arc::clone(topic))
    }

    /// Returns the named topic.
    ///
    /// # Errors
    /// Returns `BrokerClosed` if the broker is closed and `UnknownTopic`
    /// if the topic does not exist.
    pub fn get_topic(&self, name: &str) -> Result<Arc<Topic>> {
        if self.is_closed() {
            return Err(Error::BrokerClosed);
        }
        self.topics
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownTopic {
                topic: name.to_string(),
            })
    }

    /// Closes and removes the named topics. Unknown names are skipped.
    ///
    /// # Errors
    /// Returns `BrokerClosed` if the broker is closed and `Cancelled` if
    /// `ctx` is already cancelled.
    pub fn delete_topics(&self, ctx: &CancellationToken, names: &[&str]) -> Result<()> {
        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if self.is_closed() {
            return Err(Error::BrokerClosed);
        }
        let mut topics = self.topics.write();
        for &name in names {
            if let Some(topic) = topics.remove(name) {
                topic.close();
            }
        }
        Ok(())
    }

    /// Registers a producer for the named topic.
    ///
    /// # Errors
    /// Returns `BrokerClosed` if the broker is closed and `UnknownTopic`
    /// if the topic does not exist.
    pub fn producer(&self, topic: &str) -> Result<Arc<Producer>> {
        self.get_topic(topic)?.producer()
    }

    /// Joins the named group on the named topic.
    ///
    /// # Errors
    /// Returns `BrokerClosed` if the broker is closed, `UnknownTopic` if
    /// the topic does not exist, and `GroupFull` if the group is at its
    /// member limit.
    pub fn consumer(&self, topic: &str, group: &str) -> Result<Arc<Consumer>> {
        self.get_topic(topic)?.consumer(group)
    }

    /// Closes the broker and every topic it owns. Idempotent; all later
    /// broker operations fail with `BrokerClosed`.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let topics: Vec<_> = self.topics.write().drain().collect();
        for (_, topic) in topics {
            topic.close();
        }
        info!("broker closed");
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brook_core::{MemberId, PartitionId};
    use std::collections::HashMap as StdHashMap;

    #[test]
    fn test_topic_created_once() {
        let broker = Broker::new();
        let ctx = CancellationToken::new();

        let first = broker.topic(&ctx, "orders", 4).unwrap();
        // Requested count is ignored on a pre-existing topic.
        let second = broker.topic(&ctx, "orders", 8).unwrap();
        assert_eq!(second.partition_count(), 4);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_invalid_limits_rejected_at_construction() {
        let mut limits = Limits::new();
        limits.delivery_channel_capacity = 0;

        let err = Broker::with_config(BrokerConfig {
            limits,
            ..BrokerConfig::default()
        })
        .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidConfig {
                name: "delivery_channel_capacity",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_group_member_cap_enforced() {
        let mut limits = Limits::new();
        limits.max_members_per_group = 2;
        let broker = Broker::with_config(BrokerConfig {
            limits,
            ..BrokerConfig::default()
        })
        .unwrap();
        let ctx = CancellationToken::new();
        broker.topic(&ctx, "orders", 4).unwrap();

        let _first = broker.consumer("orders", "g").unwrap();
        let _second = broker.consumer("orders", "g").unwrap();
        let err = broker.consumer("orders", "g").unwrap_err();
        assert!(matches!(err, Error::GroupFull { max: 2, .. }));
        broker.close();
    }

    #[test]
    fn test_invalid_partition_count() {
        let broker = Broker::new();
        let ctx = CancellationToken::new();

        let err = broker.topic(&ctx, "orders", 0).unwrap_err();
        assert_eq!(err, Error::InvalidPartitionCount { count: 0 });
    }

    #[test]
    fn test_unknown_topic() {
        let broker = Broker::new();

        let err = broker.producer("nope").unwrap_err();
        assert_eq!(
            err,
            Error::UnknownTopic {
                topic: "nope".to_string()
            }
        );
    }

    #[test]
    fn test_delete_topics_skips_unknown_names() {
        let broker = Broker::new();
        let ctx = CancellationToken::new();
        let topic = broker.topic(&ctx, "orders", 2).unwrap();

        broker.delete_topics(&ctx, &["orders", "nope"]).unwrap();
        assert!(topic.is_closed());
        assert!(broker.get_topic("orders").is_err());
    }

    #[test]
    fn test_close_is_idempotent() {
        let broker = Broker::new();
        let ctx = CancellationToken::new();
        broker.topic(&ctx, "orders", 2).unwrap();

        broker.close();
        broker.close();

        assert_eq!(broker.topic(&ctx, "orders", 2).unwrap_err(), Error::BrokerClosed);
        assert_eq!(broker.producer("orders").unwrap_err(), Error::BrokerClosed);
        assert_eq!(
            broker.consumer("orders", "g").unwrap_err(),
            Error::BrokerClosed
        );
        assert_eq!(
            broker.delete_topics(&ctx, &["orders"]).unwrap_err(),
            Error::BrokerClosed
        );
    }

    #[test]
    fn test_cancelled_context_rejected() {
        let broker = Broker::new();
        let ctx = CancellationToken::new();
        ctx.cancel();

        assert_eq!(broker.topic(&ctx, "orders", 2).unwrap_err(), Error::Cancelled);
        assert_eq!(broker.delete_topics(&ctx, &[]).unwrap_err(), Error::Cancelled);
    }

    #[tokio::test]
    async fn test_custom_assignor_is_used() {
        /// Assigns every partition to the first member.
        #[derive(Debug)]
        struct FirstTakesAll;

        impl PartitionAssignor for FirstTakesAll {
            fn assign(
                &self,
                members: &[MemberId],
                partition_count: u32,
            ) -> StdHashMap<MemberId, Vec<PartitionId>> {
                let mut assignment = StdHashMap::new();
                for (index, &member) in members.iter().enumerate() {
                    let partitions = if index == 0 {
                        (0..partition_count).map(PartitionId::new).collect()
                    } else {
                        Vec::new()
                    };
                    assignment.insert(member, partitions);
                }
                assignment
            }
        }

        let broker = Broker::with_config(BrokerConfig {
            assignor: Arc::new(FirstTakesAll),
            ..BrokerConfig::default()
        })
        .unwrap();
        let ctx = CancellationToken::new();
        broker.topic(&ctx, "orders", 4).unwrap();

        let first = broker.consumer("orders", "g").unwrap();
        let second = broker.consumer("orders", "g").unwrap();

        let group = first.group();
        assert_eq!(group.snapshot(first.member_id()).partitions.len(), 4);
        assert!(group.snapshot(second.member_id()).partitions.is_empty());
        broker.close();
    }
}
