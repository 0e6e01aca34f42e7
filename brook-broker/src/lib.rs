//! Brook Broker - an in-process, Kafka-shaped message broker.
//!
//! Brook lets tests and small single-process applications exercise a
//! broker abstraction without an external dependency while preserving the
//! two guarantees that make such tests meaningful: per-partition ordering
//! and at-most-one delivery per partition within a consumer group.
//!
//! # Model
//!
//! - A [`Broker`] is a scoped registry of named [`Topic`]s. Tests create
//!   one per suite and close it on teardown; there is no process-global
//!   instance.
//! - A topic owns a fixed number of ordered, append-only partition logs.
//! - A [`Producer`] appends messages, placing them by key hash, by
//!   round-robin when keyless, or to an explicit partition.
//! - A [`Consumer`] is one member of a named consumer group. The group
//!   divides the topic's partitions among its live members and tracks one
//!   committed cursor per partition; membership changes trigger a
//!   rebalance that hands partitions off at exactly the committed cursor.
//!
//! # Example
//!
//! ```ignore
//! use brook_broker::Broker;
//! use brook_core::Message;
//! use tokio_util::sync::CancellationToken;
//!
//! let broker = Broker::new();
//! let ctx = CancellationToken::new();
//!
//! let topic = broker.topic(&ctx, "orders", 4)?;
//! let producer = topic.producer()?;
//! producer.produce(&ctx, Message::with_key("user-1", "created"))?;
//!
//! let consumer = broker.consumer("orders", "billing")?;
//! let msg = consumer.consume(&ctx).await?;
//! assert_eq!(msg.value, "created");
//!
//! broker.close();
//! ```
//!
//! # Shutdown
//!
//! Close cascades: closing the broker closes every topic; closing a topic
//! closes its producers, then its consumers (each delivery channel closes
//! exactly once), then releases partition memory. `close` is idempotent
//! everywhere and every operation on a closed handle fails with the
//! matching `*Closed` error kind.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod assignor;
mod broker;
mod consumer;
mod group;
mod log;
mod partitioner;
mod producer;
mod topic;

pub use assignor::{PartitionAssignor, RangeAssignor};
pub use broker::{Broker, BrokerConfig};
pub use consumer::Consumer;
pub use group::{ConsumerGroup, GroupSnapshot};
pub use partitioner::{KeyHasher, StableKeyHasher};
pub use producer::{ProduceResult, Producer};
pub use topic::Topic;
