//! Resource bounds for the broker.
//!
//! Every buffer and fan-out in the broker has an explicit maximum so a
//! misbehaving test cannot grow the process without bound.

use crate::{Error, Result};

/// Broker-wide limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum number of partitions a topic may be created with.
    pub max_partitions_per_topic: u32,
    /// Maximum number of members in a consumer group.
    pub max_members_per_group: u32,
    /// Capacity of each consumer's delivery channel.
    pub delivery_channel_capacity: u32,
    /// Maximum number of messages a delivery pump reads per batch.
    pub max_read_batch: u32,
}

impl Limits {
    /// Creates limits with safe defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_partitions_per_topic: 1024,
            max_members_per_group: 256,
            delivery_channel_capacity: 256,
            max_read_batch: 64,
        }
    }

    /// Validates that all limits are usable.
    ///
    /// # Errors
    /// Returns `InvalidConfig` naming the first field that is zero.
    pub fn validate(&self) -> Result<()> {
        if self.max_partitions_per_topic == 0 {
            return Err(Error::InvalidConfig {
                name: "max_partitions_per_topic",
                reason: "must be positive",
            });
        }
        if self.max_members_per_group == 0 {
            return Err(Error::InvalidConfig {
                name: "max_members_per_group",
                reason: "must be positive",
            });
        }
        if self.delivery_channel_capacity == 0 {
            return Err(Error::InvalidConfig {
                name: "delivery_channel_capacity",
                reason: "must be positive",
            });
        }
        if self.max_read_batch == 0 {
            return Err(Error::InvalidConfig {
                name: "max_read_batch",
                reason: "must be positive",
            });
        }
        Ok(())
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::new()
    }
}
