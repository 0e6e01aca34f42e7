//! Brook Core - Strongly-typed identifiers and shared types for Brook.
//!
//! Brook is an in-process message broker with a Kafka-shaped surface:
//! named topics split into a fixed number of ordered partitions, producers
//! with keyed or explicit placement, and consumer groups that divide
//! partitions among their live members.
//!
//! This crate provides the types shared by every part of the broker:
//!
//! - **Strongly-typed IDs**: prevent mixing up a `PartitionId` with a
//!   `MemberId` or a raw index
//! - **`Offset` and `Message`**: the record model of the partition log
//! - **`Error`**: the closed error taxonomy callers pattern-match on
//! - **`Limits`**: explicit bounds on every resource

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod error;
mod limits;
mod record;
mod types;

pub use error::{Error, Result};
pub use limits::Limits;
pub use record::{Message, Offset};
pub use types::{Generation, MemberId, PartitionId};
