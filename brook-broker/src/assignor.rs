//! Member-to-partition assignment.
//!
//! The assignor is a pure function from the group's ordered member list
//! and the topic's partition count to the member → partitions mapping.
//! Identical inputs always yield identical outputs; tie-breaks follow
//! the order of the member list supplied by the group.

use std::collections::HashMap;

use brook_core::{MemberId, PartitionId};

/// Divides the partitions of a topic among the members of a group.
pub trait PartitionAssignor: std::fmt::Debug + Send + Sync {
    /// Returns the partition set for each member.
    ///
    /// An empty member list yields an empty map. Every partition in
    /// `[0, partition_count)` appears in exactly one member's set.
    fn assign(
        &self,
        members: &[MemberId],
        partition_count: u32,
    ) -> HashMap<MemberId, Vec<PartitionId>>;
}

/// Default assignment: contiguous ranges.
///
/// Partitions are laid out as `[0, partition_count)` and split into one
/// contiguous range per member, earlier members receiving the larger
/// share when the division is uneven. With more members than partitions
/// the trailing members receive empty sets.
#[derive(Debug, Clone, Copy, Default)]
pub struct RangeAssignor;

impl PartitionAssignor for RangeAssignor {
    fn assign(
        &self,
        members: &[MemberId],
        partition_count: u32,
    ) -> HashMap<MemberId, Vec<PartitionId>> {
        let mut assignment = HashMap::with_capacity(members.len());
        if members.is_empty() {
            return assignment;
        }

        // Safe cast: member counts are small.
        #[allow(clippy::cast_possible_truncation)]
        let member_count = members.len() as u32;
        let per_member = partition_count / member_count;
        let remainder = partition_count % member_count;

        let mut next = 0u32;
        for (index, &member) in members.iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            let index = index as u32;
            let share = per_member + u32::from(index < remainder);
            let range = (next..next + share).map(PartitionId::new).collect();
            assignment.insert(member, range);
            next += share;
        }

        debug_assert!(next == partition_count);
        assignment
    }
}
