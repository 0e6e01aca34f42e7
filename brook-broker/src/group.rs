//! Consumer-group coordination.
//!
//! A group owns its membership, the member → partitions assignment, and
//! one committed cursor per partition. Cursors belong to the group, not
//! to any consumer instance: a partition reassigned from one member to
//! another resumes at exactly the committed cursor.
//!
//! A single coordination lock guards membership, cursors, generation,
//! and pump ownership. The lock is never held across an await or a
//! channel send; generation changes are broadcast on a watch channel
//! after the lock is released.
//!
//! Pump ownership is separate from assignment. Assignment says which
//! member *should* pump a partition at the current generation; pump
//! ownership says which member's pump is *still* draining it. A new
//! owner's pump waits for the previous owner to release the partition,
//! which is what makes the cursor handoff exact without stopping
//! delivery to retained partitions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use brook_core::{Error, Generation, MemberId, Offset, PartitionId, Result};
use parking_lot::Mutex;
use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::assignor::PartitionAssignor;
use crate::log::PartitionLog;

/// A member's view of the group as of a single generation.
#[derive(Debug, Clone)]
pub struct GroupSnapshot {
    /// The generation this snapshot was taken at.
    pub generation: Generation,
    /// Partitions currently assigned to the member.
    pub partitions: Vec<PartitionId>,
    /// Committed cursors for those partitions.
    pub cursors: Vec<(PartitionId, Offset)>,
}

#[derive(Debug)]
struct GroupState {
    generation: Generation,
    members: Vec<MemberId>,
    assignment: HashMap<MemberId, Vec<PartitionId>>,
    cursors: Vec<Offset>,
    pump_owner: Vec<Option<MemberId>>,
}

/// A named cohort of consumers sharing one cursor per partition.
#[derive(Debug)]
pub struct ConsumerGroup {
    topic: String,
    name: String,
    logs: Vec<Arc<PartitionLog>>,
    assignor: Arc<dyn PartitionAssignor>,
    max_members: u32,
    state: Mutex<GroupState>,
    generation_tx: watch::Sender<Generation>,
    released: Notify,
    next_member_id: AtomicU64,
}

impl ConsumerGroup {
    pub(crate) fn new(
        topic: String,
        name: String,
        logs: Vec<Arc<PartitionLog>>,
        assignor: Arc<dyn PartitionAssignor>,
        max_members: u32,
    ) -> Self {
        let partition_count = logs.len();
        let (generation_tx, _) = watch::channel(Generation::new(0));
        Self {
            topic,
            name,
            logs,
            assignor,
            max_members,
            state: Mutex::new(GroupState {
                generation: Generation::new(0),
                members: Vec::new(),
                assignment: HashMap::new(),
                cursors: vec![Offset::new(0); partition_count],
                pump_owner: vec![None; partition_count],
            }),
            generation_tx,
            released: Notify::new(),
            next_member_id: AtomicU64::new(0),
        }
    }

    /// Returns the group name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of partitions in the group's topic.
    #[must_use]
    pub fn partition_count(&self) -> u32 {
        // Safe cast: the topic bounds its partition count to a u32.
        #[allow(clippy::cast_possible_truncation)]
        let count = self.logs.len() as u32;
        count
    }

    /// Returns the current membership generation.
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.state.lock().generation
    }

    /// Returns the number of live members.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.state.lock().members.len()
    }

    /// Adds a member and rebalances.
    ///
    /// When `requested` is `None` a fresh group-scoped id is assigned.
    /// Joining with an id that is already a member is a rejoin: the
    /// generation still advances and the assignment is recomputed, but
    /// the member list is unchanged. Cursors are untouched by rebalance.
    ///
    /// # Errors
    /// Returns `GroupFull` if the group is at its member limit.
    pub(crate) fn join(&self, requested: Option<MemberId>) -> Result<MemberId> {
        let member =
            requested.unwrap_or_else(|| MemberId::new(self.next_member_id.fetch_add(1, Ordering::Relaxed)));
        let generation = {
            let mut state = self.state.lock();
            if !state.members.contains(&member) {
                if state.members.len() >= self.max_members as usize {
                    return Err(Error::GroupFull {
                        group: self.name.clone(),
                        max: self.max_members,
                    });
                }
                state.members.push(member);
            }
            self.rebalance_locked(&mut state)
        };
        self.generation_tx.send_replace(generation);
        info!(
            topic = %self.topic,
            group = %self.name,
            member = %member,
            generation = %generation,
            "member joined"
        );
        Ok(member)
    }

    /// Removes a member and rebalances. Unknown ids are a no-op.
    pub(crate) fn leave(&self, member: MemberId) {
        let generation = {
            let mut state = self.state.lock();
            let Some(index) = state.members.iter().position(|&m| m == member) else {
                return;
            };
            state.members.remove(index);
            self.rebalance_locked(&mut state)
        };
        self.generation_tx.send_replace(generation);
        info!(
            topic = %self.topic,
            group = %self.name,
            member = %member,
            generation = %generation,
            "member left"
        );
    }

    fn rebalance_locked(&self, state: &mut GroupState) -> Generation {
        state.generation = state.generation.next();
        state.assignment = self.assignor.assign(&state.members, self.partition_count());
        state.generation
    }

    /// Advances the committed cursor for a partition.
    ///
    /// Commits are monotonic and idempotent: committing the current
    /// cursor again is a no-op.
    ///
    /// # Errors
    /// Returns `InvalidPartition` if the partition is out of range and
    /// `OutOfOrderCommit` if `next_offset` would move the cursor
    /// backwards or past the end of the partition log.
    pub fn commit(&self, partition: PartitionId, next_offset: Offset) -> Result<()> {
        let log = self.log(partition)?;
        let log_len = log.len();
        let mut state = self.state.lock();
        let index = partition.get() as usize;
        let committed = state.cursors[index];
        if next_offset < committed || next_offset.get() > log_len {
            return Err(Error::OutOfOrderCommit {
                partition,
                committed,
                requested: next_offset,
            });
        }
        state.cursors[index] = next_offset;
        Ok(())
    }

    /// Returns the committed cursor for a partition.
    ///
    /// # Errors
    /// Returns `InvalidPartition` if the partition is out of range.
    pub fn committed(&self, partition: PartitionId) -> Result<Offset> {
        self.log(partition)?;
        Ok(self.state.lock().cursors[partition.get() as usize])
    }

    /// Returns a member's partition set and the cursors for those
    /// partitions as of a single generation.
    #[must_use]
    pub fn snapshot(&self, member: MemberId) -> GroupSnapshot {
        let state = self.state.lock();
        let partitions = state.assignment.get(&member).cloned().unwrap_or_default();
        let cursors = partitions
            .iter()
            .map(|&p| (p, state.cursors[p.get() as usize]))
            .collect();
        GroupSnapshot {
            generation: state.generation,
            partitions,
            cursors,
        }
    }

    /// Subscribes to generation changes.
    pub(crate) fn subscribe(&self) -> watch::Receiver<Generation> {
        self.generation_tx.subscribe()
    }

    /// Returns true if the partition is assigned to the member at the
    /// current generation.
    pub(crate) fn owns(&self, member: MemberId, partition: PartitionId) -> bool {
        let state = self.state.lock();
        state
            .assignment
            .get(&member)
            .is_some_and(|partitions| partitions.contains(&partition))
    }

    /// Commits from a delivery pump, fenced by pump ownership.
    ///
    /// Returns false if the member's pump no longer owns the partition;
    /// a stale pump must stop without moving the cursor under the new
    /// owner.
    pub(crate) fn commit_delivered(
        &self,
        member: MemberId,
        partition: PartitionId,
        next_offset: Offset,
    ) -> bool {
        let mut state = self.state.lock();
        let index = partition.get() as usize;
        if state.pump_owner[index] != Some(member) {
            return false;
        }
        if next_offset > state.cursors[index] {
            state.cursors[index] = next_offset;
        }
        true
    }

    /// Takes exclusive pump ownership of a partition for a member.
    ///
    /// Waits until the previous owner's pump has released the partition,
    /// so the committed cursor observed afterwards includes everything
    /// the previous owner delivered. Returns false if the assignment was
    /// revoked while waiting or the consumer was cancelled.
    pub(crate) async fn acquire(
        &self,
        member: MemberId,
        partition: PartitionId,
        cancel: &CancellationToken,
        generations: &mut watch::Receiver<Generation>,
    ) -> bool {
        let index = partition.get() as usize;
        loop {
            let released = self.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();
            {
                let mut state = self.state.lock();
                let assigned = state
                    .assignment
                    .get(&member)
                    .is_some_and(|partitions| partitions.contains(&partition));
                if !assigned {
                    return false;
                }
                match state.pump_owner[index] {
                    None => {
                        state.pump_owner[index] = Some(member);
                        return true;
                    }
                    Some(owner) if owner == member => return true,
                    Some(_) => {}
                }
            }
            tokio::select! {
                () = &mut released => {}
                _ = generations.changed() => {}
                () = cancel.cancelled() => return false,
            }
        }
    }

    /// Releases pump ownership of a partition and wakes waiting pumps.
    pub(crate) fn release(&self, member: MemberId, partition: PartitionId) {
        {
            let mut state = self.state.lock();
            let index = partition.get() as usize;
            if state.pump_owner[index] == Some(member) {
                state.pump_owner[index] = None;
            }
        }
        self.released.notify_waiters();
        debug!(
            topic = %self.topic,
            group = %self.name,
            member = %member,
            partition = %partition,
            "partition released"
        );
    }

    /// Returns the log backing a partition.
    pub(crate) fn log(&self, partition: PartitionId) -> Result<Arc<PartitionLog>> {
        self.logs
            .get(partition.get() as usize)
            .cloned()
            .ok_or_else(|| Error::InvalidPartition {
                partition,
                partition_count: self.partition_count(),
            })
    }
}
