//! Consumer Group Manager
//!
//! Tracks group membership, member liveness, partition assignments, and
//! committed offsets.
//!
//! ## Liveness
//!
//! A member is *active* while `active` is set and its last heartbeat is
//! younger than the session timeout. `heartbeat` and `join_group` refresh
//! both; the cleanup sweep drops members whose session expired and
//! rebalances the groups it touched.
//!
//! ## Rebalance
//!
//! A group needs rebalancing when it is non-empty and any of these hold:
//! a member went inactive, a member has no assignment entry yet, or the
//! member-id set changed since the last rebalance. Join and leave rebalance
//! inline before returning, so a member always observes assignments that
//! include itself.
//!
//! The assignment itself is a pure function of (active members sorted by id,
//! subscribed topics sorted, topic → partition count): partitions are dealt
//! round-robin across members, the dealing index carrying over from topic to
//! topic. Partition counts come from a [`PartitionLookup`]; a topic the
//! lookup cannot resolve is skipped with a warning rather than guessed.
//!
//! ## Offset durability
//!
//! Committed offsets live in the per-group map and nowhere else. A
//! coordinator restart forgets them, and `get_committed_offset` for a
//! never-committed partition answers 0 (consume-from-start).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use streamlog_observability::metrics;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Partitions of one topic assigned to one member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionAssignment {
    pub topic: String,
    pub partitions: Vec<i32>,
}

/// One member of a consumer group
#[derive(Debug, Clone)]
pub struct GroupMember {
    pub member_id: String,
    pub subscribed_topics: Vec<String>,
    pub last_heartbeat: Instant,
    pub active: bool,
}

/// A consumer group's full state (snapshot via `get_group`)
#[derive(Debug, Clone)]
pub struct ConsumerGroup {
    pub group_id: String,
    pub members: Vec<GroupMember>,
    pub assignments: HashMap<String, Vec<PartitionAssignment>>,
    pub committed_offsets: HashMap<String, HashMap<i32, i64>>,
    pub last_rebalance: Option<Instant>,
    members_at_last_rebalance: BTreeSet<String>,
}

impl ConsumerGroup {
    fn new(group_id: &str) -> Self {
        Self {
            group_id: group_id.to_string(),
            members: Vec::new(),
            assignments: HashMap::new(),
            committed_offsets: HashMap::new(),
            last_rebalance: None,
            members_at_last_rebalance: BTreeSet::new(),
        }
    }
}

/// Source of topic → partition-count facts for assignment
#[async_trait]
pub trait PartitionLookup: Send + Sync {
    /// `None` when the topic is unknown; such topics are skipped.
    async fn partition_count(&self, topic: &str) -> Option<i32>;
}

/// Fixed topic → partition-count map (tests, static deployments)
pub struct StaticPartitions {
    counts: HashMap<String, i32>,
}

impl StaticPartitions {
    pub fn new(counts: HashMap<String, i32>) -> Self {
        Self { counts }
    }
}

#[async_trait]
impl PartitionLookup for StaticPartitions {
    async fn partition_count(&self, topic: &str) -> Option<i32> {
        self.counts.get(topic).copied()
    }
}

/// All groups, guarded by one mutex
pub struct GroupManager {
    session_timeout: Duration,
    lookup: Arc<dyn PartitionLookup>,
    groups: Mutex<HashMap<String, ConsumerGroup>>,
}

impl GroupManager {
    pub fn new(session_timeout: Duration, lookup: Arc<dyn PartitionLookup>) -> Self {
        Self {
            session_timeout,
            lookup,
            groups: Mutex::new(HashMap::new()),
        }
    }

    /// Join (or re-join) a group, refreshing liveness and subscriptions.
    /// Rebalances inline when the membership change requires it.
    pub async fn join_group(
        &self,
        group_id: &str,
        member_id: &str,
        topics: Vec<String>,
    ) -> Result<()> {
        let mut groups = self.groups.lock().await;
        let group = groups
            .entry(group_id.to_string())
            .or_insert_with(|| ConsumerGroup::new(group_id));

        match group.members.iter_mut().find(|m| m.member_id == member_id) {
            Some(member) => {
                member.subscribed_topics = topics;
                member.last_heartbeat = Instant::now();
                member.active = true;
            }
            None => {
                debug!(group_id, member_id, "member joining");
                group.members.push(GroupMember {
                    member_id: member_id.to_string(),
                    subscribed_topics: topics,
                    last_heartbeat: Instant::now(),
                    active: true,
                });
            }
        }

        if self.needs_rebalancing_locked(group) {
            self.rebalance_locked(group).await;
        }
        Ok(())
    }

    pub async fn leave_group(&self, group_id: &str, member_id: &str) -> Result<()> {
        let mut groups = self.groups.lock().await;
        let group = groups
            .get_mut(group_id)
            .ok_or_else(|| Error::GroupNotFound(group_id.to_string()))?;

        group.members.retain(|m| m.member_id != member_id);
        group.assignments.remove(member_id);
        info!(group_id, member_id, "member left");

        if self.needs_rebalancing_locked(group) {
            self.rebalance_locked(group).await;
        }
        Ok(())
    }

    pub async fn heartbeat(&self, group_id: &str, member_id: &str) -> Result<()> {
        let mut groups = self.groups.lock().await;
        let group = groups
            .get_mut(group_id)
            .ok_or_else(|| Error::GroupNotFound(group_id.to_string()))?;
        let member = group
            .members
            .iter_mut()
            .find(|m| m.member_id == member_id)
            .ok_or_else(|| Error::MemberNotFound(member_id.to_string()))?;

        member.last_heartbeat = Instant::now();
        member.active = true;
        Ok(())
    }

    /// A member with no assignment entry yet gets an empty list, not an
    /// error: the next rebalance will fill it in.
    pub async fn get_assignments(
        &self,
        group_id: &str,
        member_id: &str,
    ) -> Result<Vec<PartitionAssignment>> {
        let groups = self.groups.lock().await;
        let group = groups
            .get(group_id)
            .ok_or_else(|| Error::GroupNotFound(group_id.to_string()))?;
        Ok(group.assignments.get(member_id).cloned().unwrap_or_default())
    }

    pub async fn commit_offset(
        &self,
        group_id: &str,
        topic: &str,
        partition: i32,
        offset: i64,
    ) -> Result<()> {
        let mut groups = self.groups.lock().await;
        let group = groups
            .get_mut(group_id)
            .ok_or_else(|| Error::GroupNotFound(group_id.to_string()))?;
        group
            .committed_offsets
            .entry(topic.to_string())
            .or_default()
            .insert(partition, offset);
        Ok(())
    }

    /// 0 for a never-committed (topic, partition): consume from the start.
    pub async fn get_committed_offset(
        &self,
        group_id: &str,
        topic: &str,
        partition: i32,
    ) -> Result<i64> {
        let groups = self.groups.lock().await;
        let group = groups
            .get(group_id)
            .ok_or_else(|| Error::GroupNotFound(group_id.to_string()))?;
        Ok(group
            .committed_offsets
            .get(topic)
            .and_then(|partitions| partitions.get(&partition))
            .copied()
            .unwrap_or(0))
    }

    pub async fn needs_rebalancing(&self, group_id: &str) -> bool {
        let groups = self.groups.lock().await;
        groups
            .get(group_id)
            .map(|group| self.needs_rebalancing_locked(group))
            .unwrap_or(false)
    }

    pub async fn rebalance_group(&self, group_id: &str) -> Result<()> {
        let mut groups = self.groups.lock().await;
        let group = groups
            .get_mut(group_id)
            .ok_or_else(|| Error::GroupNotFound(group_id.to_string()))?;
        self.rebalance_locked(group).await;
        Ok(())
    }

    /// Drop members whose session expired; rebalance every group that
    /// changed or was already due. Invoked by the coordinator's timer.
    pub async fn cleanup_inactive_members(&self) {
        let mut groups = self.groups.lock().await;
        for group in groups.values_mut() {
            let before = group.members.len();
            if self.needs_rebalancing_locked(group) {
                self.rebalance_locked(group).await;
                let dropped = before - group.members.len();
                if dropped > 0 {
                    info!(
                        group_id = %group.group_id,
                        dropped,
                        remaining = group.members.len(),
                        "expired members removed"
                    );
                }
            }
        }
    }

    pub async fn list_groups(&self) -> Vec<String> {
        let groups = self.groups.lock().await;
        let mut ids: Vec<String> = groups.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn get_group(&self, group_id: &str) -> Result<ConsumerGroup> {
        let groups = self.groups.lock().await;
        groups
            .get(group_id)
            .cloned()
            .ok_or_else(|| Error::GroupNotFound(group_id.to_string()))
    }

    fn is_member_active(&self, member: &GroupMember) -> bool {
        member.active && member.last_heartbeat.elapsed() < self.session_timeout
    }

    fn needs_rebalancing_locked(&self, group: &ConsumerGroup) -> bool {
        if group.members.is_empty() {
            return false;
        }
        if group.members.iter().any(|m| !self.is_member_active(m)) {
            return true;
        }
        if group
            .members
            .iter()
            .any(|m| !group.assignments.contains_key(&m.member_id))
        {
            return true;
        }
        let current: BTreeSet<String> =
            group.members.iter().map(|m| m.member_id.clone()).collect();
        current != group.members_at_last_rebalance
    }

    /// Drop inactive members and recompute all assignments. The new
    /// assignment replaces the old one atomically under the group lock.
    async fn rebalance_locked(&self, group: &mut ConsumerGroup) {
        let session_timeout = self.session_timeout;
        group
            .members
            .retain(|m| m.active && m.last_heartbeat.elapsed() < session_timeout);

        metrics::ACTIVE_MEMBERS
            .with_label_values(&[&group.group_id])
            .set(group.members.len() as i64);

        if group.members.is_empty() {
            group.assignments.clear();
            group.members_at_last_rebalance.clear();
            group.last_rebalance = Some(Instant::now());
            return;
        }

        // Deterministic inputs: members sorted by id, topics sorted
        let mut member_ids: Vec<String> =
            group.members.iter().map(|m| m.member_id.clone()).collect();
        member_ids.sort();

        let topics: BTreeSet<String> = group
            .members
            .iter()
            .flat_map(|m| m.subscribed_topics.iter().cloned())
            .collect();

        // member → topic → partitions, dealt round-robin with the index
        // carrying over across topics
        let mut dealt: HashMap<String, BTreeMap<String, Vec<i32>>> = member_ids
            .iter()
            .map(|id| (id.clone(), BTreeMap::new()))
            .collect();
        let mut member_index = 0usize;
        for topic in &topics {
            let Some(partition_count) = self.lookup.partition_count(topic).await else {
                warn!(
                    group_id = %group.group_id,
                    topic,
                    "partition count unknown, skipping topic in assignment"
                );
                continue;
            };
            for partition in 0..partition_count {
                let member = &member_ids[member_index % member_ids.len()];
                dealt
                    .get_mut(member)
                    .expect("member seeded above")
                    .entry(topic.clone())
                    .or_default()
                    .push(partition);
                member_index += 1;
            }
        }

        group.assignments = dealt
            .into_iter()
            .map(|(member, by_topic)| {
                let list = by_topic
                    .into_iter()
                    .map(|(topic, partitions)| PartitionAssignment { topic, partitions })
                    .collect();
                (member, list)
            })
            .collect();
        group.members_at_last_rebalance = member_ids.into_iter().collect();
        group.last_rebalance = Some(Instant::now());

        metrics::REBALANCES_TOTAL
            .with_label_values(&[&group.group_id])
            .inc();
        info!(
            group_id = %group.group_id,
            members = group.members.len(),
            "group rebalanced"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SESSION: Duration = Duration::from_secs(30);

    fn lookup(pairs: &[(&str, i32)]) -> Arc<dyn PartitionLookup> {
        Arc::new(StaticPartitions::new(
            pairs
                .iter()
                .map(|(t, n)| (t.to_string(), *n))
                .collect(),
        ))
    }

    fn manager(session: Duration, pairs: &[(&str, i32)]) -> GroupManager {
        GroupManager::new(session, lookup(pairs))
    }

    fn assigned_partitions(assignments: &[PartitionAssignment], topic: &str) -> Vec<i32> {
        assignments
            .iter()
            .filter(|a| a.topic == topic)
            .flat_map(|a| a.partitions.iter().copied())
            .collect()
    }

    #[tokio::test]
    async fn test_join_creates_group_and_assigns() {
        let manager = manager(SESSION, &[("t1", 6)]);
        manager
            .join_group("g1", "m1", vec!["t1".to_string()])
            .await
            .unwrap();

        let assignments = manager.get_assignments("g1", "m1").await.unwrap();
        assert_eq!(assigned_partitions(&assignments, "t1"), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(manager.list_groups().await, vec!["g1"]);
    }

    #[tokio::test]
    async fn test_two_members_split_six_partitions() {
        let manager = manager(SESSION, &[("t1", 6)]);
        manager
            .join_group("g1", "m1", vec!["t1".to_string()])
            .await
            .unwrap();
        manager
            .join_group("g1", "m2", vec!["t1".to_string()])
            .await
            .unwrap();

        let m1 = manager.get_assignments("g1", "m1").await.unwrap();
        let m2 = manager.get_assignments("g1", "m2").await.unwrap();

        // Round-robin over members sorted by id: m1 gets even, m2 odd
        assert_eq!(assigned_partitions(&m1, "t1"), vec![0, 2, 4]);
        assert_eq!(assigned_partitions(&m2, "t1"), vec![1, 3, 5]);
    }

    #[tokio::test]
    async fn test_assignment_is_deterministic() {
        // Same membership, same topic facts: identical assignment every
        // time, regardless of join order
        for _ in 0..5 {
            let manager = manager(SESSION, &[("t1", 5), ("t2", 3)]);
            manager
                .join_group("g1", "m2", vec!["t1".to_string(), "t2".to_string()])
                .await
                .unwrap();
            manager
                .join_group("g1", "m1", vec!["t1".to_string(), "t2".to_string()])
                .await
                .unwrap();

            let m1 = manager.get_assignments("g1", "m1").await.unwrap();
            let m2 = manager.get_assignments("g1", "m2").await.unwrap();
            // Topics dealt in sorted order, index carrying over:
            // t1: 0→m1 1→m2 2→m1 3→m2 4→m1; t2 continues: 0→m2 1→m1 2→m2
            assert_eq!(assigned_partitions(&m1, "t1"), vec![0, 2, 4]);
            assert_eq!(assigned_partitions(&m2, "t1"), vec![1, 3]);
            assert_eq!(assigned_partitions(&m1, "t2"), vec![1]);
            assert_eq!(assigned_partitions(&m2, "t2"), vec![0, 2]);
        }
    }

    #[tokio::test]
    async fn test_every_partition_assigned_exactly_once() {
        let manager = manager(SESSION, &[("t1", 7)]);
        for member in ["a", "b", "c"] {
            manager
                .join_group("g1", member, vec!["t1".to_string()])
                .await
                .unwrap();
        }

        let mut all: Vec<i32> = Vec::new();
        for member in ["a", "b", "c"] {
            let assignments = manager.get_assignments("g1", member).await.unwrap();
            all.extend(assigned_partitions(&assignments, "t1"));
        }
        all.sort_unstable();
        assert_eq!(all, vec![0, 1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn test_unknown_topic_skipped() {
        let manager = manager(SESSION, &[("known", 2)]);
        manager
            .join_group("g1", "m1", vec!["known".to_string(), "ghost".to_string()])
            .await
            .unwrap();

        let assignments = manager.get_assignments("g1", "m1").await.unwrap();
        assert_eq!(assigned_partitions(&assignments, "known"), vec![0, 1]);
        assert!(assigned_partitions(&assignments, "ghost").is_empty());
    }

    #[tokio::test]
    async fn test_leave_group_rebalances_survivors() {
        let manager = manager(SESSION, &[("t1", 6)]);
        manager
            .join_group("g1", "m1", vec!["t1".to_string()])
            .await
            .unwrap();
        manager
            .join_group("g1", "m2", vec!["t1".to_string()])
            .await
            .unwrap();

        manager.leave_group("g1", "m2").await.unwrap();

        let m1 = manager.get_assignments("g1", "m1").await.unwrap();
        assert_eq!(assigned_partitions(&m1, "t1"), vec![0, 1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_leave_unknown_group_fails() {
        let manager = manager(SESSION, &[]);
        assert!(matches!(
            manager.leave_group("ghost", "m1").await,
            Err(Error::GroupNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_heartbeat_unknown_member_fails() {
        let manager = manager(SESSION, &[("t1", 1)]);
        manager
            .join_group("g1", "m1", vec!["t1".to_string()])
            .await
            .unwrap();
        assert!(matches!(
            manager.heartbeat("g1", "ghost").await,
            Err(Error::MemberNotFound(_))
        ));
        assert!(manager.heartbeat("g1", "m1").await.is_ok());
    }

    #[tokio::test]
    async fn test_expired_member_evicted_and_partitions_move() {
        // m2 stops heartbeating past the session timeout; cleanup hands its
        // partitions to m1
        let manager = manager(Duration::from_millis(30), &[("t1", 6)]);
        manager
            .join_group("g1", "m1", vec!["t1".to_string()])
            .await
            .unwrap();
        manager
            .join_group("g1", "m2", vec!["t1".to_string()])
            .await
            .unwrap();
        assert_eq!(
            assigned_partitions(&manager.get_assignments("g1", "m1").await.unwrap(), "t1"),
            vec![0, 2, 4]
        );

        // Keep m1 alive while m2 goes silent
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(15)).await;
            manager.heartbeat("g1", "m1").await.unwrap();
        }

        assert!(manager.needs_rebalancing("g1").await);
        manager.cleanup_inactive_members().await;

        let group = manager.get_group("g1").await.unwrap();
        assert_eq!(group.members.len(), 1);
        assert_eq!(group.members[0].member_id, "m1");
        assert_eq!(
            assigned_partitions(&manager.get_assignments("g1", "m1").await.unwrap(), "t1"),
            vec![0, 1, 2, 3, 4, 5]
        );
    }

    #[tokio::test]
    async fn test_no_rebalance_needed_for_stable_group() {
        let manager = manager(SESSION, &[("t1", 2)]);
        manager
            .join_group("g1", "m1", vec!["t1".to_string()])
            .await
            .unwrap();
        assert!(!manager.needs_rebalancing("g1").await);

        // A second join changes membership: due again until rebalanced
        manager
            .join_group("g1", "m2", vec!["t1".to_string()])
            .await
            .unwrap();
        assert!(!manager.needs_rebalancing("g1").await);
    }

    #[tokio::test]
    async fn test_commit_and_read_offset() {
        let manager = manager(SESSION, &[("t1", 6)]);
        manager
            .join_group("g1", "m1", vec!["t1".to_string()])
            .await
            .unwrap();

        manager.commit_offset("g1", "t1", 0, 100).await.unwrap();
        assert_eq!(manager.get_committed_offset("g1", "t1", 0).await.unwrap(), 100);

        // Overwrite
        manager.commit_offset("g1", "t1", 0, 150).await.unwrap();
        assert_eq!(manager.get_committed_offset("g1", "t1", 0).await.unwrap(), 150);
    }

    #[tokio::test]
    async fn test_never_committed_offset_is_zero() {
        let manager = manager(SESSION, &[("t1", 6)]);
        manager
            .join_group("g1", "m1", vec!["t1".to_string()])
            .await
            .unwrap();
        assert_eq!(manager.get_committed_offset("g1", "t1", 3).await.unwrap(), 0);
        assert_eq!(
            manager.get_committed_offset("g1", "other", 0).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_committed_offset_unknown_group_fails() {
        let manager = manager(SESSION, &[]);
        assert!(matches!(
            manager.get_committed_offset("ghost", "t1", 0).await,
            Err(Error::GroupNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_restart_forgets_offsets() {
        // Offsets are in-memory only: a new manager (simulated restart)
        // answers 0 for a previously committed partition
        let manager_a = manager(SESSION, &[("t1", 6)]);
        manager_a
            .join_group("g1", "m1", vec!["t1".to_string()])
            .await
            .unwrap();
        manager_a.commit_offset("g1", "t1", 0, 100).await.unwrap();
        assert_eq!(
            manager_a.get_committed_offset("g1", "t1", 0).await.unwrap(),
            100
        );

        let manager_b = manager(SESSION, &[("t1", 6)]);
        manager_b
            .join_group("g1", "m1", vec!["t1".to_string()])
            .await
            .unwrap();
        assert_eq!(
            manager_b.get_committed_offset("g1", "t1", 0).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_empty_group_after_all_leave() {
        let manager = manager(SESSION, &[("t1", 2)]);
        manager
            .join_group("g1", "m1", vec!["t1".to_string()])
            .await
            .unwrap();
        manager.leave_group("g1", "m1").await.unwrap();

        let group = manager.get_group("g1").await.unwrap();
        assert!(group.members.is_empty());
        assert!(group.assignments.is_empty());
    }
}
