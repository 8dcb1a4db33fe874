//! Bounded Idempotency Table
//!
//! Tracks, per `(producer_id, topic, partition)`, the last accepted sequence
//! number and the offset its batch landed at. When a producer retries a
//! request whose effect is already durable (the RPC timed out after the
//! append completed), the broker answers with the previously recorded offset
//! instead of appending again.
//!
//! ## Sequence contract
//!
//! - The first sequence a producer submits for a key must be `0`.
//! - Every later sequence must be strictly greater than the stored one.
//! - A sequence at or below the stored one is a replay: the broker responds
//!   `IDEMPOTENT_REPLAY` with the prior offset, and nothing is appended.
//!
//! ## Bounds
//!
//! The table is capped at `max_entries` with least-recently-used eviction,
//! and entries untouched for `ttl` are dropped at the start of every
//! mutating operation. An evicted producer starts over at sequence 0.
//!
//! All operations serialize on a single mutex; each does only in-memory map
//! work, so the table is not a throughput bottleneck.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use tokio::sync::Mutex;

/// Identity of one producer's stream into one partition
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProducerKey {
    pub producer_id: String,
    pub topic: String,
    pub partition: i32,
}

impl ProducerKey {
    pub fn new(producer_id: &str, topic: &str, partition: i32) -> Self {
        Self {
            producer_id: producer_id.to_string(),
            topic: topic.to_string(),
            partition,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ProducerState {
    last_sequence: i64,
    last_offset: i64,
    updated_at: Instant,
}

/// LRU + TTL bounded sequence tracker
pub struct BoundedIdempotencyTable {
    ttl: Duration,
    table: Mutex<LruCache<ProducerKey, ProducerState>>,
}

impl BoundedIdempotencyTable {
    /// # Panics
    ///
    /// Panics if `max_entries` is 0.
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(max_entries).expect("idempotency capacity must be > 0");
        Self {
            ttl,
            table: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Would this sequence be accepted? Unknown keys require sequence 0;
    /// known keys require strict increase. Runs expiry first so a stale
    /// entry cannot reject a legitimately restarting producer.
    pub async fn is_valid_sequence(&self, key: &ProducerKey, sequence: i64) -> bool {
        let mut table = self.table.lock().await;
        Self::expire_locked(&mut table, self.ttl);
        match table.peek(key) {
            None => sequence == 0,
            Some(state) => sequence > state.last_sequence,
        }
    }

    /// Record an accepted (sequence, offset) pair, inserting or refreshing
    /// the entry. Capacity overflow evicts the least recently used key.
    pub async fn update_sequence(&self, key: &ProducerKey, sequence: i64, offset: i64) {
        let mut table = self.table.lock().await;
        Self::expire_locked(&mut table, self.ttl);
        table.put(
            key.clone(),
            ProducerState {
                last_sequence: sequence,
                last_offset: offset,
                updated_at: Instant::now(),
            },
        );
    }

    pub async fn get_last_sequence(&self, key: &ProducerKey) -> Option<i64> {
        self.table.lock().await.peek(key).map(|s| s.last_sequence)
    }

    pub async fn get_last_offset(&self, key: &ProducerKey) -> Option<i64> {
        self.table.lock().await.peek(key).map(|s| s.last_offset)
    }

    /// Drop every entry belonging to a producer, across all topics and
    /// partitions. The producer's next append must use sequence 0.
    pub async fn remove_producer(&self, producer_id: &str) {
        let mut table = self.table.lock().await;
        let keys: Vec<ProducerKey> = table
            .iter()
            .filter(|(k, _)| k.producer_id == producer_id)
            .map(|(k, _)| k.clone())
            .collect();
        for key in keys {
            table.pop(&key);
        }
    }

    /// Drop expired entries; returns how many were removed.
    pub async fn cleanup_expired(&self) -> usize {
        let mut table = self.table.lock().await;
        Self::expire_locked(&mut table, self.ttl)
    }

    pub async fn size(&self) -> usize {
        self.table.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.table.lock().await.is_empty()
    }

    pub async fn clear(&self) {
        self.table.lock().await.clear();
    }

    fn expire_locked(table: &mut LruCache<ProducerKey, ProducerState>, ttl: Duration) -> usize {
        let expired: Vec<ProducerKey> = table
            .iter()
            .filter(|(_, state)| state.updated_at.elapsed() > ttl)
            .map(|(k, _)| k.clone())
            .collect();
        let count = expired.len();
        for key in expired {
            table.pop(&key);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG_TTL: Duration = Duration::from_secs(3600);

    fn key(producer: &str) -> ProducerKey {
        ProducerKey::new(producer, "orders", 0)
    }

    #[tokio::test]
    async fn test_first_sequence_must_be_zero() {
        let table = BoundedIdempotencyTable::new(100, LONG_TTL);
        assert!(table.is_valid_sequence(&key("p1"), 0).await);
        assert!(!table.is_valid_sequence(&key("p1"), 1).await);
        assert!(!table.is_valid_sequence(&key("p1"), 42).await);
    }

    #[tokio::test]
    async fn test_sequences_must_strictly_increase() {
        let table = BoundedIdempotencyTable::new(100, LONG_TTL);
        table.update_sequence(&key("p1"), 0, 100).await;

        assert!(!table.is_valid_sequence(&key("p1"), 0).await);
        assert!(table.is_valid_sequence(&key("p1"), 1).await);
        // Gaps are allowed, the contract is only strict increase
        assert!(table.is_valid_sequence(&key("p1"), 10).await);

        table.update_sequence(&key("p1"), 5, 200).await;
        assert!(!table.is_valid_sequence(&key("p1"), 5).await);
        assert!(!table.is_valid_sequence(&key("p1"), 3).await);
        assert!(table.is_valid_sequence(&key("p1"), 6).await);
    }

    #[tokio::test]
    async fn test_last_sequence_and_offset() {
        let table = BoundedIdempotencyTable::new(100, LONG_TTL);
        assert_eq!(table.get_last_sequence(&key("p1")).await, None);
        assert_eq!(table.get_last_offset(&key("p1")).await, None);

        table.update_sequence(&key("p1"), 3, 250).await;
        assert_eq!(table.get_last_sequence(&key("p1")).await, Some(3));
        assert_eq!(table.get_last_offset(&key("p1")).await, Some(250));
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let table = BoundedIdempotencyTable::new(100, LONG_TTL);
        table.update_sequence(&key("p1"), 7, 70).await;

        // Different producer, topic, or partition: fresh sequence space
        assert!(table.is_valid_sequence(&key("p2"), 0).await);
        assert!(
            table
                .is_valid_sequence(&ProducerKey::new("p1", "events", 0), 0)
                .await
        );
        assert!(
            table
                .is_valid_sequence(&ProducerKey::new("p1", "orders", 1), 0)
                .await
        );
    }

    #[tokio::test]
    async fn test_capacity_bound_with_lru_eviction() {
        let table = BoundedIdempotencyTable::new(2, LONG_TTL);
        table.update_sequence(&key("p1"), 0, 0).await;
        table.update_sequence(&key("p2"), 0, 1).await;
        table.update_sequence(&key("p3"), 0, 2).await;

        // Size never exceeds the cap
        assert_eq!(table.size().await, 2);

        // p1 was least recently used and is gone; it starts over at 0
        assert_eq!(table.get_last_sequence(&key("p1")).await, None);
        assert!(table.is_valid_sequence(&key("p1"), 0).await);

        // p2 and p3 survive
        assert_eq!(table.get_last_sequence(&key("p2")).await, Some(0));
        assert_eq!(table.get_last_sequence(&key("p3")).await, Some(0));
    }

    #[tokio::test]
    async fn test_ttl_expiry_on_mutating_ops() {
        let table = BoundedIdempotencyTable::new(100, Duration::from_millis(20));
        table.update_sequence(&key("p1"), 4, 40).await;
        assert_eq!(table.size().await, 1);

        tokio::time::sleep(Duration::from_millis(40)).await;

        // The mutating operation expires the stale entry first, so the
        // restarted producer's sequence 0 is valid again
        assert!(table.is_valid_sequence(&key("p1"), 0).await);
        assert_eq!(table.size().await, 0);
    }

    #[tokio::test]
    async fn test_cleanup_expired_counts() {
        let table = BoundedIdempotencyTable::new(100, Duration::from_millis(20));
        table.update_sequence(&key("p1"), 0, 0).await;
        table.update_sequence(&key("p2"), 0, 0).await;

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(table.cleanup_expired().await, 2);
        assert!(table.is_empty().await);
    }

    #[tokio::test]
    async fn test_remove_producer_spans_topics_and_partitions() {
        let table = BoundedIdempotencyTable::new(100, LONG_TTL);
        table
            .update_sequence(&ProducerKey::new("p1", "orders", 0), 1, 10)
            .await;
        table
            .update_sequence(&ProducerKey::new("p1", "orders", 1), 2, 20)
            .await;
        table
            .update_sequence(&ProducerKey::new("p1", "events", 0), 3, 30)
            .await;
        table
            .update_sequence(&ProducerKey::new("p2", "orders", 0), 4, 40)
            .await;

        table.remove_producer("p1").await;
        assert_eq!(table.size().await, 1);
        assert_eq!(
            table
                .get_last_sequence(&ProducerKey::new("p2", "orders", 0))
                .await,
            Some(4)
        );
        assert!(
            table
                .is_valid_sequence(&ProducerKey::new("p1", "orders", 0), 0)
                .await
        );
    }

    #[tokio::test]
    async fn test_clear() {
        let table = BoundedIdempotencyTable::new(100, LONG_TTL);
        table.update_sequence(&key("p1"), 0, 0).await;
        table.update_sequence(&key("p2"), 0, 0).await;
        table.clear().await;
        assert!(table.is_empty().await);
    }

    #[tokio::test]
    async fn test_validation_does_not_refresh_lru_order() {
        let table = BoundedIdempotencyTable::new(2, LONG_TTL);
        table.update_sequence(&key("p1"), 0, 0).await;
        table.update_sequence(&key("p2"), 0, 0).await;

        // Peeking p1 must not promote it; inserting p3 still evicts p1
        assert!(!table.is_valid_sequence(&key("p1"), 0).await);
        table.update_sequence(&key("p3"), 0, 0).await;
        assert_eq!(table.get_last_sequence(&key("p1")).await, None);
        assert_eq!(table.get_last_sequence(&key("p2")).await, Some(0));
    }
}
