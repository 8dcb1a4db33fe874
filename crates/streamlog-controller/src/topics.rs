//! Topic Metadata Table
//!
//! In-memory map of topic name → partition count and replication settings.
//! Metadata is not persisted; topics are recreated by operators (or the
//! admin CLI) after a controller restart, while the broker's log directory
//! keeps the data itself.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::info;

use crate::error::{Error, Result};

/// Metadata for one topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicInfo {
    pub name: String,
    pub partitions: i32,
    pub replication_factor: i32,
    pub created_at_ms: i64,
}

/// All known topics behind one mutex
#[derive(Default)]
pub struct TopicManager {
    topics: Mutex<HashMap<String, TopicInfo>>,
}

impl TopicManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_topic(
        &self,
        name: &str,
        partitions: i32,
        replication_factor: i32,
    ) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidArgument("topic name cannot be empty".to_string()));
        }
        if partitions <= 0 {
            return Err(Error::InvalidArgument(
                "partitions must be positive".to_string(),
            ));
        }
        if replication_factor <= 0 {
            return Err(Error::InvalidArgument(
                "replication factor must be positive".to_string(),
            ));
        }

        let mut topics = self.topics.lock().await;
        if topics.contains_key(name) {
            return Err(Error::TopicAlreadyExists(name.to_string()));
        }
        topics.insert(
            name.to_string(),
            TopicInfo {
                name: name.to_string(),
                partitions,
                replication_factor,
                created_at_ms: chrono::Utc::now().timestamp_millis(),
            },
        );
        info!(topic = name, partitions, replication_factor, "topic created");
        Ok(())
    }

    pub async fn get_topic(&self, name: &str) -> Result<TopicInfo> {
        let topics = self.topics.lock().await;
        topics
            .get(name)
            .cloned()
            .ok_or_else(|| Error::TopicNotFound(name.to_string()))
    }

    pub async fn topic_exists(&self, name: &str) -> bool {
        self.topics.lock().await.contains_key(name)
    }

    pub async fn list_topics(&self) -> Vec<String> {
        let topics = self.topics.lock().await;
        let mut names: Vec<String> = topics.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn delete_topic(&self, name: &str) -> Result<()> {
        let mut topics = self.topics.lock().await;
        topics
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::TopicNotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_get() {
        let manager = TopicManager::new();
        manager.create_topic("orders", 3, 1).await.unwrap();

        let topic = manager.get_topic("orders").await.unwrap();
        assert_eq!(topic.name, "orders");
        assert_eq!(topic.partitions, 3);
        assert_eq!(topic.replication_factor, 1);
        assert!(topic.created_at_ms > 0);
        assert!(manager.topic_exists("orders").await);
    }

    #[tokio::test]
    async fn test_duplicate_create_fails() {
        let manager = TopicManager::new();
        manager.create_topic("orders", 3, 1).await.unwrap();
        assert!(matches!(
            manager.create_topic("orders", 5, 1).await,
            Err(Error::TopicAlreadyExists(_))
        ));
        // Original metadata untouched
        assert_eq!(manager.get_topic("orders").await.unwrap().partitions, 3);
    }

    #[tokio::test]
    async fn test_validation() {
        let manager = TopicManager::new();
        assert!(matches!(
            manager.create_topic("", 3, 1).await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            manager.create_topic("t", 0, 1).await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            manager.create_topic("t", 3, 0).await,
            Err(Error::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_get_unknown_topic_fails() {
        let manager = TopicManager::new();
        assert!(matches!(
            manager.get_topic("ghost").await,
            Err(Error::TopicNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_topics_sorted() {
        let manager = TopicManager::new();
        manager.create_topic("zebra", 1, 1).await.unwrap();
        manager.create_topic("alpha", 1, 1).await.unwrap();
        manager.create_topic("mango", 1, 1).await.unwrap();
        assert_eq!(manager.list_topics().await, vec!["alpha", "mango", "zebra"]);
    }

    #[tokio::test]
    async fn test_delete_topic() {
        let manager = TopicManager::new();
        manager.create_topic("orders", 3, 1).await.unwrap();
        manager.delete_topic("orders").await.unwrap();
        assert!(!manager.topic_exists("orders").await);
        assert!(matches!(
            manager.delete_topic("orders").await,
            Err(Error::TopicNotFound(_))
        ));
    }
}
