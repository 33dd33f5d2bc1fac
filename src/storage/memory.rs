use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{AwardStore, StoreError};
use crate::awards::EntityAggregate;

/// In-memory award storage for tests and ephemeral servers.
///
/// Individual keys can be marked as failing to exercise per-entity error
/// isolation.
#[derive(Debug, Default, Clone)]
pub struct InMemoryAwardStore {
    records: Arc<RwLock<BTreeMap<String, EntityAggregate>>>,
    failing: Arc<RwLock<HashSet<String>>>,
}

impl InMemoryAwardStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_writes_for(&self, entity_id: &str) {
        self.failing.write().await.insert(entity_id.to_string());
    }

    pub async fn recover_writes_for(&self, entity_id: &str) {
        self.failing.write().await.remove(entity_id);
    }

    pub async fn get(&self, entity_id: &str) -> Option<EntityAggregate> {
        self.records.read().await.get(entity_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl AwardStore for InMemoryAwardStore {
    async fn save(&self, aggregate: &EntityAggregate) -> Result<(), StoreError> {
        if self.failing.read().await.contains(&aggregate.entity_id) {
            return Err(StoreError::io(
                aggregate.entity_id.as_str(),
                std::io::Error::new(std::io::ErrorKind::Other, "simulated write failure"),
            ));
        }
        self.records
            .write()
            .await
            .insert(aggregate.entity_id.clone(), aggregate.clone());
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<EntityAggregate>, StoreError> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn clear(&self, entity_id: &str) -> Result<(), StoreError> {
        self.records.write().await.remove(entity_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_replaces_whole_record() {
        let store = InMemoryAwardStore::new();
        store.save(&EntityAggregate::new("a", "Old")).await.unwrap();
        store.save(&EntityAggregate::new("a", "New")).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.get("a").await.unwrap().display_name, "New");
    }

    #[tokio::test]
    async fn simulated_failure_only_hits_marked_entity() {
        let store = InMemoryAwardStore::new();
        store.fail_writes_for("b").await;

        assert!(store.save(&EntityAggregate::new("a", "A")).await.is_ok());
        assert!(store.save(&EntityAggregate::new("b", "B")).await.is_err());
        assert_eq!(store.load_all().await.unwrap().len(), 1);
    }
}
