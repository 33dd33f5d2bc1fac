use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{EntityRef, SourceError, StatSource};
use crate::stats::StatDataset;

#[derive(Debug, Clone)]
struct Entry {
    display_name: String,
    dataset: StatDataset,
}

/// Stat source backed by a map, for tests and embedders that already hold
/// the datasets in memory.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStatSource {
    entries: Arc<RwLock<BTreeMap<String, Entry>>>,
    online: Arc<RwLock<HashSet<String>>>,
    live: Arc<RwLock<HashMap<String, StatDataset>>>,
}

impl InMemoryStatSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, entity: EntityRef, dataset: StatDataset) {
        self.entries.write().await.insert(
            entity.id,
            Entry {
                display_name: entity.display_name,
                dataset,
            },
        );
    }

    pub async fn set_online(&self, entity_id: &str, online: bool) {
        let mut connected = self.online.write().await;
        if online {
            connected.insert(entity_id.to_string());
        } else {
            connected.remove(entity_id);
        }
    }

    /// In-memory stats that have not been persisted yet.
    pub async fn update_live(&self, entity_id: &str, dataset: StatDataset) {
        self.live
            .write()
            .await
            .insert(entity_id.to_string(), dataset);
    }

    pub async fn remove(&self, entity_id: &str) {
        self.entries.write().await.remove(entity_id);
        self.online.write().await.remove(entity_id);
        self.live.write().await.remove(entity_id);
    }
}

#[async_trait]
impl StatSource for InMemoryStatSource {
    async fn online_entities(&self) -> Result<Vec<EntityRef>, SourceError> {
        let online = self.online.read().await;
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .filter(|(id, _)| online.contains(*id))
            .map(|(id, entry)| EntityRef::new(id, &entry.display_name))
            .collect())
    }

    async fn known_entities(&self) -> Result<Vec<EntityRef>, SourceError> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .map(|(id, entry)| EntityRef::new(id, &entry.display_name))
            .collect())
    }

    async fn live_dataset(&self, entity_id: &str) -> Result<Option<StatDataset>, SourceError> {
        if let Some(dataset) = self.live.read().await.get(entity_id) {
            return Ok(Some(dataset.clone()));
        }
        self.stored_dataset(entity_id).await
    }

    async fn stored_dataset(&self, entity_id: &str) -> Result<Option<StatDataset>, SourceError> {
        Ok(self
            .entries
            .read()
            .await
            .get(entity_id)
            .map(|entry| entry.dataset.clone()))
    }
}
