use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

use super::{EntityRef, SourceError, StatSource};
use crate::stats::StatDataset;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Town {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub residents: Vec<String>,
}

/// Town membership as known to the host's town plugin.
#[async_trait]
pub trait TownDirectory: Send + Sync {
    async fn towns(&self) -> Result<Vec<Town>, SourceError>;
}

/// Used when no town plugin is installed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTownDirectory;

#[async_trait]
impl TownDirectory for NoTownDirectory {
    async fn towns(&self) -> Result<Vec<Town>, SourceError> {
        Ok(Vec::new())
    }
}

/// Fixed town list, for hosts that export membership once at startup.
#[derive(Debug, Default, Clone)]
pub struct StaticTownDirectory {
    towns: Vec<Town>,
}

impl StaticTownDirectory {
    pub fn new(towns: Vec<Town>) -> Self {
        Self { towns }
    }
}

#[async_trait]
impl TownDirectory for StaticTownDirectory {
    async fn towns(&self) -> Result<Vec<Town>, SourceError> {
        Ok(self.towns.clone())
    }
}

/// Presents towns as rankable entities. A town's dataset is the merge of its
/// residents' datasets.
pub struct TownStatSource {
    players: Arc<dyn StatSource>,
    directory: Arc<dyn TownDirectory>,
}

impl TownStatSource {
    pub fn new(players: Arc<dyn StatSource>, directory: Arc<dyn TownDirectory>) -> Self {
        Self { players, directory }
    }

    async fn find(&self, town_id: &str) -> Result<Option<Town>, SourceError> {
        Ok(self
            .directory
            .towns()
            .await?
            .into_iter()
            .find(|town| town.id == town_id))
    }

    async fn merged(&self, town_id: &str, live: bool) -> Result<Option<StatDataset>, SourceError> {
        let Some(town) = self.find(town_id).await? else {
            return Ok(None);
        };

        let mut merged: Option<StatDataset> = None;
        for resident in &town.residents {
            let dataset = if live {
                self.players.live_dataset(resident).await
            } else {
                self.players.stored_dataset(resident).await
            };
            match dataset {
                Ok(Some(dataset)) => match merged.as_mut() {
                    Some(total) => total.merge(dataset),
                    None => merged = Some(dataset),
                },
                Ok(None) => {}
                Err(err) => {
                    warn!(town_id, resident = %resident, error = %err, "Skipping resident stats")
                }
            }
        }
        Ok(merged)
    }
}

#[async_trait]
impl StatSource for TownStatSource {
    /// Towns with at least one connected resident.
    async fn online_entities(&self) -> Result<Vec<EntityRef>, SourceError> {
        let online: HashSet<String> = self
            .players
            .online_entities()
            .await?
            .into_iter()
            .map(|player| player.id)
            .collect();

        Ok(self
            .directory
            .towns()
            .await?
            .into_iter()
            .filter(|town| town.residents.iter().any(|id| online.contains(id)))
            .map(|town| EntityRef::new(town.id, town.name))
            .collect())
    }

    async fn known_entities(&self) -> Result<Vec<EntityRef>, SourceError> {
        Ok(self
            .directory
            .towns()
            .await?
            .into_iter()
            .map(|town| EntityRef::new(town.id, town.name))
            .collect())
    }

    async fn live_dataset(&self, entity_id: &str) -> Result<Option<StatDataset>, SourceError> {
        self.merged(entity_id, true).await
    }

    async fn stored_dataset(&self, entity_id: &str) -> Result<Option<StatDataset>, SourceError> {
        self.merged(entity_id, false).await
    }
}
