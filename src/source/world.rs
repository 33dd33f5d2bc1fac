use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::{EntityRef, SourceError, StatSource};
use crate::stats::StatDataset;

const STATS_DIR: &str = "stats";

#[derive(Debug, Deserialize)]
struct StatsFile {
    #[serde(default)]
    stats: StatDataset,
}

#[derive(Debug, Deserialize)]
struct UserCacheEntry {
    uuid: String,
    name: String,
}

/// Player stats read from the host's world directories.
///
/// Each world keeps `stats/<uuid>.json`; a player's datasets from every
/// world are merged into one. Connected players and their in-memory stats
/// are pushed in by the host.
#[derive(Debug, Default)]
pub struct WorldStatsSource {
    worlds: Vec<PathBuf>,
    user_cache: Option<PathBuf>,
    online: RwLock<BTreeMap<String, String>>,
    live: RwLock<HashMap<String, StatDataset>>,
}

impl WorldStatsSource {
    pub fn new(worlds: Vec<PathBuf>) -> Self {
        Self {
            worlds,
            ..Self::default()
        }
    }

    pub fn with_user_cache(mut self, path: impl Into<PathBuf>) -> Self {
        self.user_cache = Some(path.into());
        self
    }

    /// Replace the set of connected players.
    pub async fn set_online(&self, players: Vec<EntityRef>) {
        let mut online = self.online.write().await;
        *online = players
            .into_iter()
            .map(|player| (player.id, player.display_name))
            .collect();
    }

    pub async fn player_joined(&self, player: EntityRef) {
        self.online
            .write()
            .await
            .insert(player.id, player.display_name);
    }

    pub async fn player_left(&self, player_id: &str) {
        self.online.write().await.remove(player_id);
        self.live.write().await.remove(player_id);
    }

    /// Record the in-memory stats of a connected player.
    pub async fn update_live(&self, player_id: &str, dataset: StatDataset) {
        self.live
            .write()
            .await
            .insert(player_id.to_string(), dataset);
    }

    async fn read_user_cache(&self) -> HashMap<String, String> {
        let Some(path) = &self.user_cache else {
            return HashMap::new();
        };
        let raw = match fs::read(path).await {
            Ok(raw) => raw,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "No user cache available");
                return HashMap::new();
            }
        };
        match serde_json::from_slice::<Vec<UserCacheEntry>>(&raw) {
            Ok(entries) => entries
                .into_iter()
                .map(|entry| (entry.uuid, entry.name))
                .collect(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Ignoring unreadable user cache");
                HashMap::new()
            }
        }
    }

    async fn player_ids_in(world: &Path) -> Result<Vec<String>, SourceError> {
        let directory = world.join(STATS_DIR);
        let mut entries = match fs::read_dir(&directory).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(SourceError::Io {
                    path: directory,
                    source: err,
                })
            }
        };

        let mut ids = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => {
                    return Err(SourceError::Io {
                        path: directory,
                        source: err,
                    })
                }
            };
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if Uuid::parse_str(stem).is_ok() {
                ids.push(stem.to_string());
            } else {
                debug!(path = %path.display(), "Skipping non-player stats file");
            }
        }
        Ok(ids)
    }

    async fn read_partition(path: &Path) -> Result<Option<StatDataset>, SourceError> {
        let raw = match fs::read(path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(SourceError::Io {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        };
        let file: StatsFile = serde_json::from_slice(&raw).map_err(|err| SourceError::Parse {
            path: path.to_path_buf(),
            source: err,
        })?;
        Ok(Some(file.stats))
    }
}

#[async_trait]
impl StatSource for WorldStatsSource {
    async fn online_entities(&self) -> Result<Vec<EntityRef>, SourceError> {
        Ok(self
            .online
            .read()
            .await
            .iter()
            .map(|(id, name)| EntityRef::new(id, name))
            .collect())
    }

    #[instrument(skip(self))]
    async fn known_entities(&self) -> Result<Vec<EntityRef>, SourceError> {
        let mut ids = BTreeSet::new();
        for world in &self.worlds {
            match Self::player_ids_in(world).await {
                Ok(found) => ids.extend(found),
                Err(err) => warn!(world = %world.display(), error = %err, "Skipping world"),
            }
        }

        let cache = self.read_user_cache().await;
        let online = self.online.read().await;
        Ok(ids
            .into_iter()
            .map(|id| {
                let name = online
                    .get(&id)
                    .or_else(|| cache.get(&id))
                    .cloned()
                    .unwrap_or_else(|| id.clone());
                EntityRef::new(id, name)
            })
            .collect())
    }

    async fn live_dataset(&self, entity_id: &str) -> Result<Option<StatDataset>, SourceError> {
        if let Some(dataset) = self.live.read().await.get(entity_id) {
            return Ok(Some(dataset.clone()));
        }
        self.stored_dataset(entity_id).await
    }

    #[instrument(skip(self))]
    async fn stored_dataset(&self, entity_id: &str) -> Result<Option<StatDataset>, SourceError> {
        if Uuid::parse_str(entity_id).is_err() {
            debug!("Not a player id, no stats files to read");
            return Ok(None);
        }

        let mut merged: Option<StatDataset> = None;
        for world in &self.worlds {
            let path = world.join(STATS_DIR).join(format!("{entity_id}.json"));
            match Self::read_partition(&path).await {
                Ok(Some(partition)) => match merged.as_mut() {
                    Some(dataset) => dataset.merge(partition),
                    None => merged = Some(partition),
                },
                Ok(None) => {}
                Err(err) => warn!(error = %err, "Skipping unreadable stats partition"),
            }
        }
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::StatValue;

    const ALICE: &str = "0f8fad5b-d9cb-469f-a165-70867728950e";
    const BOB: &str = "7c9e6679-7425-40de-944b-e07fc1f90ae7";

    fn write_stats(world: &Path, id: &str, body: &str) {
        let dir = world.join(STATS_DIR);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("{id}.json")), body).unwrap();
    }

    #[tokio::test]
    async fn merges_partitions_across_worlds() {
        let root = tempfile::tempdir().unwrap();
        let overworld = root.path().join("world");
        let nether = root.path().join("world_nether");
        write_stats(
            &overworld,
            ALICE,
            r#"{"stats": {"minecraft:mined": {"minecraft:stone": 10}}, "DataVersion": 3465}"#,
        );
        write_stats(
            &nether,
            ALICE,
            r#"{"stats": {"minecraft:mined": {"minecraft:stone": 4, "minecraft:netherrack": 9}}}"#,
        );

        let source = WorldStatsSource::new(vec![overworld, nether]);
        let dataset = source.stored_dataset(ALICE).await.unwrap().unwrap();

        assert_eq!(
            dataset.get("minecraft:mined", "minecraft:stone"),
            Some(&StatValue::Int(14))
        );
        assert_eq!(
            dataset.get("minecraft:mined", "minecraft:netherrack"),
            Some(&StatValue::Int(9))
        );
    }

    #[tokio::test]
    async fn corrupt_partition_is_skipped() {
        let root = tempfile::tempdir().unwrap();
        let good = root.path().join("world");
        let bad = root.path().join("world_the_end");
        write_stats(&good, ALICE, r#"{"stats": {"custom": {"jump": 3}}}"#);
        write_stats(&bad, ALICE, "{{{");

        let source = WorldStatsSource::new(vec![good, bad]);
        let dataset = source.stored_dataset(ALICE).await.unwrap().unwrap();
        assert_eq!(dataset.get("custom", "jump"), Some(&StatValue::Int(3)));
    }

    #[tokio::test]
    async fn known_entities_use_cached_names_and_skip_non_uuid_files() {
        let root = tempfile::tempdir().unwrap();
        let world = root.path().join("world");
        write_stats(&world, ALICE, r#"{"stats": {}}"#);
        write_stats(&world, BOB, r#"{"stats": {}}"#);
        write_stats(&world, "notes", r#"{"stats": {}}"#);
        let cache = root.path().join("usercache.json");
        std::fs::write(&cache, format!(r#"[{{"uuid": "{ALICE}", "name": "Alice"}}]"#)).unwrap();

        let source = WorldStatsSource::new(vec![world]).with_user_cache(&cache);
        let known = source.known_entities().await.unwrap();

        assert_eq!(
            known,
            vec![EntityRef::new(ALICE, "Alice"), EntityRef::new(BOB, BOB)]
        );
    }

    #[tokio::test]
    async fn live_data_wins_for_connected_players() {
        let root = tempfile::tempdir().unwrap();
        let world = root.path().join("world");
        write_stats(&world, ALICE, r#"{"stats": {"custom": {"jump": 3}}}"#);

        let source = WorldStatsSource::new(vec![world]);
        source.player_joined(EntityRef::new(ALICE, "Alice")).await;
        source
            .update_live(ALICE, StatDataset::new().with_stat("custom", "jump", 8))
            .await;

        let live = source.live_dataset(ALICE).await.unwrap().unwrap();
        assert_eq!(live.get("custom", "jump"), Some(&StatValue::Int(8)));
        let stored = source.stored_dataset(ALICE).await.unwrap().unwrap();
        assert_eq!(stored.get("custom", "jump"), Some(&StatValue::Int(3)));

        source.player_left(ALICE).await;
        assert!(source.online_entities().await.unwrap().is_empty());
        let fallback = source.live_dataset(ALICE).await.unwrap().unwrap();
        assert_eq!(fallback.get("custom", "jump"), Some(&StatValue::Int(3)));
    }

    #[tokio::test]
    async fn unknown_player_has_no_dataset() {
        let root = tempfile::tempdir().unwrap();
        let source = WorldStatsSource::new(vec![root.path().join("world")]);
        assert!(source.stored_dataset(BOB).await.unwrap().is_none());
    }
}
