use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

use super::{AwardListRecord, AwardStore, MedalCountRecord, PointTotalRecord, StoreError};
use crate::awards::EntityAggregate;

const AWARDS_DIR: &str = "awards";
const MEDALS_DIR: &str = "medals";
const POINTS_DIR: &str = "points";
const RECORD_EXTENSION: &str = "json";

/// Award storage on the local filesystem.
///
/// Layout under the root directory:
///
/// ```text
/// awards/<entity>.json   award list
/// medals/<entity>.json   gold/silver/bronze counts
/// points/<entity>.json   point total
/// ```
///
/// Files are pretty-printed so they can be inspected and edited while the
/// server is down. Each file is written to a temporary sibling and renamed
/// into place.
#[derive(Debug, Clone)]
pub struct FileAwardStore {
    root: PathBuf,
}

impl FileAwardStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, dir: &str, entity_id: &str) -> Result<PathBuf, StoreError> {
        validate_key(entity_id)?;
        Ok(self
            .root
            .join(dir)
            .join(format!("{entity_id}.{RECORD_EXTENSION}")))
    }

    async fn write_record<T: Serialize>(
        &self,
        dir: &str,
        entity_id: &str,
        record: &T,
    ) -> Result<(), StoreError> {
        let path = self.record_path(dir, entity_id)?;
        let directory = self.root.join(dir);
        fs::create_dir_all(&directory)
            .await
            .map_err(|err| StoreError::io(&directory, err))?;

        let body = serde_json::to_vec_pretty(record)?;
        let staging = path.with_extension(format!("{RECORD_EXTENSION}.tmp"));
        fs::write(&staging, body)
            .await
            .map_err(|err| StoreError::io(&staging, err))?;
        fs::rename(&staging, &path)
            .await
            .map_err(|err| StoreError::io(&path, err))?;
        Ok(())
    }

    async fn remove_record(&self, dir: &str, entity_id: &str) -> Result<(), StoreError> {
        let path = self.record_path(dir, entity_id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::io(&path, err)),
        }
    }

    async fn read_point_total(&self, entity_id: &str) -> Option<PointTotalRecord> {
        let path = self.record_path(POINTS_DIR, entity_id).ok()?;
        let raw = fs::read(&path).await.ok()?;
        match serde_json::from_slice(&raw) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Ignoring unreadable point total");
                None
            }
        }
    }

    async fn load_award_file(&self, path: &Path) -> Result<EntityAggregate, StoreError> {
        let raw = fs::read(path)
            .await
            .map_err(|err| StoreError::io(path, err))?;
        let record: AwardListRecord = serde_json::from_slice(&raw)?;
        validate_key(&record.entity_id)?;
        Ok(record.into())
    }
}

/// Entity ids become file names, so anything that could escape the record
/// directory is rejected.
fn validate_key(entity_id: &str) -> Result<(), StoreError> {
    let invalid = entity_id.is_empty()
        || entity_id.starts_with('.')
        || entity_id
            .chars()
            .any(|c| matches!(c, '/' | '\\' | ':' | '\0') || c.is_control());
    if invalid {
        return Err(StoreError::InvalidKey(entity_id.to_string()));
    }
    Ok(())
}

#[async_trait]
impl AwardStore for FileAwardStore {
    #[instrument(skip(self, aggregate), fields(entity_id = %aggregate.entity_id))]
    async fn save(&self, aggregate: &EntityAggregate) -> Result<(), StoreError> {
        let entity_id = aggregate.entity_id.as_str();
        self.write_record(AWARDS_DIR, entity_id, &AwardListRecord::from(aggregate))
            .await?;
        self.write_record(MEDALS_DIR, entity_id, &MedalCountRecord::from(aggregate))
            .await?;
        self.write_record(
            POINTS_DIR,
            entity_id,
            &PointTotalRecord::from_aggregate(aggregate, Utc::now()),
        )
        .await?;
        debug!(medals = aggregate.medals.len(), "Saved award record");
        Ok(())
    }

    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn load_all(&self) -> Result<Vec<EntityAggregate>, StoreError> {
        let directory = self.root.join(AWARDS_DIR);
        let mut entries = match fs::read_dir(&directory).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!("No award records on disk yet");
                return Ok(Vec::new());
            }
            Err(err) => return Err(StoreError::io(&directory, err)),
        };

        let mut aggregates = Vec::new();
        let mut skipped = 0usize;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| StoreError::io(&directory, err))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }

            let aggregate = match self.load_award_file(&path).await {
                Ok(aggregate) => aggregate,
                Err(err) => {
                    skipped += 1;
                    warn!(path = %path.display(), error = %err, "Skipping unreadable award record");
                    continue;
                }
            };

            if let Some(stored) = self.read_point_total(&aggregate.entity_id).await {
                if stored.total_points != aggregate.total_points {
                    warn!(
                        entity_id = %aggregate.entity_id,
                        stored = stored.total_points,
                        recomputed = aggregate.total_points,
                        "Stored point total disagrees with award list, using award list"
                    );
                }
            }

            aggregates.push(aggregate);
        }

        aggregates.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        info!(loaded = aggregates.len(), skipped, "Loaded award records");
        Ok(aggregates)
    }

    #[instrument(skip(self))]
    async fn clear(&self, entity_id: &str) -> Result<(), StoreError> {
        for dir in [AWARDS_DIR, MEDALS_DIR, POINTS_DIR] {
            self.remove_record(dir, entity_id).await?;
        }
        debug!("Cleared award record");
        Ok(())
    }
}
