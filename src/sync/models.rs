use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::awards::{EntityAggregate, MedalAward, MedalCounts, MedalType};

/// How derived medal/point rows are kept up to date on the remote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateMode {
    /// Overwrite the remote rows with the local totals.
    #[default]
    Snapshot,
    /// Read the remote row, add the local change, write it back. Not atomic
    /// against other writers touching the same row.
    ReadModifyWrite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub enabled: bool,
    /// REST endpoint root, e.g. `https://project.example.co/rest/v1`.
    pub base_url: String,
    pub api_key: Option<String>,
    /// Tables are named `<prefix>_awards`, `<prefix>_medals`,
    /// `<prefix>_points` and `<prefix>_names`.
    pub table_prefix: String,
    pub request_delay_ms: u64,
    pub initial_backoff_ms: u64,
    pub max_retries: u32,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub mode: AggregateMode,
    pub placeholder_name: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: String::new(),
            api_key: None,
            table_prefix: "player".to_string(),
            request_delay_ms: 250,
            initial_backoff_ms: 500,
            max_retries: 3,
            connect_timeout_ms: 5_000,
            request_timeout_ms: 10_000,
            mode: AggregateMode::Snapshot,
            placeholder_name: "Unknown".to_string(),
        }
    }
}

impl SyncConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Backoff before retry number `attempt` (zero-based), doubling each time.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.initial_backoff()
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    pub fn tables(&self) -> SyncTables {
        SyncTables::for_prefix(&self.table_prefix)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTables {
    pub awards: String,
    pub medals: String,
    pub points: String,
    pub names: String,
}

impl SyncTables {
    pub fn for_prefix(prefix: &str) -> Self {
        Self {
            awards: format!("{prefix}_awards"),
            medals: format!("{prefix}_medals"),
            points: format!("{prefix}_points"),
            names: format!("{prefix}_names"),
        }
    }
}

pub const ENTITY_KEY: &str = "entity_id";
pub const AWARD_KEY: &str = "entity_id,metric_id";
pub const METRIC_COLUMN: &str = "metric_id";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwardRow {
    pub entity_id: String,
    pub display_name: String,
    pub metric_id: String,
    pub medal: MedalType,
    pub points: f64,
    pub rank: u8,
    pub stat_value: i64,
    pub awarded_at: DateTime<Utc>,
}

impl AwardRow {
    pub fn new(entity_id: &str, display_name: &str, award: &MedalAward) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            display_name: display_name.to_string(),
            metric_id: award.metric_id.clone(),
            medal: award.medal,
            points: award.points,
            rank: award.rank,
            stat_value: award.value,
            awarded_at: award.awarded_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedalCountRow {
    pub entity_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub gold: i64,
    #[serde(default)]
    pub silver: i64,
    #[serde(default)]
    pub bronze: i64,
    #[serde(default)]
    pub total: i64,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointTotalRow {
    pub entity_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub total_points: f64,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Signed change between two medal tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedalDelta {
    pub gold: i64,
    pub silver: i64,
    pub bronze: i64,
}

impl MedalDelta {
    pub fn between(previous: &MedalCounts, current: &MedalCounts) -> Self {
        Self {
            gold: i64::from(current.gold) - i64::from(previous.gold),
            silver: i64::from(current.silver) - i64::from(previous.silver),
            bronze: i64::from(current.bronze) - i64::from(previous.bronze),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.gold == 0 && self.silver == 0 && self.bronze == 0
    }
}

/// One queued mirror operation. Leaderboard rows are never mirrored; only
/// the three underlying tables are.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOperation {
    UpsertAwards {
        entity_id: String,
        display_name: Option<String>,
        awards: Vec<MedalAward>,
    },
    /// Delete the award rows of medals the entity no longer holds.
    RemoveAwards {
        entity_id: String,
        metric_ids: Vec<String>,
    },
    UpsertAggregate {
        entity_id: String,
        display_name: Option<String>,
        counts: MedalCounts,
        total_points: f64,
    },
    ApplyAggregateDelta {
        entity_id: String,
        display_name: Option<String>,
        medals: MedalDelta,
        points: f64,
    },
}

impl SyncOperation {
    pub fn entity_id(&self) -> &str {
        match self {
            SyncOperation::UpsertAwards { entity_id, .. }
            | SyncOperation::RemoveAwards { entity_id, .. }
            | SyncOperation::UpsertAggregate { entity_id, .. }
            | SyncOperation::ApplyAggregateDelta { entity_id, .. } => entity_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SyncOperation::UpsertAwards { .. } => "upsert_awards",
            SyncOperation::RemoveAwards { .. } => "remove_awards",
            SyncOperation::UpsertAggregate { .. } => "upsert_aggregate",
            SyncOperation::ApplyAggregateDelta { .. } => "apply_aggregate_delta",
        }
    }

    /// Operations that bring the remote in line with `current`, given what
    /// the remote was last told (`previous`).
    pub fn for_aggregate(
        mode: AggregateMode,
        previous: Option<&EntityAggregate>,
        current: &EntityAggregate,
    ) -> Vec<SyncOperation> {
        let display_name =
            Some(current.display_name.clone()).filter(|name| !name.trim().is_empty());
        let mut operations = Vec::with_capacity(3);

        let lost: Vec<String> = previous
            .map(|previous| {
                previous
                    .medals
                    .iter()
                    .filter(|award| current.medal_for(&award.metric_id).is_none())
                    .map(|award| award.metric_id.clone())
                    .collect()
            })
            .unwrap_or_default();
        if !lost.is_empty() {
            operations.push(SyncOperation::RemoveAwards {
                entity_id: current.entity_id.clone(),
                metric_ids: lost,
            });
        }

        if current.has_medals() {
            operations.push(SyncOperation::UpsertAwards {
                entity_id: current.entity_id.clone(),
                display_name: display_name.clone(),
                awards: current.medals.clone(),
            });
        }

        match mode {
            AggregateMode::Snapshot => operations.push(SyncOperation::UpsertAggregate {
                entity_id: current.entity_id.clone(),
                display_name,
                counts: current.counts,
                total_points: current.total_points,
            }),
            AggregateMode::ReadModifyWrite => {
                let (previous_counts, previous_points) = previous
                    .map(|aggregate| (aggregate.counts, aggregate.total_points))
                    .unwrap_or_default();
                let medals = MedalDelta::between(&previous_counts, &current.counts);
                let points = current.total_points - previous_points;
                if !medals.is_zero() || points != 0.0 {
                    operations.push(SyncOperation::ApplyAggregateDelta {
                        entity_id: current.entity_id.clone(),
                        display_name,
                        medals,
                        points,
                    });
                }
            }
        }

        operations
    }
}
