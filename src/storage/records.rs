use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::awards::{EntityAggregate, MedalAward};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwardListRecord {
    pub entity_id: String,
    pub display_name: String,
    pub awards: Vec<MedalAward>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedalCountRecord {
    pub entity_id: String,
    pub gold: u32,
    pub silver: u32,
    pub bronze: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointTotalRecord {
    pub entity_id: String,
    pub total_points: f64,
    pub updated_at: DateTime<Utc>,
}

impl From<&EntityAggregate> for AwardListRecord {
    fn from(aggregate: &EntityAggregate) -> Self {
        Self {
            entity_id: aggregate.entity_id.clone(),
            display_name: aggregate.display_name.clone(),
            awards: aggregate.medals.clone(),
        }
    }
}

impl From<&EntityAggregate> for MedalCountRecord {
    fn from(aggregate: &EntityAggregate) -> Self {
        Self {
            entity_id: aggregate.entity_id.clone(),
            gold: aggregate.counts.gold,
            silver: aggregate.counts.silver,
            bronze: aggregate.counts.bronze,
        }
    }
}

impl PointTotalRecord {
    pub fn from_aggregate(aggregate: &EntityAggregate, updated_at: DateTime<Utc>) -> Self {
        Self {
            entity_id: aggregate.entity_id.clone(),
            total_points: aggregate.total_points,
            updated_at,
        }
    }
}

impl From<AwardListRecord> for EntityAggregate {
    fn from(record: AwardListRecord) -> Self {
        EntityAggregate::from_medals(record.entity_id, record.display_name, record.awards)
    }
}
