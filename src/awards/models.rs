use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use strum::IntoEnumIterator;
use strum_macros::EnumIter;

use crate::stats::StatDataset;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, EnumIter,
)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Stone = 0,
    Iron = 1,
    Diamond = 2,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Tier::Stone => "stone",
                Tier::Iron => "iron",
                Tier::Diamond => "diamond",
            }
        )
    }
}

impl TryFrom<&str> for Tier {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Tier::iter()
            .find(|tier| tier.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| s.to_string())
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, EnumIter,
)]
#[serde(rename_all = "lowercase")]
pub enum MedalType {
    Gold = 0,
    Silver = 1,
    Bronze = 2,
}

impl MedalType {
    /// Medal for a zero-based ranking position; only the podium gets one.
    pub fn for_position(position: usize) -> Option<Self> {
        match position {
            0 => Some(MedalType::Gold),
            1 => Some(MedalType::Silver),
            2 => Some(MedalType::Bronze),
            _ => None,
        }
    }

    /// One-based podium rank.
    pub fn rank(self) -> u8 {
        self as u8 + 1
    }
}

impl fmt::Display for MedalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                MedalType::Gold => "gold",
                MedalType::Silver => "silver",
                MedalType::Bronze => "bronze",
            }
        )
    }
}

/// A configured ranking category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub tier: Tier,
    pub stat_path: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl MetricDefinition {
    pub fn new(id: impl Into<String>, tier: Tier, stat_path: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: String::new(),
            tier,
            stat_path: stat_path.into(),
            enabled: true,
        }
    }
}

/// Points for each podium place within one tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MedalPoints {
    #[serde(default)]
    pub gold: f64,
    #[serde(default)]
    pub silver: f64,
    #[serde(default)]
    pub bronze: f64,
}

impl MedalPoints {
    pub fn new(gold: f64, silver: f64, bronze: f64) -> Self {
        Self {
            gold,
            silver,
            bronze,
        }
    }

    fn get(&self, medal: MedalType) -> f64 {
        match medal {
            MedalType::Gold => self.gold,
            MedalType::Silver => self.silver,
            MedalType::Bronze => self.bronze,
        }
    }

    fn slot(&mut self, medal: MedalType) -> &mut f64 {
        match medal {
            MedalType::Gold => &mut self.gold,
            MedalType::Silver => &mut self.silver,
            MedalType::Bronze => &mut self.bronze,
        }
    }
}

/// Points per tier and medal. Entries left out of a configured table are
/// worth nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointTable {
    #[serde(default)]
    pub stone: MedalPoints,
    #[serde(default)]
    pub iron: MedalPoints,
    #[serde(default)]
    pub diamond: MedalPoints,
}

impl PointTable {
    pub fn empty() -> Self {
        Self {
            stone: MedalPoints::default(),
            iron: MedalPoints::default(),
            diamond: MedalPoints::default(),
        }
    }

    pub fn with_points(mut self, tier: Tier, medal: MedalType, points: f64) -> Self {
        self.set(tier, medal, points);
        self
    }

    pub fn set(&mut self, tier: Tier, medal: MedalType, points: f64) {
        *self.tier_mut(tier).slot(medal) = points;
    }

    pub fn points(&self, tier: Tier, medal: MedalType) -> f64 {
        self.tier(tier).get(medal)
    }

    fn tier(&self, tier: Tier) -> &MedalPoints {
        match tier {
            Tier::Stone => &self.stone,
            Tier::Iron => &self.iron,
            Tier::Diamond => &self.diamond,
        }
    }

    fn tier_mut(&mut self, tier: Tier) -> &mut MedalPoints {
        match tier {
            Tier::Stone => &mut self.stone,
            Tier::Iron => &mut self.iron,
            Tier::Diamond => &mut self.diamond,
        }
    }
}

impl Default for PointTable {
    fn default() -> Self {
        Self {
            stone: MedalPoints::new(2.0, 1.0, 0.5),
            iron: MedalPoints::new(4.0, 2.0, 1.0),
            diamond: MedalPoints::new(8.0, 4.0, 2.0),
        }
    }
}

/// One entity's stats as seen by a calculation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationMember {
    pub entity_id: String,
    pub display_name: String,
    pub dataset: StatDataset,
}

impl PopulationMember {
    pub fn new(
        entity_id: impl Into<String>,
        display_name: impl Into<String>,
        dataset: StatDataset,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            display_name: display_name.into(),
            dataset,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
    pub entity_id: String,
    pub display_name: String,
    pub value: i64,
}

/// Entities ordered best-first for one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ranking {
    pub metric_id: String,
    pub entries: Vec<RankingEntry>,
}

impl Ranking {
    pub fn empty(metric_id: impl Into<String>) -> Self {
        Self {
            metric_id: metric_id.into(),
            entries: Vec::new(),
        }
    }

    /// One-based position of `entity_id`, if it ranked at all.
    pub fn position_of(&self, entity_id: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.entity_id == entity_id)
            .map(|index| index + 1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedalAward {
    pub metric_id: String,
    pub medal: MedalType,
    pub points: f64,
    pub rank: u8,
    pub value: i64,
    pub awarded_at: DateTime<Utc>,
}

impl MedalAward {
    /// Same placement as `other`, ignoring when it was awarded.
    pub fn same_placement(&self, other: &MedalAward) -> bool {
        self.metric_id == other.metric_id
            && self.medal == other.medal
            && self.rank == other.rank
            && self.value == other.value
            && self.points == other.points
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedalCounts {
    pub gold: u32,
    pub silver: u32,
    pub bronze: u32,
}

impl MedalCounts {
    pub fn total(&self) -> u32 {
        self.gold + self.silver + self.bronze
    }
}

/// Medals held by one entity plus the totals derived from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityAggregate {
    pub entity_id: String,
    pub display_name: String,
    pub medals: Vec<MedalAward>,
    pub total_points: f64,
    pub counts: MedalCounts,
}

impl EntityAggregate {
    pub fn new(entity_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            display_name: display_name.into(),
            medals: Vec::new(),
            total_points: 0.0,
            counts: MedalCounts::default(),
        }
    }

    pub fn from_medals(
        entity_id: impl Into<String>,
        display_name: impl Into<String>,
        medals: Vec<MedalAward>,
    ) -> Self {
        let mut aggregate = Self::new(entity_id, display_name);
        aggregate.medals = medals;
        aggregate.recompute();
        aggregate
    }

    /// Rebuild points and counts from the medal list.
    pub fn recompute(&mut self) {
        let mut counts = MedalCounts::default();
        for award in &self.medals {
            match award.medal {
                MedalType::Gold => counts.gold += 1,
                MedalType::Silver => counts.silver += 1,
                MedalType::Bronze => counts.bronze += 1,
            }
        }
        self.counts = counts;
        self.total_points = self.medals.iter().map(|award| award.points).sum();
    }

    pub fn medal_for(&self, metric_id: &str) -> Option<&MedalAward> {
        self.medals.iter().find(|award| award.metric_id == metric_id)
    }

    pub fn has_medals(&self) -> bool {
        !self.medals.is_empty()
    }
}

/// Immutable view of the latest calculation, replaced wholesale on every pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AwardSnapshot {
    pub rankings: BTreeMap<String, Ranking>,
    pub aggregates: BTreeMap<String, EntityAggregate>,
    pub computed_at: Option<DateTime<Utc>>,
}

impl AwardSnapshot {
    pub fn ranking(&self, metric_id: &str) -> Option<&Ranking> {
        self.rankings.get(metric_id)
    }

    pub fn aggregate(&self, entity_id: &str) -> Option<&EntityAggregate> {
        self.aggregates.get(entity_id)
    }
}
