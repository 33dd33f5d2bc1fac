//! Interfaces to the host server: where stats come from, who is connected,
//! which towns exist, and where announcements go.

pub mod memory;
pub mod notify;
pub mod towns;
pub mod world;

mod errors;

pub use errors::SourceError;
pub use memory::InMemoryStatSource;
pub use notify::{ChannelNotificationSink, LogNotificationSink, Notification, NotificationSink};
pub use towns::{NoTownDirectory, StaticTownDirectory, Town, TownDirectory, TownStatSource};
pub use world::WorldStatsSource;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::stats::StatDataset;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: String,
    pub display_name: String,
}

impl EntityRef {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Provider of per-entity stat datasets.
#[async_trait]
pub trait StatSource: Send + Sync {
    /// Entities currently connected.
    async fn online_entities(&self) -> Result<Vec<EntityRef>, SourceError>;

    /// Every entity with persisted stats, connected or not.
    async fn known_entities(&self) -> Result<Vec<EntityRef>, SourceError>;

    /// Up-to-date stats for a connected entity.
    async fn live_dataset(&self, entity_id: &str) -> Result<Option<StatDataset>, SourceError>;

    /// Stats as last persisted by the host.
    async fn stored_dataset(&self, entity_id: &str) -> Result<Option<StatDataset>, SourceError>;
}
