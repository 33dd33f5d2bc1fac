use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::EntityRef;
use crate::awards::MedalAward;

/// Announcement for a connected entity after a calculation pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    MedalUnlocked {
        entity: EntityRef,
        award: MedalAward,
    },
    PointsIncreased {
        entity: EntityRef,
        previous: f64,
        current: f64,
    },
}

impl Notification {
    pub fn entity(&self) -> &EntityRef {
        match self {
            Notification::MedalUnlocked { entity, .. } => entity,
            Notification::PointsIncreased { entity, .. } => entity,
        }
    }
}

/// Fire-and-forget delivery; a sink must never block or fail a pass.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotificationSink;

impl NotificationSink for LogNotificationSink {
    fn notify(&self, notification: Notification) {
        match &notification {
            Notification::MedalUnlocked { entity, award } => info!(
                entity_id = %entity.id,
                metric_id = %award.metric_id,
                medal = %award.medal,
                "{} earned a {} medal",
                entity.display_name,
                award.medal
            ),
            Notification::PointsIncreased {
                entity,
                previous,
                current,
            } => info!(
                entity_id = %entity.id,
                previous,
                current,
                "{} now has {} points",
                entity.display_name,
                current
            ),
        }
    }
}

/// Publishes notifications on a broadcast channel for whoever relays them
/// to the host.
#[derive(Debug, Clone)]
pub struct ChannelNotificationSink {
    sender: broadcast::Sender<Notification>,
}

impl ChannelNotificationSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }
}

impl NotificationSink for ChannelNotificationSink {
    fn notify(&self, notification: Notification) {
        if self.sender.send(notification).is_err() {
            debug!("Notification dropped with no receivers");
        }
    }
}
