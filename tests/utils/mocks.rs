use std::sync::{Arc, Mutex};

use medalboard::source::{Notification, NotificationSink};
use medalboard::stats::StatDataset;

// ============================================================================
// Mock Infrastructure
// ============================================================================

/// Dataset with a single `custom.score` leaf.
pub fn score(value: i64) -> StatDataset {
    StatDataset::new().with_stat("custom", "score", value)
}

/// Notification sink that keeps everything it is given.
#[derive(Clone, Default)]
pub struct RecordingSink {
    received: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> Vec<Notification> {
        self.received.lock().unwrap().clone()
    }

    pub fn received_by(&self, entity_id: &str) -> Vec<Notification> {
        self.received()
            .into_iter()
            .filter(|notification| notification.entity().id == entity_id)
            .collect()
    }

    pub fn clear(&self) {
        self.received.lock().unwrap().clear();
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, notification: Notification) {
        self.received.lock().unwrap().push(notification);
    }
}
