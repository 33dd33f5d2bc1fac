pub mod file_store;
pub mod memory;

mod errors;
pub mod records;

pub use errors::StoreError;
pub use file_store::FileAwardStore;
pub use memory::InMemoryAwardStore;
pub use records::{AwardListRecord, MedalCountRecord, PointTotalRecord};

use async_trait::async_trait;
use tracing::warn;

use crate::awards::EntityAggregate;

/// Durable per-entity award storage.
///
/// Every write replaces the entity's full record; there is no incremental
/// update.
#[async_trait]
pub trait AwardStore: Send + Sync {
    async fn save(&self, aggregate: &EntityAggregate) -> Result<(), StoreError>;

    /// Every readable record. Unreadable entries are skipped, not fatal.
    async fn load_all(&self) -> Result<Vec<EntityAggregate>, StoreError>;

    /// Remove every record kept for `entity_id`. Clearing an unknown entity
    /// is not an error.
    async fn clear(&self, entity_id: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failed: usize,
    /// Entities whose record could not be written or removed.
    pub failed_ids: Vec<String>,
}

/// Save each aggregate on its own; one failing entity does not stop the rest.
pub async fn save_all<'a, I>(store: &dyn AwardStore, aggregates: I) -> BatchReport
where
    I: IntoIterator<Item = &'a EntityAggregate>,
{
    let mut report = BatchReport::default();
    for aggregate in aggregates {
        match store.save(aggregate).await {
            Ok(()) => report.succeeded += 1,
            Err(err) => {
                report.failed += 1;
                report.failed_ids.push(aggregate.entity_id.clone());
                warn!(entity_id = %aggregate.entity_id, error = %err, "Failed to save award record");
            }
        }
    }
    report
}

/// Clear each entity on its own; failures are logged and counted.
pub async fn clear_all<I>(store: &dyn AwardStore, entity_ids: I) -> BatchReport
where
    I: IntoIterator<Item = String>,
{
    let mut report = BatchReport::default();
    for entity_id in entity_ids {
        match store.clear(&entity_id).await {
            Ok(()) => report.succeeded += 1,
            Err(err) => {
                report.failed += 1;
                warn!(entity_id = %entity_id, error = %err, "Failed to clear award record");
                report.failed_ids.push(entity_id);
            }
        }
    }
    report
}
