use thiserror::Error;

use crate::source::SourceError;
use crate::storage::StoreError;

#[derive(Debug, Error)]
pub enum AwardError {
    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    #[error("Remote sync is not enabled")]
    SyncDisabled,

    #[error("Stat source error: {0}")]
    Source(#[from] SourceError),

    #[error("Award store error: {0}")]
    Store(#[from] StoreError),
}
