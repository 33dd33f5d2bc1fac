// Public API - what other modules can use
pub use engine::{PassOutcome, RankingEngine};
pub use errors::AwardError;
pub use handlers::{
    calculate_all, calculate_entity, clear_entity, get_entity, get_entity_stats, get_ranking,
    sync_now,
};
pub use models::*;
pub use service::{AwardService, AwardServiceBuilder, PassSummary, PopulationScope, SyncReport};
pub use task::{start_recalculation_task, RecalculationConfig};

// Internal modules
pub mod engine;
mod errors;
mod handlers;
pub mod models;
mod service;
mod task;
