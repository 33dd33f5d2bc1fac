// Library crate for the medalboard award server
// This file exposes the public API for the binary and integration tests

pub mod awards;
pub mod config;
pub mod shared;
pub mod source;
pub mod stats;
pub mod storage;
pub mod sync;

use axum::{
    routing::{get, post},
    Router,
};

// Re-export commonly used types for easier access in tests
pub use awards::{AwardService, EntityAggregate, MetricDefinition, PopulationScope, Tier};
pub use config::MedalboardConfig;
pub use shared::{AppError, AppState};
pub use source::{StatSource, WorldStatsSource};
pub use storage::{AwardStore, FileAwardStore};
pub use sync::{SyncGateway, SyncHandle};

/// Admin routes for one award service.
pub fn admin_router(state: AppState) -> Router {
    Router::new()
        .route("/rankings/:metric_id", get(awards::get_ranking))
        .route(
            "/entities/:id",
            get(awards::get_entity).delete(awards::clear_entity),
        )
        .route("/entities/:id/stats", get(awards::get_entity_stats))
        .route("/entities/:id/calculate", post(awards::calculate_entity))
        .route("/calculate", post(awards::calculate_all))
        .route("/sync", post(awards::sync_now))
        .with_state(state)
}
