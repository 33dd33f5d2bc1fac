use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::{info, instrument};

use super::{EntityAggregate, PassSummary, PopulationScope, Ranking, SyncReport};
use crate::shared::{AppError, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct CalculateRequest {
    #[serde(default)]
    pub scope: Option<String>,
}

/// GET /rankings/:metric_id
#[instrument(name = "get_ranking", skip(state))]
pub async fn get_ranking(
    State(state): State<AppState>,
    Path(metric_id): Path<String>,
) -> Result<Json<Ranking>, AppError> {
    let ranking = state.awards.get_ranking(&metric_id).await?;
    Ok(Json(ranking))
}

/// GET /entities/:id
#[instrument(name = "get_entity", skip(state))]
pub async fn get_entity(
    State(state): State<AppState>,
    Path(entity_id): Path<String>,
) -> Result<Json<EntityAggregate>, AppError> {
    let aggregate = state.awards.get_aggregate(&entity_id).await?;
    Ok(Json(aggregate))
}

/// GET /entities/:id/stats
///
/// Lists the stat paths a metric could be configured against.
#[instrument(name = "get_entity_stats", skip(state))]
pub async fn get_entity_stats(
    State(state): State<AppState>,
    Path(entity_id): Path<String>,
) -> Result<Json<Vec<String>>, AppError> {
    let stats = state.awards.get_available_stats(&entity_id).await?;
    Ok(Json(stats))
}

/// DELETE /entities/:id
#[instrument(name = "clear_entity", skip(state))]
pub async fn clear_entity(
    State(state): State<AppState>,
    Path(entity_id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.awards.clear(&entity_id).await?;
    info!(entity_id = %entity_id, "Entity awards cleared by admin");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /calculate
///
/// Body: `{"scope": "online" | "all"}`; scope defaults to online.
#[instrument(name = "calculate_all", skip(state))]
pub async fn calculate_all(
    State(state): State<AppState>,
    Json(request): Json<CalculateRequest>,
) -> Result<Json<PassSummary>, AppError> {
    let scope = match request.scope.as_deref() {
        Some(scope) => PopulationScope::try_from(scope).map_err(AppError::BadRequest)?,
        None => PopulationScope::default(),
    };
    let summary = state.awards.calculate_all(scope).await?;
    Ok(Json(summary))
}

/// POST /entities/:id/calculate
#[instrument(name = "calculate_entity", skip(state))]
pub async fn calculate_entity(
    State(state): State<AppState>,
    Path(entity_id): Path<String>,
) -> Result<Json<EntityAggregate>, AppError> {
    let aggregate = state.awards.calculate_for_entity(&entity_id).await?;
    Ok(Json(aggregate))
}

/// POST /sync
#[instrument(name = "sync_now", skip(state))]
pub async fn sync_now(State(state): State<AppState>) -> Result<Json<SyncReport>, AppError> {
    let report = state.awards.sync_now().await?;
    Ok(Json(report))
}
