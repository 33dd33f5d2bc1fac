use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

use crate::awards::{AwardError, AwardService};

/// Shared application state containing all dependencies
#[derive(Clone)]
pub struct AppState {
    pub awards: Arc<AwardService>,
}

impl AppState {
    pub fn new(awards: Arc<AwardService>) -> Self {
        Self { awards }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Internal server error")]
    Internal,
}

impl From<AwardError> for AppError {
    fn from(err: AwardError) -> Self {
        match err {
            AwardError::UnknownMetric(id) => AppError::NotFound(format!("No metric named {id}")),
            AwardError::UnknownEntity(id) => AppError::NotFound(format!("No records for {id}")),
            AwardError::SyncDisabled => AppError::Unavailable("Remote sync is disabled".to_string()),
            AwardError::Source(_) | AwardError::Store(_) => {
                // Details stay in the log; callers get a short message.
                error!(error = %err, "Request failed");
                AppError::Internal
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(json!({
            "error": error_message
        }));

        (status, body).into_response()
    }
}
