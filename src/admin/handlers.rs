use crate::application::{Application, ApplicationStats};
use crate::error::ApplybotError;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use super::server::AdminState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateRequest {
    #[serde(default)]
    pub status: String,
    pub admin_notes: Option<String>,
}

/// Maps crate errors onto HTTP responses
#[derive(Debug)]
pub struct ApiError(pub ApplybotError);

impl From<ApplybotError> for ApiError {
    fn from(error: ApplybotError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            ApplybotError::Validation { .. } | ApplybotError::InvalidDecision { .. } => {
                (StatusCode::BAD_REQUEST, self.0.to_string())
            }
            ApplybotError::NotFound { .. } => (StatusCode::NOT_FOUND, self.0.to_string()),
            ApplybotError::AlreadyDecided { .. } => (StatusCode::CONFLICT, self.0.to_string()),
            other => {
                error!("Admin request failed: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}

pub async fn health_handler(State(state): State<AdminState>) -> Response {
    let report = state.reporter.report();
    let status = StatusCode::from_u16(report.http_status_code())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    (status, Json(report)).into_response()
}

pub async fn list_applications_handler(
    State(state): State<AdminState>,
) -> Result<Json<Vec<Application>>, ApiError> {
    Ok(Json(state.coordinator.list().await?))
}

pub async fn get_application_handler(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> Result<Json<Application>, ApiError> {
    Ok(Json(state.coordinator.get(&id).await?))
}

pub async fn update_status_handler(
    State(state): State<AdminState>,
    Path(id): Path<String>,
    Json(request): Json<StatusUpdateRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let updated = state
        .coordinator
        .decide(&id, &request.status, request.admin_notes)
        .await?;

    info!("Admin set application {} to {}", updated.id, updated.status);
    Ok(Json(json!({ "success": true })))
}

pub async fn stats_handler(
    State(state): State<AdminState>,
) -> Result<Json<ApplicationStats>, ApiError> {
    Ok(Json(state.coordinator.stats().await?))
}
