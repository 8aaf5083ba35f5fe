use crate::error::ApiError;
use crate::state::LprServiceState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use common::plates::{FrameReport, FrameSubmission};
use serde_json::json;

/// Health check endpoint
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "lpr-service"
        })),
    )
}

/// Readiness check endpoint
pub async fn readyz(State(state): State<LprServiceState>) -> impl IntoResponse {
    let collaborators = state.collaborator_health().await;
    let all_healthy = collaborators.values().all(|&h| h);

    if all_healthy {
        (
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "node_id": state.node_id(),
                "collaborators": collaborators
            })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not ready",
                "node_id": state.node_id(),
                "collaborators": collaborators
            })),
        )
    }
}

/// Metrics endpoint (Prometheus format)
pub async fn metrics() -> impl IntoResponse {
    match telemetry::metrics::encode_metrics() {
        Ok(body) => body.into_response(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics",
            )
                .into_response()
        }
    }
}

/// Run one frame through the pipeline
pub async fn submit_frame(
    State(state): State<LprServiceState>,
    Json(submission): Json<FrameSubmission>,
) -> Result<Json<FrameReport>, ApiError> {
    let frame = submission.frame;
    let report = state.submit(submission).await.map_err(|e| {
        tracing::warn!(frame, error = %e, "Frame rejected");
        e
    })?;
    Ok(Json(report))
}

/// List persisted plate records
pub async fn list_records(State(state): State<LprServiceState>) -> impl IntoResponse {
    let records = state.records().await;
    (
        StatusCode::OK,
        Json(json!({
            "count": records.len(),
            "records": records
        })),
    )
}

/// Service counters
pub async fn stats(State(state): State<LprServiceState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.stats().await))
}
