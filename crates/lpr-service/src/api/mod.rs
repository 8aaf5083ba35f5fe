pub mod routes;

use crate::state::LprServiceState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Build the API router
pub fn router(state: LprServiceState) -> Router {
    Router::new()
        // Health and metrics endpoints
        .route("/healthz", get(routes::healthz))
        .route("/readyz", get(routes::readyz))
        .route("/metrics", get(routes::metrics))
        // Pipeline endpoints
        .route("/v1/frames", post(routes::submit_frame))
        .route("/v1/records", get(routes::list_records))
        .route("/v1/stats", get(routes::stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
