//! Health check handler.

use axum::{extract::State, Json};

use crate::{models::HealthResponse, state::AppState};

/// Always 200; readiness is reported in the body.
pub async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(state.health.health())
}
