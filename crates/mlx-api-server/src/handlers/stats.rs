use axum::{extract::State, Json};

use crate::{models::StatsResponse, state::AppState};

pub async fn handle_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(state.stats.stats())
}
