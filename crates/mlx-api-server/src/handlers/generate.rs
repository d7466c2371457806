//! `/generate` handler.

use axum::{extract::rejection::JsonRejection, extract::State, Json};

use crate::{
    error::RequestError,
    models::{GenerateBody, GenerateResponse},
    state::AppState,
};

/// Handle a chat generation request.
///
/// Decode failures are taken as a `Result` so they go through the same
/// readiness check and error body as every other rejection.
pub async fn handle_generate(
    State(state): State<AppState>,
    body: Result<Json<GenerateBody>, JsonRejection>,
) -> Result<Json<GenerateResponse>, RequestError> {
    let Json(body) = body.map_err(|rejection| state.handler.reject_malformed(rejection.body_text()))?;
    let result = state.handler.handle(body).await.map_err(|err| {
        tracing::debug!(
            status = err.status_code().as_u16(),
            retryable = err.is_retryable(),
            "generate request failed"
        );
        err
    })?;
    Ok(Json(result.into()))
}
