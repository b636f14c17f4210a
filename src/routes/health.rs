use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app::AppState;
use crate::errors::AppResult;
use crate::models::OkResponse;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub ok: bool,
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    security(()),
    responses(
        (status = 200, description = "Service is up", body = HealthResponse),
        (status = 500, description = "Document store unreachable")
    )
)]
pub async fn health(State(state): State<AppState>) -> AppResult<Json<HealthResponse>> {
    state.store.ping().await?;
    Ok(Json(HealthResponse { ok: true }))
}

/// Explicit answer for `OPTIONS` on collection and item paths.
pub async fn preflight() -> Json<OkResponse> {
    Json(OkResponse::ok())
}
