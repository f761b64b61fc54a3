use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::services::calculator::Calculator;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status ("ok" when healthy, "degraded" when the engine binary is missing)
    pub status: String,
    /// API version
    pub version: String,
    /// Whether the route engine binary exists
    pub engine: bool,
}

/// Health check endpoint.
///
/// Returns status "degraded" (still 200) if the engine binary cannot be
/// found, so load balancers can distinguish partial failures.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    )
)]
pub async fn health_check(State(calculator): State<Arc<Calculator>>) -> Json<HealthResponse> {
    let engine_ok = tokio::fs::try_exists(&calculator.engine().program)
        .await
        .unwrap_or(false);

    Json(HealthResponse {
        status: if engine_ok {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        engine: engine_ok,
    })
}
