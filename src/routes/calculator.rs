//! Route calculation endpoints.
//!
//! - GET /api/v1/calculator/test: run with default options
//! - POST /api/v1/calculator/run: run with options from the JSON body
//!
//! Both block until the engine exits. Any failure is a 400.

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use std::sync::Arc;

use crate::errors::{AppError, ErrorResponse};
use crate::services::calculator::{CalculationReport, Calculator};
use crate::services::options::CalculationOptions;

/// Run a calculation with the default options.
#[utoipa::path(
    get,
    path = "/api/v1/calculator/test",
    tag = "Calculator",
    responses(
        (status = 200, description = "Computed route", body = CalculationReport),
        (status = 400, description = "Engine failed", body = ErrorResponse),
    )
)]
pub async fn run_test_calculation(
    State(calculator): State<Arc<Calculator>>,
) -> Result<Json<CalculationReport>, AppError> {
    let calculation = calculator.create_calculation(CalculationOptions::default());
    tracing::info!("calculation [{}]: test run requested", calculation.id());
    Ok(Json(calculation.run().await?))
}

/// Run a calculation with user options.
///
/// Missing keys take their defaults; an empty body runs the defaults.
#[utoipa::path(
    post,
    path = "/api/v1/calculator/run",
    tag = "Calculator",
    request_body(content = Object, description = "Partial calculation options", content_type = "application/json"),
    responses(
        (status = 200, description = "Computed route", body = CalculationReport),
        (status = 400, description = "Invalid options or engine failure", body = ErrorResponse),
    )
)]
pub async fn run_calculation(
    State(calculator): State<Arc<Calculator>>,
    body: Bytes,
) -> Result<Json<CalculationReport>, AppError> {
    let raw = if body.iter().all(u8::is_ascii_whitespace) {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {}", e)))?
    };

    let options = calculator.normalize_options(&raw)?;
    let calculation = calculator.create_calculation(options);
    tracing::info!(
        "calculation [{}]: run requested (precision {}, directions {}, weather {})",
        calculation.id(),
        calculation.options().precision,
        calculation.options().directions,
        calculation.options().weather
    );
    Ok(Json(calculation.run().await?))
}
