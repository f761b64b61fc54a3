use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::services::calculator::CalculationError;
use crate::services::options::OptionsError;
use crate::services::places::PlaceStoreError;
use crate::services::weather_cache::CacheError;

/// Standard error response body.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Human-readable error message
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::ExternalServiceError(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, axum::Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::NoData { .. } => AppError::NotFound(err.to_string()),
            CacheError::InvalidRange { .. } => AppError::BadRequest(err.to_string()),
            CacheError::Fetch(_) => AppError::ExternalServiceError(err.to_string()),
            CacheError::Io(_) => AppError::InternalError(err.to_string()),
        }
    }
}

impl From<OptionsError> for AppError {
    fn from(err: OptionsError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

/// Every engine failure is reported to the client as a bad request.
impl From<CalculationError> for AppError {
    fn from(err: CalculationError) -> Self {
        tracing::warn!("Calculation failed: {}", err);
        AppError::BadRequest(err.to_string())
    }
}

impl From<PlaceStoreError> for AppError {
    fn from(err: PlaceStoreError) -> Self {
        match err {
            PlaceStoreError::EmptyId => AppError::BadRequest(err.to_string()),
            _ => AppError::InternalError(err.to_string()),
        }
    }
}
