//! Wind cache HTTP endpoints.
//!
//! - GET /api/v1/weather/wind?hour=ISO8601: metadata of the cached slot
//! - GET /api/v1/weather/status: refresh loop status

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use crate::errors::{AppError, ErrorResponse};
use crate::services::scheduler::{RefreshStatus, SharedRefreshStatus};
use crate::services::weather_cache::{CachedSlot, WeatherCache};

/// Shared state for weather endpoints.
#[derive(Clone)]
pub(crate) struct WeatherState {
    pub(crate) cache: Arc<WeatherCache>,
    pub(crate) status: SharedRefreshStatus,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct WindQuery {
    /// Target hour in ISO 8601 format (defaults to the current hour)
    pub hour: Option<String>,
}

/// Cached wind file for one target hour.
#[derive(Debug, Serialize, ToSchema)]
pub struct WindSnapshot {
    /// Target hour (UTC, on the hour)
    pub target_hour: DateTime<Utc>,
    /// Model run the file was taken from; absent for analysis files
    pub run_time: Option<DateTime<Utc>>,
    /// Whether the file is an analysis rather than a forecast
    pub analysis: bool,
    /// File path relative to the wind cache directory
    pub file: String,
    pub size_bytes: u64,
}

impl WindSnapshot {
    fn from_slot(slot: CachedSlot, wind_dir: &std::path::Path) -> Self {
        let file = slot
            .path
            .strip_prefix(wind_dir)
            .unwrap_or(&slot.path)
            .to_string_lossy()
            .into_owned();
        Self {
            target_hour: slot.target_hour,
            run_time: slot.run_time,
            analysis: slot.run_time.is_none(),
            file,
            size_bytes: slot.size_bytes,
        }
    }
}

/// Look up the cached wind file for an hour. Never downloads.
#[utoipa::path(
    get,
    path = "/api/v1/weather/wind",
    tag = "Weather",
    params(WindQuery),
    responses(
        (status = 200, description = "Cached wind slot", body = WindSnapshot),
        (status = 400, description = "Invalid hour", body = ErrorResponse),
        (status = 404, description = "No cached data for this hour", body = ErrorResponse),
    )
)]
pub async fn get_wind(
    State(state): State<WeatherState>,
    Query(query): Query<WindQuery>,
) -> Result<Json<WindSnapshot>, AppError> {
    let hour = match query.hour.as_deref() {
        None => Utc::now(),
        Some(raw) => raw
            .parse::<DateTime<Utc>>()
            .map_err(|e| AppError::BadRequest(format!("Invalid hour '{}': {}", raw, e)))?,
    };

    let slot = state.cache.lookup(hour).await?;
    Ok(Json(WindSnapshot::from_slot(slot, state.cache.wind_dir())))
}

/// Get the current refresh loop status.
#[utoipa::path(
    get,
    path = "/api/v1/weather/status",
    tag = "Weather",
    responses(
        (status = 200, description = "Refresh loop status", body = RefreshStatus),
    )
)]
pub async fn get_refresh_status(State(state): State<WeatherState>) -> Json<RefreshStatus> {
    let s = state.status.read().await;
    Json(s.clone())
}
