//! Saved location endpoints.
//!
//! - GET /api/v1/places/saved: all saved places
//! - POST /api/v1/places/saved: save a place (no-op if its id exists)

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;

use crate::errors::{AppError, ErrorResponse};
use crate::services::places::{Place, PlaceStore};

/// List saved places in insertion order.
#[utoipa::path(
    get,
    path = "/api/v1/places/saved",
    tag = "Places",
    responses(
        (status = 200, description = "Saved places", body = Vec<Place>),
    )
)]
pub async fn list_saved_places(State(store): State<Arc<PlaceStore>>) -> Json<Vec<Place>> {
    Json(store.list().await)
}

/// Save a place. Returns 201 when it was added and 200 when the id was
/// already stored (the stored entry is returned unchanged).
#[utoipa::path(
    post,
    path = "/api/v1/places/saved",
    tag = "Places",
    request_body = Place,
    responses(
        (status = 201, description = "Place saved", body = Place),
        (status = 200, description = "Place already saved", body = Place),
        (status = 400, description = "Invalid place", body = ErrorResponse),
    )
)]
pub async fn save_place(
    State(store): State<Arc<PlaceStore>>,
    Json(place): Json<Place>,
) -> Result<(StatusCode, Json<Place>), AppError> {
    let id = place.id.clone();
    let added = store.save(place).await?;
    let stored = store
        .get(&id)
        .await
        .ok_or_else(|| AppError::InternalError(format!("place {} missing after save", id)))?;

    if added {
        tracing::info!("Saved place {}", id);
        Ok((StatusCode::CREATED, Json(stored)))
    } else {
        Ok((StatusCode::OK, Json(stored)))
    }
}
