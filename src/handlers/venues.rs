use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::Venue;
use crate::state::AppState;

#[derive(Serialize)]
pub struct VenueResponse {
    id: String,
    name: String,
    base_rate: String,
    status: String,
}

impl From<&Venue> for VenueResponse {
    fn from(venue: &Venue) -> Self {
        Self {
            id: venue.id.clone(),
            name: venue.name.clone(),
            base_rate: venue.base_rate.to_string(),
            status: venue.status.clone(),
        }
    }
}

// GET /api/venues
pub async fn list_venues(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<VenueResponse>>, AppError> {
    let venues = {
        let db = state.db.lock().unwrap();
        queries::list_published_venues(&db)?
    };

    Ok(Json(venues.iter().map(VenueResponse::from).collect()))
}

// GET /api/venues/:id
pub async fn get_venue(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<VenueResponse>, AppError> {
    let venue = {
        let db = state.db.lock().unwrap();
        queries::get_venue(&db, &id)?
    }
    .filter(Venue::is_published)
    .ok_or_else(|| AppError::NotFound(format!("venue {id}")))?;

    Ok(Json(VenueResponse::from(&venue)))
}
