use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use coachline_booking::SeatAvailability;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/schedules/{id}/seats", get(seat_map))
}

#[derive(Debug, Deserialize)]
pub struct SeatMapQuery {
    /// Render the trip as it appears on a surprise booking.
    #[serde(default)]
    pub surprise: bool,
}

/// GET /v1/schedules/{id}/seats
pub async fn seat_map(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<SeatMapQuery>,
) -> Result<Json<SeatAvailability>, AppError> {
    let availability = state.engine.available_seats(id, query.surprise).await?;
    Ok(Json(availability))
}
