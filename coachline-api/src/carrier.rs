use axum::{
    extract::{rejection::JsonRejection, Path, State},
    middleware,
    routing::post,
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use coachline_booking::CarrierCancellation;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{json_body, AppError};
use crate::middleware::{carrier_auth_middleware, Claims};
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/v1/carrier/schedules/{id}/cancel", post(cancel_schedule))
        .route("/v1/carrier/schedules/{id}/changes", post(announce_change))
        .route_layer(middleware::from_fn_with_state(state, carrier_auth_middleware))
}

/// POST /v1/carrier/schedules/{id}/cancel
///
/// Called when a carrier withdraws a departure. Every passenger holding seats
/// is cancelled and refunded.
pub async fn cancel_schedule(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<CarrierCancellation>, AppError> {
    Ok(Json(state.engine.cancel_schedule_by_carrier(id, claims.sub).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleChangeRequest {
    pub previous_departure_time: DateTime<Utc>,
    pub previous_arrival_time: DateTime<Utc>,
}

/// POST /v1/carrier/schedules/{id}/changes
pub async fn announce_change(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    body: Result<Json<ScheduleChangeRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let request = json_body(body)?;
    let notified = state
        .engine
        .announce_schedule_change(
            id,
            claims.sub,
            request.previous_departure_time,
            request.previous_arrival_time,
        )
        .await?;
    Ok(Json(json!({ "scheduleId": id, "notified": notified })))
}
