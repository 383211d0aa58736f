use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Extension, Json, Router,
};
use coachline_booking::{NewReservation, ReservationSummary};
use coachline_core::PaymentOutcome;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{json_body, AppError};
use crate::middleware::{passenger_auth_middleware, Claims};
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/v1/reservations", post(create_reservation).get(list_reservations))
        .route("/v1/reservations/{id}", get(get_reservation))
        .route("/v1/reservations/{id}/cancel", post(cancel_reservation))
        .route("/v1/reservations/{id}/reveal", post(reveal_destination))
        .route("/v1/payments/verify", post(verify_payment))
        .route_layer(middleware::from_fn_with_state(state, passenger_auth_middleware))
}

/// POST /v1/reservations
pub async fn create_reservation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    body: Result<Json<NewReservation>, JsonRejection>,
) -> Result<(StatusCode, Json<ReservationSummary>), AppError> {
    let request = json_body(body)?;
    let summary = state
        .engine
        .create_reservation(&claims.traveller(), request)
        .await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

/// GET /v1/reservations
pub async fn list_reservations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ReservationSummary>>, AppError> {
    Ok(Json(state.engine.user_reservations(claims.sub).await?))
}

/// GET /v1/reservations/{id}
pub async fn get_reservation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReservationSummary>, AppError> {
    Ok(Json(state.engine.reservation(id, claims.sub).await?))
}

/// POST /v1/reservations/{id}/cancel
pub async fn cancel_reservation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReservationSummary>, AppError> {
    Ok(Json(state.engine.cancel_reservation(id, claims.sub).await?))
}

/// POST /v1/reservations/{id}/reveal
pub async fn reveal_destination(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReservationSummary>, AppError> {
    Ok(Json(state.engine.reveal_destination(id, claims.sub).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    pub reservation_id: Uuid,
    pub outcome: PaymentOutcome,
}

/// POST /v1/payments/verify
pub async fn verify_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    body: Result<Json<VerifyPaymentRequest>, JsonRejection>,
) -> Result<Json<ReservationSummary>, AppError> {
    let request = json_body(body)?;
    let summary = state
        .engine
        .verify_payment(request.reservation_id, claims.sub, request.outcome)
        .await?;
    Ok(Json(summary))
}
