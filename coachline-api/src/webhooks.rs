use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use coachline_booking::BookingError;
use coachline_core::{PaymentOutcome, PaymentSignal};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{json_body, AppError};
use crate::state::AppState;

pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/webhooks/payments", post(handle_payment_webhook))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentWebhook {
    pub reservation_id: Uuid,
    /// `succeeded`, `failed`, `expired` or `canceled`.
    pub status: String,
}

/// POST /v1/webhooks/payments
/// Receive payment status updates from the payment provider
pub async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<PaymentWebhook>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let secret = headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();
    if secret.is_empty() || secret != state.webhook_secret {
        return Err(AppError::AuthenticationError("Invalid webhook secret".to_string()));
    }
    let payload = json_body(body)?;

    let outcome: PaymentOutcome = payload
        .status
        .parse()
        .map_err(AppError::ValidationError)?;

    tracing::info!(reservation_id = %payload.reservation_id, status = %payload.status, "Received payment webhook");

    let signal = PaymentSignal {
        reservation_id: payload.reservation_id,
        outcome,
    };
    match state.engine.apply_payment_signal(signal).await {
        Ok(booking) => Ok(Json(json!({
            "reservationId": booking.reservation.id,
            "status": booking.reservation.status,
            "paymentStatus": booking.payment.status,
        }))),
        // Acknowledged so the provider stops retrying; the payment is already
        // marked for refund.
        Err(BookingError::HoldExpired) => Ok(Json(json!({
            "reservationId": payload.reservation_id,
            "status": "expired",
            "paymentStatus": "refunded",
        }))),
        Err(e) => Err(e.into()),
    }
}
