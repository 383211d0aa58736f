use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use coachline_booking::BookingError;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    ValidationError(String),
    Anyhow(anyhow::Error),
}

fn booking_status(err: &BookingError) -> StatusCode {
    match err {
        BookingError::NotFound(_) => StatusCode::NOT_FOUND,
        BookingError::AccessDenied => StatusCode::FORBIDDEN,
        BookingError::InvalidInput(_) | BookingError::InvalidSeat(_) => StatusCode::BAD_REQUEST,
        BookingError::SeatConflict(_)
        | BookingError::AlreadyCancelled
        | BookingError::AlreadyRevealed
        | BookingError::ReservationClosed(_)
        | BookingError::InvalidTransition { .. } => StatusCode::CONFLICT,
        BookingError::PastDeparture
        | BookingError::TooLateToCancel { .. }
        | BookingError::NotYetRevealable { .. }
        | BookingError::NotASurpriseTrip
        | BookingError::HoldExpired => StatusCode::UNPROCESSABLE_ENTITY,
        BookingError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
        BookingError::DataIntegrity(_) | BookingError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, code) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg, "UNAUTHENTICATED"),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg, "INVALID_INPUT"),
            AppError::Anyhow(err) => match err.downcast_ref::<BookingError>() {
                Some(booking) => {
                    let status = booking_status(booking);
                    if status == StatusCode::INTERNAL_SERVER_ERROR {
                        tracing::error!("Internal Server Error: {}", booking);
                        (status, "Internal Server Error".to_string(), booking.code())
                    } else {
                        (status, booking.to_string(), booking.code())
                    }
                }
                None => {
                    tracing::error!("Internal Server Error: {}", err);
                    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string(), "INTERNAL")
                }
            },
        };

        let body = Json(json!({
            "error": error_message,
            "code": code,
        }));

        (status, body).into_response()
    }
}

/// Unwraps a JSON request body. Malformed bodies become `INVALID_INPUT`
/// instead of axum's plain-text rejection.
pub fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| AppError::ValidationError(rejection.body_text()))
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Anyhow(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booking_errors_map_to_http_status() {
        let cases = [
            (BookingError::SeatConflict(vec![14]), StatusCode::CONFLICT),
            (BookingError::TooLateToCancel { cutoff_hours: 2.0 }, StatusCode::UNPROCESSABLE_ENTITY),
            (BookingError::Transient("lock".into()), StatusCode::SERVICE_UNAVAILABLE),
            (BookingError::AccessDenied, StatusCode::FORBIDDEN),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).into_response().status(), status);
        }
    }
}
