use coachline_core::{LedgerError, ReservationStatus};

/// Every way a booking operation can be refused. Each variant renders a
/// message that can be shown to the passenger as-is.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("You do not have access to this reservation")]
    AccessDenied,

    #[error("Invalid request: {0}")]
    InvalidInput(String),

    #[error("This trip has already departed")]
    PastDeparture,

    #[error("Seats {0:?} do not exist on this bus")]
    InvalidSeat(Vec<u32>),

    #[error("Some of the selected seats are already booked")]
    SeatConflict(Vec<u32>),

    #[error("This reservation is already cancelled")]
    AlreadyCancelled,

    #[error("Reservations can only be cancelled at least {cutoff_hours} hours before departure")]
    TooLateToCancel { cutoff_hours: f64 },

    #[error("The destination can be revealed only within {window_hours} hours of departure")]
    NotYetRevealable { window_hours: f64 },

    #[error("The destination has already been revealed")]
    AlreadyRevealed,

    #[error("This reservation is not a surprise trip")]
    NotASurpriseTrip,

    #[error("This reservation is {0}")]
    ReservationClosed(ReservationStatus),

    #[error("The payment window for this reservation has closed; the payment will be refunded")]
    HoldExpired,

    #[error("Reservation cannot move from {from} to {to}")]
    InvalidTransition {
        from: ReservationStatus,
        to: ReservationStatus,
    },

    #[error("Scheduled trip data is incomplete: {0}")]
    DataIntegrity(String),

    #[error("The booking system is busy, please retry: {0}")]
    Transient(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BookingError {
    /// Stable machine-readable identifier for API clients.
    pub fn code(&self) -> &'static str {
        match self {
            BookingError::NotFound(_) => "NOT_FOUND",
            BookingError::AccessDenied => "ACCESS_DENIED",
            BookingError::InvalidInput(_) => "INVALID_INPUT",
            BookingError::PastDeparture => "PAST_DEPARTURE",
            BookingError::InvalidSeat(_) => "INVALID_SEAT",
            BookingError::SeatConflict(_) => "SEAT_CONFLICT",
            BookingError::AlreadyCancelled => "ALREADY_CANCELLED",
            BookingError::TooLateToCancel { .. } => "TOO_LATE_TO_CANCEL",
            BookingError::NotYetRevealable { .. } => "NOT_YET_REVEALABLE",
            BookingError::AlreadyRevealed => "ALREADY_REVEALED",
            BookingError::NotASurpriseTrip => "NOT_A_SURPRISE_TRIP",
            BookingError::ReservationClosed(_) => "RESERVATION_CLOSED",
            BookingError::HoldExpired => "HOLD_EXPIRED",
            BookingError::InvalidTransition { .. } => "INVALID_TRANSITION",
            BookingError::DataIntegrity(_) => "DATA_INTEGRITY",
            BookingError::Transient(_) => "TRANSIENT",
            BookingError::Internal(_) => "INTERNAL",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, BookingError::Transient(_))
    }
}

impl From<LedgerError> for BookingError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound(id) => BookingError::NotFound(format!("Reservation {}", id)),
            LedgerError::SeatTaken(seats) => BookingError::SeatConflict(seats),
            LedgerError::StaleVersion(_) | LedgerError::LockTimeout(_) => {
                BookingError::Transient(err.to_string())
            }
            LedgerError::Backend(msg) => BookingError::Internal(msg),
        }
    }
}

pub type BookingResult<T> = Result<T, BookingError>;
