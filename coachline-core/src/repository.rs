use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::reservation::Booking;
use crate::trip::{ScheduledTrip, Seat};
use crate::BoxError;

/// Read access to carrier-managed schedules and seat inventory.
#[async_trait]
pub trait TripDirectory: Send + Sync {
    async fn scheduled_trip(&self, id: Uuid) -> Result<Option<ScheduledTrip>, BoxError>;

    async fn vehicle_seats(&self, vehicle_id: Uuid) -> Result<Vec<Seat>, BoxError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Reservation not found: {0}")]
    NotFound(Uuid),

    #[error("Seats already held: {0:?}")]
    SeatTaken(Vec<u32>),

    #[error("Reservation {0} was modified concurrently")]
    StaleVersion(Uuid),

    #[error("Timed out waiting for the booking lock of trip {0}")]
    LockTimeout(Uuid),

    #[error("Ledger backend failure: {0}")]
    Backend(String),
}

/// The reservation ledger: source of truth for seat occupancy.
///
/// Implementations serialise every write per scheduled trip, so that checking
/// occupancy and storing the result is one atomic unit.
#[async_trait]
pub trait ReservationLedger: Send + Sync {
    /// Stores a new booking (reservation and payment together) unless one of
    /// its seats is held by an occupying reservation of the same trip at `now`.
    async fn insert(&self, booking: &Booking, now: DateTime<Utc>) -> Result<(), LedgerError>;

    /// Replaces a stored booking if its stored version is still
    /// `expected_version`. When the new state occupies seats the occupancy
    /// check of `insert` is repeated against the other reservations.
    async fn update(
        &self,
        booking: &Booking,
        expected_version: i64,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError>;

    async fn get(&self, id: Uuid) -> Result<Option<Booking>, LedgerError>;

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Booking>, LedgerError>;

    async fn list_for_trip(&self, trip_id: Uuid) -> Result<Vec<Booking>, LedgerError>;

    /// Every booking still `pending` or `confirmed`.
    async fn list_open(&self) -> Result<Vec<Booking>, LedgerError>;
}
