pub mod cancellation;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod expiry;
pub mod lifecycle;
pub mod memory;
pub mod payment;
pub mod policy;
pub mod reveal;
pub mod view;

#[cfg(test)]
mod fixtures;

pub use cancellation::CarrierCancellation;
pub use dispatch::NotificationDispatcher;
pub use engine::{BookingEngine, NewReservation};
pub use error::{BookingError, BookingResult};
pub use expiry::SweepReport;
pub use memory::{InMemoryLedger, InMemoryTripDirectory};
pub use policy::BookingPolicy;
pub use view::{
    ReservationSummary, SeatAvailability, SeatState, TripView, MASKED_DESTINATION,
};
