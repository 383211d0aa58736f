pub mod clock;
pub mod notify;
pub mod payment;
pub mod repository;
pub mod reservation;
pub mod trip;

pub use clock::{Clock, ManualClock, SystemClock};
pub use notify::{LogNotifier, Notifier, RecordingNotifier};
pub use payment::{PaymentMethod, PaymentOutcome, PaymentRecord, PaymentSignal, PaymentStatus};
pub use repository::{LedgerError, ReservationLedger, TripDirectory};
pub use reservation::{occupied_seats, is_conflicting, Booking, Reservation, ReservationStatus};
pub use trip::{Carrier, Route, ScheduledTrip, Seat, Traveller, Vehicle};

/// Boxed error returned by collaborator seams the booking core only reads from.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
