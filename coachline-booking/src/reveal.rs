use coachline_core::ReservationStatus;
use uuid::Uuid;

use crate::engine::BookingEngine;
use crate::error::{BookingError, BookingResult};
use crate::lifecycle::{effective_status, reveal};
use crate::policy::hours;
use crate::view::ReservationSummary;

impl BookingEngine {
    /// Shows the holder of a surprise reservation where the trip goes, once
    /// departure is within the reveal window.
    pub async fn reveal_destination(&self, id: Uuid, user_id: Uuid) -> BookingResult<ReservationSummary> {
        let booking = self.owned_booking(id, user_id).await?;
        let trip = self.load_trip(booking.reservation.trip_id).await?;
        let window = self.policy.reveal_window;

        let revealed = self
            .update_with_retry(id, |current, now| {
                if !current.reservation.is_surprise {
                    return Err(BookingError::NotASurpriseTrip);
                }
                if current.reservation.destination_revealed {
                    return Err(BookingError::AlreadyRevealed);
                }
                match effective_status(current, now) {
                    status @ (ReservationStatus::Cancelled
                    | ReservationStatus::Failed
                    | ReservationStatus::Expired) => {
                        return Err(BookingError::ReservationClosed(status));
                    }
                    _ => {}
                }
                if trip.time_until_departure(now) > window {
                    return Err(BookingError::NotYetRevealable {
                        window_hours: hours(window),
                    });
                }
                reveal(current, now).map(Some)
            })
            .await?;

        tracing::info!(reservation_id = %id, "Surprise destination revealed");
        ReservationSummary::build(&revealed, &trip, self.clock.now())
    }
}
