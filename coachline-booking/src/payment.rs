use coachline_core::{
    Booking, PaymentOutcome, PaymentSignal, PaymentStatus, ReservationStatus,
};
use uuid::Uuid;

use crate::engine::BookingEngine;
use crate::error::{BookingError, BookingResult};
use crate::lifecycle::{apply, refund_payment, Transition};
use crate::view::ReservationSummary;

fn transition_for(outcome: PaymentOutcome) -> Transition {
    match outcome {
        PaymentOutcome::Succeeded => Transition::Confirm,
        PaymentOutcome::Failed | PaymentOutcome::Canceled => Transition::Fail,
        PaymentOutcome::Expired => Transition::Expire,
    }
}

/// Whether `booking` already reflects `outcome`, so a repeated signal can be
/// acknowledged without a write.
fn already_applied(booking: &Booking, outcome: PaymentOutcome) -> bool {
    let status = booking.reservation.status;
    match outcome {
        PaymentOutcome::Succeeded => matches!(
            status,
            ReservationStatus::Confirmed | ReservationStatus::Completed | ReservationStatus::Cancelled
        ),
        PaymentOutcome::Failed | PaymentOutcome::Canceled => status == ReservationStatus::Failed,
        PaymentOutcome::Expired => status == ReservationStatus::Expired,
    }
}

impl BookingEngine {
    /// Moves a reservation and its payment in one write according to the
    /// provider's verdict.
    ///
    /// Money that arrives for a hold that already lapsed does not confirm it:
    /// the reservation ends `expired`, the payment `refunded`, and the caller
    /// gets `HoldExpired`. Money for a reservation that already failed is
    /// marked refunded and the failed booking is returned.
    pub async fn apply_payment_signal(&self, signal: PaymentSignal) -> BookingResult<Booking> {
        let PaymentSignal {
            reservation_id,
            outcome,
        } = signal;

        let mut late = false;
        let mut after_failure = false;
        let booking = self
            .update_with_retry(reservation_id, |current, now| {
                late = false;
                after_failure = false;
                if outcome == PaymentOutcome::Succeeded {
                    if current.reservation.hold_lapsed(now) {
                        late = true;
                        return apply(current, Transition::RefundLapsedHold, now).map(Some);
                    }
                    if current.reservation.status == ReservationStatus::Expired {
                        late = true;
                        if current.payment.status == PaymentStatus::Refunded {
                            return Ok(None);
                        }
                        return Ok(Some(refund_payment(current, now)));
                    }
                    if current.reservation.status == ReservationStatus::Failed {
                        after_failure = true;
                        if current.payment.status == PaymentStatus::Refunded {
                            return Ok(None);
                        }
                        return Ok(Some(refund_payment(current, now)));
                    }
                }
                if already_applied(current, outcome) {
                    return Ok(None);
                }
                apply(current, transition_for(outcome), now).map(Some)
            })
            .await?;

        if late {
            tracing::warn!(%reservation_id, "Payment arrived after the hold lapsed; marked for refund");
            return Err(BookingError::HoldExpired);
        }
        if after_failure {
            tracing::warn!(%reservation_id, "Payment succeeded for a failed reservation; marked for refund");
            return Ok(booking);
        }

        tracing::info!(
            %reservation_id,
            ?outcome,
            status = %booking.reservation.status,
            payment_status = booking.payment.status.as_str(),
            "Payment signal applied"
        );
        Ok(booking)
    }

    /// Client-side confirmation of a payment the holder just completed.
    pub async fn verify_payment(
        &self,
        id: Uuid,
        user_id: Uuid,
        outcome: PaymentOutcome,
    ) -> BookingResult<ReservationSummary> {
        let booking = self.owned_booking(id, user_id).await?;
        let trip = self.load_trip(booking.reservation.trip_id).await?;
        let updated = self
            .apply_payment_signal(PaymentSignal {
                reservation_id: id,
                outcome,
            })
            .await?;
        ReservationSummary::build(&updated, &trip, self.clock.now())
    }
}
