use chrono::{DateTime, Utc};
use coachline_core::{is_conflicting, Booking, PaymentStatus, ReservationStatus, ScheduledTrip};
use coachline_shared::models::notifications::Notification;
use serde::Serialize;
use uuid::Uuid;

use crate::engine::BookingEngine;
use crate::error::{BookingError, BookingResult};
use crate::lifecycle::{apply, Transition};
use crate::policy::hours;
use crate::view::ReservationSummary;

/// Outcome of a carrier cancelling a whole schedule.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CarrierCancellation {
    pub schedule_id: Uuid,
    pub cancelled: Vec<Uuid>,
    pub failed: Vec<Uuid>,
}

/// Money returned by cancelling `before`. Holds that were never paid refund
/// nothing.
fn refund_cents(before: &Booking) -> i64 {
    if before.payment.status == PaymentStatus::Successful {
        before.payment.amount_cents
    } else {
        0
    }
}

impl BookingEngine {
    /// Passenger cancellation, allowed until the cut-off before departure.
    pub async fn cancel_reservation(&self, id: Uuid, user_id: Uuid) -> BookingResult<ReservationSummary> {
        let booking = self.owned_booking(id, user_id).await?;
        let trip = self.load_trip(booking.reservation.trip_id).await?;
        let cutoff = self.policy.cancellation_cutoff;

        let mut before = booking;
        let cancelled = self
            .update_with_retry(id, |current, now| {
                if current.reservation.status == ReservationStatus::Cancelled {
                    return Err(BookingError::AlreadyCancelled);
                }
                if trip.time_until_departure(now) < cutoff {
                    return Err(BookingError::TooLateToCancel {
                        cutoff_hours: hours(cutoff),
                    });
                }
                before = current.clone();
                apply(current, Transition::Cancel { by_carrier: false }, now).map(Some)
            })
            .await?;

        tracing::info!(reservation_id = %id, trip_id = %trip.id, "Reservation cancelled by passenger");

        let refund = refund_cents(&before);
        self.notify(&cancelled, &trip, |recipient, recipient_name, ticket| {
            Notification::Cancellation {
                recipient,
                recipient_name,
                ticket,
                refund_cents: refund,
            }
        });

        ReservationSummary::build(&cancelled, &trip, self.clock.now())
    }

    /// Cancels every reservation holding seats on a schedule the carrier is
    /// withdrawing. No cut-off applies. A reservation that cannot be
    /// cancelled is logged and reported; the rest are still processed.
    pub async fn cancel_schedule_by_carrier(
        &self,
        trip_id: Uuid,
        carrier_id: Uuid,
    ) -> BookingResult<CarrierCancellation> {
        let trip = self.carrier_trip(trip_id, carrier_id).await?;
        let now = self.clock.now();
        let affected: Vec<Booking> = self
            .ledger
            .list_for_trip(trip_id)
            .await?
            .into_iter()
            .filter(|b| is_conflicting(&b.reservation, now))
            .collect();

        let mut report = CarrierCancellation {
            schedule_id: trip_id,
            ..Default::default()
        };

        for booking in affected {
            let id = booking.reservation.id;
            let mut before = booking;
            let result = self
                .update_with_retry(id, |current, now| {
                    before = current.clone();
                    apply(current, Transition::Cancel { by_carrier: true }, now).map(Some)
                })
                .await;

            match result {
                Ok(cancelled) => {
                    let refund = refund_cents(&before);
                    self.notify(&cancelled, &trip, |recipient, recipient_name, ticket| {
                        Notification::CancellationByCarrier {
                            recipient,
                            recipient_name,
                            ticket,
                            refund_cents: refund,
                        }
                    });
                    report.cancelled.push(id);
                }
                Err(e) => {
                    tracing::error!(reservation_id = %id, error = %e, "Failed to cancel reservation for withdrawn schedule");
                    report.failed.push(id);
                }
            }
        }

        tracing::info!(
            %trip_id,
            cancelled = report.cancelled.len(),
            failed = report.failed.len(),
            "Schedule cancelled by carrier"
        );
        Ok(report)
    }

    /// Tells every passenger holding seats that the schedule's times moved.
    /// The directory already carries the new times. Returns the number of
    /// passengers notified.
    pub async fn announce_schedule_change(
        &self,
        trip_id: Uuid,
        carrier_id: Uuid,
        previous_departure_time: DateTime<Utc>,
        previous_arrival_time: DateTime<Utc>,
    ) -> BookingResult<usize> {
        let trip = self.carrier_trip(trip_id, carrier_id).await?;
        let now = self.clock.now();

        let mut notified = 0;
        for booking in self.ledger.list_for_trip(trip_id).await? {
            if !is_conflicting(&booking.reservation, now) {
                continue;
            }
            self.notify(&booking, &trip, |recipient, recipient_name, ticket| {
                Notification::ScheduleChange {
                    recipient,
                    recipient_name,
                    ticket,
                    previous_departure_time,
                    previous_arrival_time,
                }
            });
            notified += 1;
        }

        tracing::info!(%trip_id, notified, "Schedule change announced");
        Ok(notified)
    }

    async fn carrier_trip(&self, trip_id: Uuid, carrier_id: Uuid) -> BookingResult<ScheduledTrip> {
        let trip = self.load_trip(trip_id).await?;
        if !trip.is_operated_by(carrier_id) {
            return Err(BookingError::AccessDenied);
        }
        Ok(trip)
    }
}
