use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use coachline_core::{Booking, ReservationStatus, ScheduledTrip};
use coachline_shared::models::notifications::Notification;
use serde::Serialize;
use uuid::Uuid;

use crate::engine::BookingEngine;
use crate::error::BookingResult;
use crate::lifecycle::{apply, mark_reminded, Transition};

/// What one sweep pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired: usize,
    pub completed: usize,
    pub reminded: usize,
    pub failures: usize,
}

/// A surprise reservation is due for its reminder the first time departure
/// is at most `lead` away, as long as the trip has not left.
fn reminder_due(booking: &Booking, trip: &ScheduledTrip, lead: Duration, now: DateTime<Utc>) -> bool {
    let r = &booking.reservation;
    let remaining = trip.time_until_departure(now);
    r.status == ReservationStatus::Confirmed
        && r.is_surprise
        && !r.reminder_email_sent
        && remaining > Duration::zero()
        && remaining <= lead
}

enum Swept {
    Expired,
    Completed,
    Reminded,
    Untouched,
}

impl BookingEngine {
    /// One pass of the background housekeeping.
    ///
    /// Seat availability never depends on this: lapsed holds are already
    /// ignored by every occupancy check. The pass only brings stored statuses
    /// up to date and sends surprise reminders. A failing reservation is
    /// logged and counted; the pass carries on.
    pub async fn sweep(&self) -> BookingResult<SweepReport> {
        let open = self.ledger.list_open().await?;
        let mut trips: HashMap<Uuid, ScheduledTrip> = HashMap::new();
        let mut report = SweepReport::default();

        for booking in open {
            let id = booking.reservation.id;
            match self.sweep_one(booking, &mut trips).await {
                Ok(Swept::Expired) => report.expired += 1,
                Ok(Swept::Completed) => report.completed += 1,
                Ok(Swept::Reminded) => report.reminded += 1,
                Ok(Swept::Untouched) => {}
                Err(e) => {
                    tracing::warn!(reservation_id = %id, error = %e, "Sweep failed for reservation");
                    report.failures += 1;
                }
            }
        }

        if report != SweepReport::default() {
            tracing::info!(?report, "Sweep finished");
        }
        Ok(report)
    }

    async fn sweep_one(
        &self,
        booking: Booking,
        trips: &mut HashMap<Uuid, ScheduledTrip>,
    ) -> BookingResult<Swept> {
        let id = booking.reservation.id;

        if booking.reservation.hold_lapsed(self.clock.now()) {
            let mut changed = false;
            self.update_with_retry(id, |current, now| {
                changed = false;
                if !current.reservation.hold_lapsed(now) {
                    return Ok(None);
                }
                changed = true;
                apply(current, Transition::Expire, now).map(Some)
            })
            .await?;
            return Ok(if changed { Swept::Expired } else { Swept::Untouched });
        }

        if booking.reservation.status != ReservationStatus::Confirmed {
            return Ok(Swept::Untouched);
        }

        let trip_id = booking.reservation.trip_id;
        let trip = match trips.get(&trip_id) {
            Some(trip) => trip.clone(),
            None => {
                let trip = self.load_trip(trip_id).await?;
                trips.insert(trip_id, trip.clone());
                trip
            }
        };

        let now = self.clock.now();
        if trip.has_arrived(now) {
            let mut changed = false;
            self.update_with_retry(id, |current, now| {
                changed = false;
                if current.reservation.status != ReservationStatus::Confirmed {
                    return Ok(None);
                }
                changed = true;
                apply(current, Transition::Complete, now).map(Some)
            })
            .await?;
            return Ok(if changed { Swept::Completed } else { Swept::Untouched });
        }

        let lead = self.policy.reminder_lead;
        if !reminder_due(&booking, &trip, lead, now) {
            return Ok(Swept::Untouched);
        }

        // Flags are written before the e-mail goes out, so a reminder is sent
        // at most once even if delivery fails.
        let mut changed = false;
        let reminded = self
            .update_with_retry(id, |current, now| {
                changed = false;
                if !reminder_due(current, &trip, lead, now) {
                    return Ok(None);
                }
                changed = true;
                Ok(Some(mark_reminded(current, now)))
            })
            .await?;
        if !changed {
            return Ok(Swept::Untouched);
        }

        self.notify(&reminded, &trip, |recipient, recipient_name, ticket| {
            Notification::SurpriseReminder {
                recipient,
                recipient_name,
                ticket,
            }
        });
        tracing::info!(reservation_id = %id, "Surprise reminder sent");
        Ok(Swept::Reminded)
    }
}
