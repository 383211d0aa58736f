use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use coachline_core::{
    occupied_seats, Booking, Clock, LedgerError, PaymentMethod, PaymentRecord, Reservation,
    ReservationLedger, ScheduledTrip, Traveller, TripDirectory,
};
use coachline_shared::models::notifications::{Notification, TicketPayload};
use coachline_shared::Masked;
use serde::Deserialize;
use uuid::Uuid;

use crate::dispatch::{ticket_payload, NotificationDispatcher};
use crate::error::{BookingError, BookingResult};
use crate::policy::BookingPolicy;
use crate::view::{populated, ReservationSummary, SeatAvailability, SeatState, TripView};

const MAX_WRITE_ATTEMPTS: usize = 3;

/// A passenger's booking request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReservation {
    pub schedule_id: Uuid,
    pub seat_numbers: Vec<u32>,
    #[serde(default)]
    pub is_surprise: bool,
    #[serde(default)]
    pub payment_method: PaymentMethod,
}

/// Entry point for every operation that reads or changes reservations.
///
/// Seat occupancy is decided by the ledger under its per-trip lock; the engine
/// validates requests, drives the state machine and emits notifications.
#[derive(Clone)]
pub struct BookingEngine {
    pub(crate) trips: Arc<dyn TripDirectory>,
    pub(crate) ledger: Arc<dyn ReservationLedger>,
    pub(crate) notifications: NotificationDispatcher,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) policy: BookingPolicy,
}

impl BookingEngine {
    pub fn new(
        trips: Arc<dyn TripDirectory>,
        ledger: Arc<dyn ReservationLedger>,
        notifications: NotificationDispatcher,
        clock: Arc<dyn Clock>,
        policy: BookingPolicy,
    ) -> Self {
        Self {
            trips,
            ledger,
            notifications,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &BookingPolicy {
        &self.policy
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Holds the requested seats for `traveller` as a pending reservation
    /// with a pending payment.
    pub async fn create_reservation(
        &self,
        traveller: &Traveller,
        request: NewReservation,
    ) -> BookingResult<ReservationSummary> {
        let seats = validate_seat_numbers(&request.seat_numbers)?;

        let trip = self.load_trip(request.schedule_id).await?;
        let (vehicle, _) = populated(&trip)?;

        let now = self.clock.now();
        if trip.has_departed(now) {
            return Err(BookingError::PastDeparture);
        }

        let existing: BTreeSet<u32> = self
            .trips
            .vehicle_seats(vehicle.id)
            .await
            .map_err(|e| BookingError::Internal(e.to_string()))?
            .into_iter()
            .map(|seat| seat.number)
            .collect();
        let unknown: Vec<u32> = seats.iter().copied().filter(|n| !existing.contains(n)).collect();
        if !unknown.is_empty() {
            return Err(BookingError::InvalidSeat(unknown));
        }

        let amount_cents = trip
            .price_cents
            .checked_mul(seats.len() as i64)
            .ok_or_else(|| BookingError::InvalidInput("Total price is out of range".to_string()))?;

        let reservation = Reservation::pending(
            traveller,
            trip.id,
            seats,
            request.is_surprise,
            now,
            self.policy.hold_window,
        );
        let payment =
            PaymentRecord::pending(reservation.id, amount_cents, request.payment_method, now);
        let booking = Booking {
            reservation,
            payment,
        };

        if let Err(e) = self.ledger.insert(&booking, now).await {
            if let LedgerError::SeatTaken(ref taken) = e {
                tracing::info!(trip_id = %trip.id, seats = ?taken, "Seat conflict");
            }
            return Err(e.into());
        }

        tracing::info!(
            reservation_id = %booking.reservation.id,
            trip_id = %trip.id,
            seats = ?booking.reservation.seats,
            amount_cents,
            "Reservation created"
        );

        let expires_at = booking.reservation.expires_at;
        self.notify(&booking, &trip, |recipient, recipient_name, ticket| {
            Notification::BookingConfirmation {
                recipient,
                recipient_name,
                ticket,
                expires_at,
            }
        });

        ReservationSummary::build(&booking, &trip, now)
    }

    /// Seat map of a schedule. With `surprise` set the trip summary hides the
    /// destination, as it would for a surprise booking.
    pub async fn available_seats(
        &self,
        trip_id: Uuid,
        surprise: bool,
    ) -> BookingResult<SeatAvailability> {
        let trip = self.load_trip(trip_id).await?;
        let (vehicle, _) = populated(&trip)?;

        let mut numbers: Vec<u32> = self
            .trips
            .vehicle_seats(vehicle.id)
            .await
            .map_err(|e| BookingError::Internal(e.to_string()))?
            .into_iter()
            .map(|seat| seat.number)
            .collect();
        numbers.sort_unstable();

        let now = self.clock.now();
        let bookings = self.ledger.list_for_trip(trip_id).await?;
        let occupied = occupied_seats(bookings.iter().map(|b| &b.reservation), now);

        let seats: Vec<SeatState> = numbers
            .into_iter()
            .map(|seat_number| SeatState {
                seat_number,
                is_available: !occupied.contains(&seat_number),
            })
            .collect();

        Ok(SeatAvailability {
            total_seats: seats.len(),
            available_seats: seats.iter().filter(|s| s.is_available).count(),
            seats,
            trip: TripView::build(&trip, surprise)?,
        })
    }

    pub async fn reservation(&self, id: Uuid, user_id: Uuid) -> BookingResult<ReservationSummary> {
        let booking = self.owned_booking(id, user_id).await?;
        let trip = self.load_trip(booking.reservation.trip_id).await?;
        ReservationSummary::build(&booking, &trip, self.clock.now())
    }

    /// Every reservation of a user, newest first. Reservations whose schedule
    /// can no longer be loaded are left out.
    pub async fn user_reservations(&self, user_id: Uuid) -> BookingResult<Vec<ReservationSummary>> {
        let bookings = self.ledger.list_for_user(user_id).await?;
        let now = self.clock.now();

        let mut trips: HashMap<Uuid, Option<ScheduledTrip>> = HashMap::new();
        let mut summaries = Vec::with_capacity(bookings.len());
        for booking in &bookings {
            let trip_id = booking.reservation.trip_id;
            if !trips.contains_key(&trip_id) {
                let trip = match self.load_trip(trip_id).await {
                    Ok(trip) => Some(trip),
                    Err(e) => {
                        tracing::warn!(%trip_id, error = %e, "Skipping reservations of unavailable schedule");
                        None
                    }
                };
                trips.insert(trip_id, trip);
            }
            if let Some(Some(trip)) = trips.get(&trip_id) {
                summaries.push(ReservationSummary::build(booking, trip, now)?);
            }
        }
        Ok(summaries)
    }

    /// Loads a schedule and checks it has the vehicle and route bookings need.
    pub(crate) async fn load_trip(&self, trip_id: Uuid) -> BookingResult<ScheduledTrip> {
        let trip = self
            .trips
            .scheduled_trip(trip_id)
            .await
            .map_err(|e| BookingError::Internal(e.to_string()))?
            .ok_or_else(|| BookingError::NotFound("Scheduled trip".to_string()))?;
        populated(&trip)?;
        Ok(trip)
    }

    pub(crate) async fn owned_booking(&self, id: Uuid, user_id: Uuid) -> BookingResult<Booking> {
        let booking = self
            .ledger
            .get(id)
            .await?
            .ok_or_else(|| BookingError::NotFound("Reservation".to_string()))?;
        if booking.reservation.user_id != user_id {
            return Err(BookingError::AccessDenied);
        }
        Ok(booking)
    }

    /// Builds the ticket for `booking` and queues the notification made by
    /// `build`. The destination stays masked for unrevealed surprise trips.
    pub(crate) fn notify<F>(&self, booking: &Booking, trip: &ScheduledTrip, build: F)
    where
        F: FnOnce(Masked<String>, String, TicketPayload) -> Notification,
    {
        match ticket_payload(booking, trip, false) {
            Ok(ticket) => self.notifications.send(build(
                booking.reservation.contact_email.clone(),
                booking.reservation.contact_name.clone(),
                ticket,
            )),
            Err(e) => tracing::warn!(reservation_id = %booking.reservation.id, error = %e, "Skipping notification"),
        }
    }

    /// Reads a booking, lets `step` compute its next state and writes it back
    /// if nobody changed it in between. `Ok(None)` from `step` leaves the
    /// booking untouched. Concurrent writers cause a re-read, up to
    /// `MAX_WRITE_ATTEMPTS` times.
    pub(crate) async fn update_with_retry<F>(&self, id: Uuid, mut step: F) -> BookingResult<Booking>
    where
        F: FnMut(&Booking, DateTime<Utc>) -> BookingResult<Option<Booking>>,
    {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let current = self
                .ledger
                .get(id)
                .await?
                .ok_or_else(|| BookingError::NotFound("Reservation".to_string()))?;
            let now = self.clock.now();

            let next = match step(&current, now)? {
                Some(next) => next,
                None => return Ok(current),
            };

            match self.ledger.update(&next, current.reservation.version, now).await {
                Ok(()) => return Ok(next),
                Err(LedgerError::StaleVersion(_)) => {
                    tracing::debug!(reservation_id = %id, attempt, "Concurrent update, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(BookingError::Transient(format!(
            "reservation {} is being updated concurrently",
            id
        )))
    }
}

/// Seat lists must be non-empty, positive and free of duplicates. Order is
/// kept as requested.
fn validate_seat_numbers(seat_numbers: &[u32]) -> BookingResult<Vec<u32>> {
    if seat_numbers.is_empty() {
        return Err(BookingError::InvalidInput("At least one seat is required".to_string()));
    }
    if seat_numbers.contains(&0) {
        return Err(BookingError::InvalidInput("Seat numbers start at 1".to_string()));
    }
    let mut seen = BTreeSet::new();
    if let Some(duplicate) = seat_numbers.iter().find(|n| !seen.insert(**n)) {
        return Err(BookingError::InvalidInput(format!("Seat {} is listed twice", duplicate)));
    }
    Ok(seat_numbers.to_vec())
}
