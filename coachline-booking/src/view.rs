use chrono::{DateTime, Utc};
use coachline_core::{
    Booking, PaymentMethod, PaymentStatus, ReservationStatus, Route, ScheduledTrip, Vehicle,
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{BookingError, BookingResult};
use crate::lifecycle::effective_status;

/// Shown in place of the destination city of an unrevealed surprise trip.
pub const MASKED_DESTINATION: &str = "unknown";

/// Destination as a passenger may see it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationView {
    pub city: String,
    pub distance_km: Option<f64>,
}

impl DestinationView {
    pub fn of(route: &Route, hidden: bool) -> Self {
        if hidden {
            return Self {
                city: MASKED_DESTINATION.to_string(),
                distance_km: None,
            };
        }
        Self {
            city: route.destination().unwrap_or(MASKED_DESTINATION).to_string(),
            distance_km: Some(route.distance_km),
        }
    }
}

/// Checks that a schedule carries the vehicle and route every booking path
/// needs.
pub(crate) fn populated(trip: &ScheduledTrip) -> BookingResult<(&Vehicle, &Route)> {
    let vehicle = trip
        .vehicle
        .as_ref()
        .ok_or_else(|| BookingError::DataIntegrity(format!("schedule {} has no bus", trip.id)))?;
    let route = trip
        .route
        .as_ref()
        .ok_or_else(|| BookingError::DataIntegrity(format!("schedule {} has no route", trip.id)))?;
    if route.origin().is_none() || route.destination().is_none() {
        return Err(BookingError::DataIntegrity(format!(
            "route {} needs at least two cities",
            route.id
        )));
    }
    Ok((vehicle, route))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripView {
    pub schedule_id: Uuid,
    pub origin: String,
    pub destination: String,
    pub distance_km: Option<f64>,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    pub bus_plate: String,
    pub carrier_name: String,
    pub price_cents: i64,
}

impl TripView {
    pub fn build(trip: &ScheduledTrip, destination_hidden: bool) -> BookingResult<Self> {
        let (vehicle, route) = populated(trip)?;
        let destination = DestinationView::of(route, destination_hidden);
        Ok(Self {
            schedule_id: trip.id,
            origin: route.origin().unwrap_or_default().to_string(),
            destination: destination.city,
            distance_km: destination.distance_km,
            departure_time: trip.departure_time,
            arrival_time: trip.arrival_time,
            bus_plate: vehicle.plate.clone(),
            carrier_name: route.carrier.name.clone(),
            price_cents: trip.price_cents,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentView {
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
}

/// A reservation as returned to its holder: booking result, ticket list
/// entry, and single-ticket view all use this shape.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationSummary {
    pub id: Uuid,
    pub status: ReservationStatus,
    pub seats: Vec<u32>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_surprise: bool,
    pub destination_revealed: bool,
    pub cancelled_by_carrier: bool,
    pub trip: TripView,
    pub payment: PaymentView,
    pub created_at: DateTime<Utc>,
}

impl ReservationSummary {
    pub fn build(booking: &Booking, trip: &ScheduledTrip, now: DateTime<Utc>) -> BookingResult<Self> {
        let reservation = &booking.reservation;
        let status = effective_status(booking, now);
        Ok(Self {
            id: reservation.id,
            status,
            seats: reservation.seats.clone(),
            expires_at: if status == ReservationStatus::Pending {
                reservation.expires_at
            } else {
                None
            },
            is_surprise: reservation.is_surprise,
            destination_revealed: reservation.destination_revealed,
            cancelled_by_carrier: reservation.cancelled_by_carrier,
            trip: TripView::build(trip, reservation.destination_hidden())?,
            payment: PaymentView {
                amount_cents: booking.payment.amount_cents,
                method: booking.payment.method,
                status: booking.payment.status,
            },
            created_at: reservation.created_at,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatState {
    pub seat_number: u32,
    pub is_available: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatAvailability {
    pub total_seats: usize,
    pub available_seats: usize,
    pub seats: Vec<SeatState>,
    pub trip: TripView,
}
