use std::sync::Arc;

use coachline_core::{Booking, Notifier, ScheduledTrip};
use coachline_shared::models::notifications::{Notification, TicketPayload};

use crate::error::BookingResult;
use crate::view::{populated, DestinationView};

/// Hands notifications to the configured `Notifier` on a background task.
///
/// Delivery never blocks or fails the operation that produced the
/// notification; errors are only logged.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    pub fn send(&self, notification: Notification) {
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            let kind = notification.kind();
            let reservation_id = notification.ticket().reservation_id;
            if let Err(e) = notifier.dispatch(notification).await {
                tracing::warn!(
                    kind,
                    %reservation_id,
                    error = %e,
                    "Failed to deliver notification"
                );
            }
        });
    }
}

/// Ticket details for an e-mail about `booking`, with the destination masked
/// unless `reveal_destination` is set or the holder may already see it.
pub fn ticket_payload(
    booking: &Booking,
    trip: &ScheduledTrip,
    reveal_destination: bool,
) -> BookingResult<TicketPayload> {
    let (vehicle, route) = populated(trip)?;
    let hidden = booking.reservation.destination_hidden() && !reveal_destination;
    let destination = DestinationView::of(route, hidden);
    Ok(TicketPayload {
        reservation_id: booking.reservation.id,
        origin: route.origin().unwrap_or_default().to_string(),
        destination: destination.city,
        distance_km: destination.distance_km,
        departure_time: trip.departure_time,
        arrival_time: trip.arrival_time,
        bus_plate: vehicle.plate.clone(),
        carrier_name: route.carrier.name.clone(),
        seats: booking.reservation.seats.clone(),
        amount_cents: booking.payment.amount_cents,
    })
}
