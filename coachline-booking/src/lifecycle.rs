use chrono::{DateTime, Utc};
use coachline_core::{Booking, PaymentStatus, ReservationStatus};

use crate::error::{BookingError, BookingResult};

/// A status change of a reservation, applied together with the matching
/// payment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Payment succeeded: pending → confirmed, payment successful.
    Confirm,
    /// Payment failed or was abandoned: pending → failed, payment failed.
    Fail,
    /// Hold deadline passed unpaid: pending → expired, payment failed.
    Expire,
    /// Money arrived after the hold lapsed: pending → expired, payment refunded.
    RefundLapsedHold,
    /// Passenger or carrier cancellation: pending|confirmed → cancelled,
    /// payment refunded.
    Cancel { by_carrier: bool },
    /// The trip has arrived: confirmed → completed.
    Complete,
}

impl Transition {
    pub fn target(&self) -> ReservationStatus {
        match self {
            Transition::Confirm => ReservationStatus::Confirmed,
            Transition::Fail => ReservationStatus::Failed,
            Transition::Expire | Transition::RefundLapsedHold => ReservationStatus::Expired,
            Transition::Cancel { .. } => ReservationStatus::Cancelled,
            Transition::Complete => ReservationStatus::Completed,
        }
    }

    fn payment_status(&self) -> Option<PaymentStatus> {
        match self {
            Transition::Confirm => Some(PaymentStatus::Successful),
            Transition::Fail | Transition::Expire => Some(PaymentStatus::Failed),
            Transition::RefundLapsedHold | Transition::Cancel { .. } => Some(PaymentStatus::Refunded),
            Transition::Complete => None,
        }
    }
}

/// Whether the state machine has an edge `from → to`.
pub fn can_transition(from: ReservationStatus, to: ReservationStatus) -> bool {
    use ReservationStatus::*;
    matches!(
        (from, to),
        (Pending, Confirmed)
            | (Pending, Failed)
            | (Pending, Cancelled)
            | (Pending, Expired)
            | (Confirmed, Cancelled)
            | (Confirmed, Completed)
    )
}

/// The status a reader should see: a pending hold past its deadline is
/// expired whether or not the row was flipped yet.
pub fn effective_status(booking: &Booking, now: DateTime<Utc>) -> ReservationStatus {
    if booking.reservation.hold_lapsed(now) {
        ReservationStatus::Expired
    } else {
        booking.reservation.status
    }
}

/// Computes the booking after `transition`, or the reason it is not allowed.
pub fn apply(booking: &Booking, transition: Transition, now: DateTime<Utc>) -> BookingResult<Booking> {
    let from = booking.reservation.status;
    let to = transition.target();

    if let Transition::Cancel { .. } = transition {
        if from == ReservationStatus::Cancelled {
            return Err(BookingError::AlreadyCancelled);
        }
    }

    if !can_transition(from, to) {
        return Err(BookingError::InvalidTransition { from, to });
    }

    // A lapsed hold no longer owns its seats, so it can only be closed out.
    if booking.reservation.hold_lapsed(now) {
        match transition {
            Transition::Confirm => return Err(BookingError::HoldExpired),
            Transition::Cancel { .. } => {
                return Err(BookingError::InvalidTransition {
                    from: ReservationStatus::Expired,
                    to,
                })
            }
            _ => {}
        }
    }

    let mut next = booking.clone();
    next.reservation.status = to;
    if to != ReservationStatus::Pending {
        next.reservation.expires_at = None;
    }
    if let Transition::Cancel { by_carrier } = transition {
        next.reservation.cancelled_by_carrier = by_carrier;
    }
    if let Some(status) = transition.payment_status() {
        next.payment.status = status;
        next.payment.updated_at = now;
    }
    touch(&mut next, now);
    Ok(next)
}

/// Makes a surprise destination visible to its holder.
pub fn reveal(booking: &Booking, now: DateTime<Utc>) -> BookingResult<Booking> {
    if !booking.reservation.is_surprise {
        return Err(BookingError::NotASurpriseTrip);
    }
    if booking.reservation.destination_revealed {
        return Err(BookingError::AlreadyRevealed);
    }
    let mut next = booking.clone();
    next.reservation.destination_revealed = true;
    touch(&mut next, now);
    Ok(next)
}

/// Records that the surprise reminder went out; the reminder carries the
/// destination, so it is revealed in the same write.
pub fn mark_reminded(booking: &Booking, now: DateTime<Utc>) -> Booking {
    let mut next = booking.clone();
    next.reservation.reminder_email_sent = true;
    next.reservation.destination_revealed = true;
    touch(&mut next, now);
    next
}

/// Marks the payment of an already closed reservation as refunded, for money
/// that arrives after the hold was swept.
pub fn refund_payment(booking: &Booking, now: DateTime<Utc>) -> Booking {
    let mut next = booking.clone();
    next.payment.status = PaymentStatus::Refunded;
    next.payment.updated_at = now;
    touch(&mut next, now);
    next
}

fn touch(booking: &mut Booking, now: DateTime<Utc>) {
    booking.reservation.version += 1;
    booking.reservation.updated_at = now;
}
