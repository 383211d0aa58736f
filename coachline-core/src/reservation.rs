use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::payment::PaymentRecord;
use crate::trip::Traveller;
use coachline_shared::Masked;

/// Reservation lifecycle.
///
/// `Pending` moves to `Confirmed`, `Failed`, `Cancelled` or `Expired`;
/// `Confirmed` moves to `Cancelled` or `Completed`. Everything else is terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
    Failed,
    Expired,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::Completed => "completed",
            ReservationStatus::Failed => "failed",
            ReservationStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReservationStatus::Pending | ReservationStatus::Confirmed)
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReservationStatus::Pending),
            "confirmed" => Ok(ReservationStatus::Confirmed),
            "cancelled" => Ok(ReservationStatus::Cancelled),
            "completed" => Ok(ReservationStatus::Completed),
            "failed" => Ok(ReservationStatus::Failed),
            "expired" => Ok(ReservationStatus::Expired),
            other => Err(format!("unknown reservation status: {}", other)),
        }
    }
}

/// A passenger's claim on a fixed set of seats of one scheduled trip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reservation {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Contact details captured at booking time, used for every later e-mail.
    pub contact_name: String,
    pub contact_email: Masked<String>,
    pub trip_id: Uuid,
    /// Fixed at creation; never partially released.
    pub seats: Vec<u32>,
    pub status: ReservationStatus,
    /// Only meaningful while `Pending`.
    pub expires_at: Option<DateTime<Utc>>,
    pub is_surprise: bool,
    pub destination_revealed: bool,
    pub reminder_email_sent: bool,
    pub cancelled_by_carrier: bool,
    /// Bumped on every write; ledgers use it for optimistic concurrency.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    pub fn pending(
        traveller: &Traveller,
        trip_id: Uuid,
        seats: Vec<u32>,
        is_surprise: bool,
        now: DateTime<Utc>,
        hold: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: traveller.id,
            contact_name: traveller.name.clone(),
            contact_email: traveller.email.clone(),
            trip_id,
            seats,
            status: ReservationStatus::Pending,
            expires_at: Some(now + hold),
            is_surprise,
            destination_revealed: false,
            reminder_email_sent: false,
            cancelled_by_carrier: false,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// True for a pending hold whose deadline has passed, whatever the stored
    /// status row still says.
    pub fn hold_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Pending
            && self.expires_at.map(|deadline| deadline <= now).unwrap_or(true)
    }

    pub fn destination_hidden(&self) -> bool {
        self.is_surprise && !self.destination_revealed
    }
}

/// Whether `reservation` occupies its seats at `now`.
///
/// Every read of seat occupancy goes through this: the availability query,
/// the booking conflict check, and the ledgers' own re-checks.
pub fn is_conflicting(reservation: &Reservation, now: DateTime<Utc>) -> bool {
    match reservation.status {
        ReservationStatus::Confirmed => true,
        ReservationStatus::Pending => reservation
            .expires_at
            .map(|deadline| deadline > now)
            .unwrap_or(false),
        _ => false,
    }
}

/// Seat numbers held by any occupying reservation in `reservations`.
pub fn occupied_seats<'a, I>(reservations: I, now: DateTime<Utc>) -> BTreeSet<u32>
where
    I: IntoIterator<Item = &'a Reservation>,
{
    reservations
        .into_iter()
        .filter(|r| is_conflicting(r, now))
        .flat_map(|r| r.seats.iter().copied())
        .collect()
}

/// A reservation together with its payment record. Ledgers store and return
/// them as a unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub reservation: Reservation,
    pub payment: PaymentRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_at(now: DateTime<Utc>, seats: Vec<u32>) -> Reservation {
        let traveller = Traveller {
            id: Uuid::new_v4(),
            name: "Ines".to_string(),
            email: Masked::from("ines@example.com"),
        };
        Reservation::pending(&traveller, Uuid::new_v4(), seats, false, now, Duration::minutes(15))
    }

    #[test]
    fn test_pending_hold_occupies_until_deadline() {
        let now = Utc::now();
        let r = pending_at(now, vec![14]);

        assert!(is_conflicting(&r, now));
        assert!(is_conflicting(&r, now + Duration::minutes(15) - Duration::seconds(1)));
        assert!(!is_conflicting(&r, now + Duration::minutes(15)));
        assert!(r.hold_lapsed(now + Duration::minutes(15)));
    }

    #[test]
    fn test_only_confirmed_and_live_pending_occupy() {
        let now = Utc::now();
        let mut r = pending_at(now, vec![1]);

        r.status = ReservationStatus::Confirmed;
        r.expires_at = None;
        assert!(is_conflicting(&r, now + Duration::days(30)));

        for status in [
            ReservationStatus::Cancelled,
            ReservationStatus::Completed,
            ReservationStatus::Failed,
            ReservationStatus::Expired,
        ] {
            r.status = status;
            assert!(!is_conflicting(&r, now), "{} must not hold seats", status);
            assert!(status.is_terminal());
        }
    }

    #[test]
    fn test_occupied_seats_ignores_lapsed_holds() {
        let now = Utc::now();
        let live = pending_at(now, vec![1, 2]);
        let lapsed = pending_at(now - Duration::minutes(20), vec![3]);
        let mut confirmed = pending_at(now - Duration::hours(1), vec![4]);
        confirmed.status = ReservationStatus::Confirmed;

        let seats = occupied_seats([&live, &lapsed, &confirmed], now);
        assert_eq!(seats.into_iter().collect::<Vec<_>>(), vec![1, 2, 4]);
    }
}
