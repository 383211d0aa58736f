use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coachline_core::{
    is_conflicting, occupied_seats, Booking, LedgerError, PaymentRecord, Reservation,
    ReservationLedger,
};
use coachline_shared::Masked;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

/// SQLSTATEs that mean "gave up waiting", as opposed to a broken backend.
const LOCK_NOT_AVAILABLE: &str = "55P03";
const SERIALIZATION_FAILURE: &str = "40001";

const BOOKING_COLUMNS: &str = r#"
    r.id, r.user_id, r.contact_name, r.contact_email, r.schedule_id, r.seat_numbers,
    r.status, r.expires_at, r.is_surprise, r.destination_revealed, r.reminder_email_sent,
    r.cancelled_by_carrier, r.version, r.created_at, r.updated_at,
    p.id AS payment_id, p.amount_cents, p.method AS payment_method,
    p.status AS payment_status, p.created_at AS payment_created_at,
    p.updated_at AS payment_updated_at
"#;

/// Postgres-backed reservation ledger.
///
/// Every write takes a transaction-scoped advisory lock keyed by the
/// scheduled trip, so occupancy check and write commit as one unit. Waiting
/// longer than `lock_timeout` aborts the transaction.
pub struct PgReservationLedger {
    pool: PgPool,
    lock_timeout: Duration,
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    user_id: Uuid,
    contact_name: String,
    contact_email: String,
    schedule_id: Uuid,
    seat_numbers: Vec<i32>,
    status: String,
    expires_at: Option<DateTime<Utc>>,
    is_surprise: bool,
    destination_revealed: bool,
    reminder_email_sent: bool,
    cancelled_by_carrier: bool,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    payment_id: Uuid,
    amount_cents: i64,
    payment_method: String,
    payment_status: String,
    payment_created_at: DateTime<Utc>,
    payment_updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = LedgerError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let seats = row
            .seat_numbers
            .into_iter()
            .map(|n| u32::try_from(n).map_err(|_| LedgerError::Backend(format!("invalid seat number {}", n))))
            .collect::<Result<Vec<u32>, _>>()?;

        let reservation = Reservation {
            id: row.id,
            user_id: row.user_id,
            contact_name: row.contact_name,
            contact_email: Masked(row.contact_email),
            trip_id: row.schedule_id,
            seats,
            status: row.status.parse().map_err(LedgerError::Backend)?,
            expires_at: row.expires_at,
            is_surprise: row.is_surprise,
            destination_revealed: row.destination_revealed,
            reminder_email_sent: row.reminder_email_sent,
            cancelled_by_carrier: row.cancelled_by_carrier,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        };
        let payment = PaymentRecord {
            id: row.payment_id,
            reservation_id: row.id,
            amount_cents: row.amount_cents,
            method: row.payment_method.parse().map_err(LedgerError::Backend)?,
            status: row.payment_status.parse().map_err(LedgerError::Backend)?,
            created_at: row.payment_created_at,
            updated_at: row.payment_updated_at,
        };
        Ok(Booking { reservation, payment })
    }
}

/// Advisory lock key of a scheduled trip.
pub fn trip_lock_key(trip_id: Uuid) -> i64 {
    trip_id.as_u64_pair().0 as i64
}

fn seat_array(seats: &[u32]) -> Vec<i32> {
    seats.iter().map(|&n| n as i32).collect()
}

fn map_err(trip_id: Uuid, e: sqlx::Error) -> LedgerError {
    let code = e
        .as_database_error()
        .and_then(|db| db.code())
        .map(|c| c.into_owned());
    match code.as_deref() {
        Some(LOCK_NOT_AVAILABLE) | Some(SERIALIZATION_FAILURE) => LedgerError::LockTimeout(trip_id),
        _ => LedgerError::Backend(e.to_string()),
    }
}

fn into_bookings(rows: Vec<BookingRow>) -> Result<Vec<Booking>, LedgerError> {
    rows.into_iter().map(Booking::try_from).collect()
}

impl PgReservationLedger {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    /// Opens a transaction holding the write lock of `trip_id`.
    async fn lock_trip(&self, trip_id: Uuid) -> Result<Transaction<'static, Postgres>, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(|e| map_err(trip_id, e))?;

        // SET does not take bind parameters.
        sqlx::query(&format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_err(trip_id, e))?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(trip_lock_key(trip_id))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_err(trip_id, e))?;
        Ok(tx)
    }

    /// Seats of `candidate` held by other occupying reservations of its trip.
    async fn taken_seats(
        tx: &mut Transaction<'static, Postgres>,
        candidate: &Booking,
        now: DateTime<Utc>,
    ) -> Result<Vec<u32>, LedgerError> {
        let trip_id = candidate.reservation.trip_id;
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM reservations r JOIN payments p ON p.reservation_id = r.id \
             WHERE r.schedule_id = $1 AND r.id <> $2 AND r.status IN ('pending', 'confirmed')",
            BOOKING_COLUMNS
        ))
        .bind(trip_id)
        .bind(candidate.reservation.id)
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| map_err(trip_id, e))?;

        let others = into_bookings(rows)?;
        let occupied: BTreeSet<u32> = occupied_seats(others.iter().map(|b| &b.reservation), now);
        Ok(candidate
            .reservation
            .seats
            .iter()
            .copied()
            .filter(|seat| occupied.contains(seat))
            .collect())
    }

    async fn fetch(&self, filter: &str, id: Uuid) -> Result<Vec<Booking>, LedgerError> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM reservations r JOIN payments p ON p.reservation_id = r.id WHERE {} \
             ORDER BY r.created_at DESC",
            BOOKING_COLUMNS, filter
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| LedgerError::Backend(e.to_string()))?;
        into_bookings(rows)
    }
}

#[async_trait]
impl ReservationLedger for PgReservationLedger {
    async fn insert(&self, booking: &Booking, now: DateTime<Utc>) -> Result<(), LedgerError> {
        let trip_id = booking.reservation.trip_id;
        let mut tx = self.lock_trip(trip_id).await?;

        let taken = Self::taken_seats(&mut tx, booking, now).await?;
        if !taken.is_empty() {
            // Dropping the transaction rolls it back and releases the lock.
            return Err(LedgerError::SeatTaken(taken));
        }

        let r = &booking.reservation;
        sqlx::query(
            r#"
            INSERT INTO reservations (id, user_id, contact_name, contact_email, schedule_id, seat_numbers,
                status, expires_at, is_surprise, destination_revealed, reminder_email_sent,
                cancelled_by_carrier, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(r.id)
        .bind(r.user_id)
        .bind(&r.contact_name)
        .bind(r.contact_email.expose())
        .bind(r.trip_id)
        .bind(seat_array(&r.seats))
        .bind(r.status.as_str())
        .bind(r.expires_at)
        .bind(r.is_surprise)
        .bind(r.destination_revealed)
        .bind(r.reminder_email_sent)
        .bind(r.cancelled_by_carrier)
        .bind(r.version)
        .bind(r.created_at)
        .bind(r.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_err(trip_id, e))?;

        let p = &booking.payment;
        sqlx::query(
            r#"
            INSERT INTO payments (id, reservation_id, amount_cents, method, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(p.id)
        .bind(p.reservation_id)
        .bind(p.amount_cents)
        .bind(p.method.as_str())
        .bind(p.status.as_str())
        .bind(p.created_at)
        .bind(p.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_err(trip_id, e))?;

        tx.commit().await.map_err(|e| map_err(trip_id, e))?;
        Ok(())
    }

    async fn update(
        &self,
        booking: &Booking,
        expected_version: i64,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let id = booking.reservation.id;
        let trip_id = booking.reservation.trip_id;
        let mut tx = self.lock_trip(trip_id).await?;

        let stored: Option<(i64,)> = sqlx::query_as("SELECT version FROM reservations WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_err(trip_id, e))?;
        match stored {
            None => return Err(LedgerError::NotFound(id)),
            Some((version,)) if version != expected_version => return Err(LedgerError::StaleVersion(id)),
            Some(_) => {}
        }

        if is_conflicting(&booking.reservation, now) {
            let taken = Self::taken_seats(&mut tx, booking, now).await?;
            if !taken.is_empty() {
                return Err(LedgerError::SeatTaken(taken));
            }
        }

        let r = &booking.reservation;
        sqlx::query(
            r#"
            UPDATE reservations
            SET status = $2, expires_at = $3, destination_revealed = $4, reminder_email_sent = $5,
                cancelled_by_carrier = $6, version = $7, updated_at = $8
            WHERE id = $1 AND version = $9
            "#,
        )
        .bind(id)
        .bind(r.status.as_str())
        .bind(r.expires_at)
        .bind(r.destination_revealed)
        .bind(r.reminder_email_sent)
        .bind(r.cancelled_by_carrier)
        .bind(r.version)
        .bind(r.updated_at)
        .bind(expected_version)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_err(trip_id, e))?;

        let p = &booking.payment;
        sqlx::query("UPDATE payments SET status = $2, updated_at = $3 WHERE reservation_id = $1")
            .bind(id)
            .bind(p.status.as_str())
            .bind(p.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_err(trip_id, e))?;

        tx.commit().await.map_err(|e| map_err(trip_id, e))?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Booking>, LedgerError> {
        Ok(self.fetch("r.id = $1", id).await?.into_iter().next())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Booking>, LedgerError> {
        self.fetch("r.user_id = $1", user_id).await
    }

    async fn list_for_trip(&self, trip_id: Uuid) -> Result<Vec<Booking>, LedgerError> {
        self.fetch("r.schedule_id = $1", trip_id).await
    }

    async fn list_open(&self) -> Result<Vec<Booking>, LedgerError> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM reservations r JOIN payments p ON p.reservation_id = r.id \
             WHERE r.status IN ('pending', 'confirmed')",
            BOOKING_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| LedgerError::Backend(e.to_string()))?;
        into_bookings(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coachline_core::{PaymentMethod, PaymentStatus, ReservationStatus};

    fn row(status: &str, seats: Vec<i32>) -> BookingRow {
        let now = Utc::now();
        BookingRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            contact_name: "Rui".to_string(),
            contact_email: "rui@example.com".to_string(),
            schedule_id: Uuid::new_v4(),
            seat_numbers: seats,
            status: status.to_string(),
            expires_at: None,
            is_surprise: true,
            destination_revealed: false,
            reminder_email_sent: false,
            cancelled_by_carrier: false,
            version: 3,
            created_at: now,
            updated_at: now,
            payment_id: Uuid::new_v4(),
            amount_cents: 5000,
            payment_method: "wallet".to_string(),
            payment_status: "successful".to_string(),
            payment_created_at: now,
            payment_updated_at: now,
        }
    }

    #[test]
    fn test_row_maps_to_booking() {
        let booking = Booking::try_from(row("confirmed", vec![4, 5])).unwrap();
        assert_eq!(booking.reservation.status, ReservationStatus::Confirmed);
        assert_eq!(booking.reservation.seats, vec![4, 5]);
        assert_eq!(booking.payment.reservation_id, booking.reservation.id);
        assert_eq!(booking.payment.method, PaymentMethod::Wallet);
        assert_eq!(booking.payment.status, PaymentStatus::Successful);
    }

    #[test]
    fn test_corrupt_rows_are_backend_errors() {
        assert!(matches!(Booking::try_from(row("on_hold", vec![1])), Err(LedgerError::Backend(_))));
        assert!(matches!(Booking::try_from(row("pending", vec![-1])), Err(LedgerError::Backend(_))));
    }

    #[test]
    fn test_lock_key_is_stable_per_trip() {
        let trip = Uuid::new_v4();
        assert_eq!(trip_lock_key(trip), trip_lock_key(trip));
        assert_ne!(trip_lock_key(trip), trip_lock_key(Uuid::new_v4()));
    }
}
