use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coachline_core::{
    is_conflicting, occupied_seats, BoxError, Booking, LedgerError, ReservationLedger,
    ScheduledTrip, Seat, TripDirectory,
};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

/// Process-local reservation ledger.
///
/// Writes for one scheduled trip run under that trip's mutex; waiting for it
/// longer than `lock_timeout` fails with `LedgerError::LockTimeout`.
pub struct InMemoryLedger {
    bookings: RwLock<HashMap<Uuid, Booking>>,
    trip_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    lock_timeout: Duration,
}

impl InMemoryLedger {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            bookings: RwLock::new(HashMap::new()),
            trip_locks: Mutex::new(HashMap::new()),
            lock_timeout,
        }
    }

    /// Takes the write lock of `trip_id`.
    ///
    /// Locks nobody holds or waits for are dropped from the map on the way,
    /// so it only grows with the number of trips being written concurrently.
    pub async fn lock_trip(&self, trip_id: Uuid) -> Result<OwnedMutexGuard<()>, LedgerError> {
        let lock = {
            let mut locks = self.trip_locks.lock().await;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(trip_id).or_default().clone()
        };
        tokio::time::timeout(self.lock_timeout, lock.lock_owned())
            .await
            .map_err(|_| LedgerError::LockTimeout(trip_id))
    }

    fn taken_seats(
        bookings: &HashMap<Uuid, Booking>,
        candidate: &Booking,
        now: DateTime<Utc>,
    ) -> Vec<u32> {
        let trip_id = candidate.reservation.trip_id;
        let occupied: BTreeSet<u32> = occupied_seats(
            bookings
                .values()
                .map(|b| &b.reservation)
                .filter(|r| r.trip_id == trip_id && r.id != candidate.reservation.id),
            now,
        );
        candidate
            .reservation
            .seats
            .iter()
            .copied()
            .filter(|seat| occupied.contains(seat))
            .collect()
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new(Duration::from_secs(3))
    }
}

#[async_trait]
impl ReservationLedger for InMemoryLedger {
    async fn insert(&self, booking: &Booking, now: DateTime<Utc>) -> Result<(), LedgerError> {
        let _guard = self.lock_trip(booking.reservation.trip_id).await?;

        let mut bookings = self.bookings.write().await;
        let taken = Self::taken_seats(&bookings, booking, now);
        if !taken.is_empty() {
            return Err(LedgerError::SeatTaken(taken));
        }
        bookings.insert(booking.reservation.id, booking.clone());
        Ok(())
    }

    async fn update(
        &self,
        booking: &Booking,
        expected_version: i64,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let id = booking.reservation.id;
        let _guard = self.lock_trip(booking.reservation.trip_id).await?;

        let mut bookings = self.bookings.write().await;
        let stored = bookings.get(&id).ok_or(LedgerError::NotFound(id))?;
        if stored.reservation.version != expected_version {
            return Err(LedgerError::StaleVersion(id));
        }
        if is_conflicting(&booking.reservation, now) {
            let taken = Self::taken_seats(&bookings, booking, now);
            if !taken.is_empty() {
                return Err(LedgerError::SeatTaken(taken));
            }
        }
        bookings.insert(id, booking.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Booking>, LedgerError> {
        Ok(self.bookings.read().await.get(&id).cloned())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Booking>, LedgerError> {
        let mut found: Vec<Booking> = self
            .bookings
            .read()
            .await
            .values()
            .filter(|b| b.reservation.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.reservation.created_at.cmp(&a.reservation.created_at));
        Ok(found)
    }

    async fn list_for_trip(&self, trip_id: Uuid) -> Result<Vec<Booking>, LedgerError> {
        let mut found: Vec<Booking> = self
            .bookings
            .read()
            .await
            .values()
            .filter(|b| b.reservation.trip_id == trip_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.reservation.created_at.cmp(&b.reservation.created_at));
        Ok(found)
    }

    async fn list_open(&self) -> Result<Vec<Booking>, LedgerError> {
        Ok(self
            .bookings
            .read()
            .await
            .values()
            .filter(|b| !b.reservation.status.is_terminal())
            .cloned()
            .collect())
    }
}

/// Schedules and seat maps held in memory, for tests and local runs.
#[derive(Default)]
pub struct InMemoryTripDirectory {
    trips: RwLock<HashMap<Uuid, ScheduledTrip>>,
    seats: RwLock<HashMap<Uuid, Vec<Seat>>>,
}

impl InMemoryTripDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a schedule.
    pub async fn add_trip(&self, trip: ScheduledTrip) {
        self.trips.write().await.insert(trip.id, trip);
    }

    pub async fn remove_trip(&self, trip_id: Uuid) {
        self.trips.write().await.remove(&trip_id);
    }

    /// Gives the vehicle seats numbered `1..=count`.
    pub async fn add_vehicle_seats(&self, vehicle_id: Uuid, count: u32) {
        let seats = (1..=count)
            .map(|number| Seat {
                id: Uuid::new_v4(),
                vehicle_id,
                number,
            })
            .collect();
        self.seats.write().await.insert(vehicle_id, seats);
    }
}

#[async_trait]
impl TripDirectory for InMemoryTripDirectory {
    async fn scheduled_trip(&self, id: Uuid) -> Result<Option<ScheduledTrip>, BoxError> {
        Ok(self.trips.read().await.get(&id).cloned())
    }

    async fn vehicle_seats(&self, vehicle_id: Uuid) -> Result<Vec<Seat>, BoxError> {
        Ok(self
            .seats
            .read()
            .await
            .get(&vehicle_id)
            .cloned()
            .unwrap_or_default())
    }
}
