use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use coachline_core::{
    Carrier, Clock, ManualClock, RecordingNotifier, Route, ScheduledTrip, Traveller, Vehicle,
};
use coachline_shared::Masked;
use uuid::Uuid;

use crate::dispatch::NotificationDispatcher;
use crate::engine::{BookingEngine, NewReservation};
use crate::memory::{InMemoryLedger, InMemoryTripDirectory};
use crate::policy::BookingPolicy;

/// An engine over in-memory collaborators with a hand-driven clock.
pub(crate) struct Harness {
    pub engine: BookingEngine,
    pub ledger: Arc<InMemoryLedger>,
    pub trips: Arc<InMemoryTripDirectory>,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<RecordingNotifier>,
    pub carrier: Carrier,
    pub passenger: Traveller,
}

impl Harness {
    pub async fn new() -> Self {
        let ledger = Arc::new(InMemoryLedger::new(std::time::Duration::from_millis(200)));
        let trips = Arc::new(InMemoryTripDirectory::new());
        let clock = Arc::new(ManualClock::new(Self::start()));
        let notifier = Arc::new(RecordingNotifier::new());

        let engine = BookingEngine::new(
            trips.clone(),
            ledger.clone(),
            NotificationDispatcher::new(notifier.clone()),
            clock.clone(),
            BookingPolicy::default(),
        );

        Self {
            engine,
            ledger,
            trips,
            clock,
            notifier,
            carrier: Carrier {
                id: Uuid::new_v4(),
                name: "Atlantico Expresso".to_string(),
                email: Masked::from("ops@atlantico.example"),
            },
            passenger: Self::traveller("Ana"),
        }
    }

    pub fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap()
    }

    pub fn traveller(name: &str) -> Traveller {
        Traveller {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: Masked(format!("{}@example.com", name.to_lowercase())),
        }
    }

    pub fn request(schedule_id: Uuid, seat_numbers: Vec<u32>, is_surprise: bool) -> NewReservation {
        NewReservation {
            schedule_id,
            seat_numbers,
            is_surprise,
            payment_method: Default::default(),
        }
    }

    /// A 40-seat Porto to Lisbon departure at 25.00 per seat, three hours long.
    pub async fn trip_departing_in(&self, lead: Duration) -> ScheduledTrip {
        let vehicle = Vehicle {
            id: Uuid::new_v4(),
            plate: "AA-12-BC".to_string(),
            capacity: 40,
        };
        self.trips.add_vehicle_seats(vehicle.id, 40).await;

        let departure_time = self.clock.now() + lead;
        let trip = ScheduledTrip {
            id: Uuid::new_v4(),
            vehicle: Some(vehicle),
            route: Some(Route {
                id: Uuid::new_v4(),
                cities: vec!["Porto".to_string(), "Coimbra".to_string(), "Lisbon".to_string()],
                distance_km: 313.5,
                carrier: self.carrier.clone(),
            }),
            departure_time,
            arrival_time: departure_time + Duration::hours(3),
            price_cents: 2500,
        };
        self.trips.add_trip(trip.clone()).await;
        trip
    }
}
