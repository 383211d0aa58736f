use chrono::{DateTime, Duration, Utc};
use coachline_shared::Masked;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Carrier {
    pub id: Uuid,
    pub name: String,
    pub email: Masked<String>,
}

/// Ordered list of cities a bus line serves; the first is the origin and the
/// last the destination.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Route {
    pub id: Uuid,
    pub cities: Vec<String>,
    pub distance_km: f64,
    pub carrier: Carrier,
}

impl Route {
    pub fn origin(&self) -> Option<&str> {
        self.cities.first().map(String::as_str)
    }

    pub fn destination(&self) -> Option<&str> {
        if self.cities.len() < 2 {
            return None;
        }
        self.cities.last().map(String::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vehicle {
    pub id: Uuid,
    pub plate: String,
    pub capacity: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Seat {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub number: u32,
}

/// A departure of a vehicle on a route. Owned by carrier management; the
/// booking core only reads it.
///
/// `vehicle` and `route` are optional because the directory may hand back a
/// schedule whose references were deleted underneath it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledTrip {
    pub id: Uuid,
    pub vehicle: Option<Vehicle>,
    pub route: Option<Route>,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    pub price_cents: i64,
}

impl ScheduledTrip {
    pub fn time_until_departure(&self, now: DateTime<Utc>) -> Duration {
        self.departure_time - now
    }

    pub fn has_departed(&self, now: DateTime<Utc>) -> bool {
        now >= self.departure_time
    }

    pub fn has_arrived(&self, now: DateTime<Utc>) -> bool {
        now >= self.arrival_time
    }

    pub fn is_operated_by(&self, carrier_id: Uuid) -> bool {
        self.route
            .as_ref()
            .map(|route| route.carrier.id == carrier_id)
            .unwrap_or(false)
    }
}

/// The authenticated passenger making a request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Traveller {
    pub id: Uuid,
    pub name: String,
    pub email: Masked<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(cities: &[&str]) -> Route {
        Route {
            id: Uuid::new_v4(),
            cities: cities.iter().map(|c| c.to_string()).collect(),
            distance_km: 310.0,
            carrier: Carrier {
                id: Uuid::new_v4(),
                name: "Rhone Express".to_string(),
                email: Masked::from("ops@rhone.example"),
            },
        }
    }

    #[test]
    fn test_route_endpoints() {
        let r = route(&["Lyon", "Grenoble", "Turin"]);
        assert_eq!(r.origin(), Some("Lyon"));
        assert_eq!(r.destination(), Some("Turin"));

        let single = route(&["Lyon"]);
        assert_eq!(single.destination(), None);
    }

    #[test]
    fn test_trip_timing() {
        let now = Utc::now();
        let r = route(&["Lyon", "Turin"]);
        let carrier_id = r.carrier.id;
        let trip = ScheduledTrip {
            id: Uuid::new_v4(),
            vehicle: None,
            route: Some(r),
            departure_time: now + Duration::hours(3),
            arrival_time: now + Duration::hours(7),
            price_cents: 2500,
        };

        assert_eq!(trip.time_until_departure(now), Duration::hours(3));
        assert!(!trip.has_departed(now));
        assert!(trip.has_departed(now + Duration::hours(3)));
        assert!(trip.has_arrived(now + Duration::hours(7)));
        assert!(trip.is_operated_by(carrier_id));
        assert!(!trip.is_operated_by(Uuid::new_v4()));
    }
}
