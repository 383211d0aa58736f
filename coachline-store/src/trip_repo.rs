use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coachline_core::{BoxError, Carrier, Route, ScheduledTrip, Seat, TripDirectory, Vehicle};
use coachline_shared::Masked;
use sqlx::PgPool;
use uuid::Uuid;

/// Schedules, buses and seats as maintained by carrier management.
pub struct PgTripDirectory {
    pool: PgPool,
}

impl PgTripDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Left joins: a schedule whose bus or route row is gone still loads, with the
// missing half left empty.
#[derive(sqlx::FromRow)]
struct ScheduleRow {
    id: Uuid,
    departure_time: DateTime<Utc>,
    arrival_time: DateTime<Utc>,
    price_cents: i64,
    bus_id: Option<Uuid>,
    plate: Option<String>,
    capacity: Option<i32>,
    route_id: Option<Uuid>,
    cities: Option<Vec<String>>,
    distance_km: Option<f64>,
    carrier_id: Option<Uuid>,
    carrier_name: Option<String>,
    carrier_email: Option<String>,
}

#[derive(sqlx::FromRow)]
struct SeatRow {
    id: Uuid,
    bus_id: Uuid,
    seat_number: i32,
}

impl From<ScheduleRow> for ScheduledTrip {
    fn from(row: ScheduleRow) -> Self {
        let vehicle = match (row.bus_id, row.plate) {
            (Some(id), Some(plate)) => Some(Vehicle {
                id,
                plate,
                capacity: row.capacity.unwrap_or_default().max(0) as u32,
            }),
            _ => None,
        };
        let route = match (row.route_id, row.cities, row.carrier_id, row.carrier_name) {
            (Some(id), Some(cities), Some(carrier_id), Some(carrier_name)) => Some(Route {
                id,
                cities,
                distance_km: row.distance_km.unwrap_or_default(),
                carrier: Carrier {
                    id: carrier_id,
                    name: carrier_name,
                    email: Masked(row.carrier_email.unwrap_or_default()),
                },
            }),
            _ => None,
        };
        ScheduledTrip {
            id: row.id,
            vehicle,
            route,
            departure_time: row.departure_time,
            arrival_time: row.arrival_time,
            price_cents: row.price_cents,
        }
    }
}

#[async_trait]
impl TripDirectory for PgTripDirectory {
    async fn scheduled_trip(&self, id: Uuid) -> Result<Option<ScheduledTrip>, BoxError> {
        let row: Option<ScheduleRow> = sqlx::query_as(
            r#"
            SELECT s.id, s.departure_time, s.arrival_time, s.price_cents,
                   b.id AS bus_id, b.plate, b.capacity,
                   r.id AS route_id, r.cities, r.distance_km,
                   c.id AS carrier_id, c.name AS carrier_name, c.email AS carrier_email
            FROM schedules s
            LEFT JOIN buses b ON b.id = s.bus_id
            LEFT JOIN routes r ON r.id = s.route_id
            LEFT JOIN carriers c ON c.id = r.carrier_id
            WHERE s.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ScheduledTrip::from))
    }

    async fn vehicle_seats(&self, vehicle_id: Uuid) -> Result<Vec<Seat>, BoxError> {
        let rows: Vec<SeatRow> = sqlx::query_as(
            "SELECT id, bus_id, seat_number FROM seats WHERE bus_id = $1 ORDER BY seat_number",
        )
        .bind(vehicle_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<Seat, BoxError> {
                Ok(Seat {
                    id: row.id,
                    vehicle_id: row.bus_id,
                    number: u32::try_from(row.seat_number)?,
                })
            })
            .collect()
    }
}
