use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, TimeZone, Utc};
use coachline_api::{app, middleware::Claims, worker, AppState, AuthConfig};
use coachline_booking::{
    BookingEngine, BookingPolicy, InMemoryLedger, InMemoryTripDirectory, NotificationDispatcher,
};
use coachline_core::{Carrier, ManualClock, RecordingNotifier, Route, ScheduledTrip, Vehicle};
use coachline_shared::Masked;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

const JWT_SECRET: &str = "test-secret";
const WEBHOOK_SECRET: &str = "hook-secret";

struct TestApp {
    state: AppState,
    trips: Arc<InMemoryTripDirectory>,
    clock: Arc<ManualClock>,
    carrier_id: Uuid,
}

impl TestApp {
    fn new() -> Self {
        let trips = Arc::new(InMemoryTripDirectory::new());
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap()));
        let engine = BookingEngine::new(
            trips.clone(),
            Arc::new(InMemoryLedger::default()),
            NotificationDispatcher::new(Arc::new(RecordingNotifier::new())),
            clock.clone(),
            BookingPolicy::default(),
        );
        let state = AppState {
            engine: Arc::new(engine),
            auth: AuthConfig {
                secret: JWT_SECRET.to_string(),
            },
            webhook_secret: WEBHOOK_SECRET.to_string(),
        };
        Self {
            state,
            trips,
            clock,
            carrier_id: Uuid::new_v4(),
        }
    }

    fn router(&self) -> Router {
        app(self.state.clone())
    }

    async fn trip_departing_in(&self, lead: Duration) -> Uuid {
        use coachline_core::Clock;
        let vehicle = Vehicle {
            id: Uuid::new_v4(),
            plate: "CC-56-DE".to_string(),
            capacity: 40,
        };
        self.trips.add_vehicle_seats(vehicle.id, 40).await;
        let departure_time = self.clock.now() + lead;
        let trip = ScheduledTrip {
            id: Uuid::new_v4(),
            vehicle: Some(vehicle),
            route: Some(Route {
                id: Uuid::new_v4(),
                cities: vec!["Lisbon".to_string(), "Evora".to_string(), "Seville".to_string()],
                distance_km: 460.0,
                carrier: Carrier {
                    id: self.carrier_id,
                    name: "Iberia Coaches".to_string(),
                    email: Masked::from("ops@iberia.example"),
                },
            }),
            departure_time,
            arrival_time: departure_time + Duration::hours(5),
            price_cents: 2500,
        };
        self.trips.add_trip(trip.clone()).await;
        trip.id
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let response = self.router().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }
}

fn token(sub: Uuid, role: &str) -> String {
    let claims = Claims {
        sub,
        name: "Marta".to_string(),
        email: Masked::from("marta@example.com"),
        role: role.to_string(),
        exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(JWT_SECRET.as_bytes())).unwrap()
}

fn webhook(reservation_id: &str, status: &str) -> Request<Body> {
    let mut req = post(
        "/v1/webhooks/payments",
        None,
        json!({ "reservationId": reservation_id, "status": status }),
    );
    req.headers_mut().insert("x-webhook-secret", WEBHOOK_SECRET.parse().unwrap());
    req
}

fn post(uri: &str, bearer: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(t) = bearer {
        builder = builder.header("authorization", format!("Bearer {}", t));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(t) = bearer {
        builder = builder.header("authorization", format!("Bearer {}", t));
    }
    builder.body(Body::empty()).unwrap()
}

fn booking_body(schedule_id: Uuid, seats: &[u32], surprise: bool) -> Value {
    json!({ "scheduleId": schedule_id, "seatNumbers": seats, "isSurprise": surprise })
}

#[tokio::test]
async fn test_health() {
    let t = TestApp::new();
    let (status, body) = t.send(get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_reservation_routes_require_passenger_token() {
    let t = TestApp::new();
    let trip = t.trip_departing_in(Duration::days(1)).await;

    let (status, _) = t.send(post("/v1/reservations", None, booking_body(trip, &[1], false))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let carrier = token(t.carrier_id, "CARRIER");
    let (status, _) = t
        .send(post("/v1/reservations", Some(&carrier), booking_body(trip, &[1], false)))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_second_booking_of_a_seat_conflicts() {
    let t = TestApp::new();
    let trip = t.trip_departing_in(Duration::days(1)).await;
    let first = token(Uuid::new_v4(), "PASSENGER");
    let second = token(Uuid::new_v4(), "PASSENGER");

    let (status, body) = t
        .send(post("/v1/reservations", Some(&first), booking_body(trip, &[14], false)))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["payment"]["amountCents"], 2500);
    assert_eq!(body["trip"]["destination"], "Seville");

    let (status, body) = t
        .send(post("/v1/reservations", Some(&second), booking_body(trip, &[14], false)))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "SEAT_CONFLICT");
    assert_eq!(body["error"], "Some of the selected seats are already booked");

    let (status, body) = t.send(get(&format!("/v1/schedules/{}/seats", trip), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalSeats"], 40);
    assert_eq!(body["availableSeats"], 39);
    assert_eq!(body["seats"][13]["seatNumber"], 14);
    assert_eq!(body["seats"][13]["isAvailable"], false);
}

#[tokio::test]
async fn test_malformed_booking_body_is_invalid_input() {
    let t = TestApp::new();
    let trip = t.trip_departing_in(Duration::days(1)).await;
    let passenger = token(Uuid::new_v4(), "PASSENGER");

    for body in [
        json!({ "scheduleId": trip, "seatNumbers": [-1] }),
        json!({ "seatNumbers": [3] }),
    ] {
        let (status, body) = t.send(post("/v1/reservations", Some(&passenger), body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_INPUT");
        assert!(body["error"].is_string());
    }

    let (_, seats) = t.send(get(&format!("/v1/schedules/{}/seats", trip), None)).await;
    assert_eq!(seats["availableSeats"], 40);
}

#[tokio::test]
async fn test_surprise_trip_is_masked_until_revealed() {
    let t = TestApp::new();
    let trip = t.trip_departing_in(Duration::hours(8)).await;
    let passenger = token(Uuid::new_v4(), "PASSENGER");

    let (_, body) = t
        .send(get(&format!("/v1/schedules/{}/seats?surprise=true", trip), None))
        .await;
    assert_eq!(body["trip"]["destination"], "unknown");
    assert!(body["trip"]["distanceKm"].is_null());

    let (status, created) = t
        .send(post("/v1/reservations", Some(&passenger), booking_body(trip, &[3], true)))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["trip"]["destination"], "unknown");
    let id = created["id"].as_str().unwrap().to_string();

    let (status, body) = t
        .send(post(&format!("/v1/reservations/{}/reveal", id), Some(&passenger), json!({})))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "NOT_YET_REVEALABLE");

    let (status, _) = t.send(webhook(&id, "succeeded")).await;
    assert_eq!(status, StatusCode::OK);

    t.clock.advance(Duration::hours(3));
    let (status, body) = t
        .send(post(&format!("/v1/reservations/{}/reveal", id), Some(&passenger), json!({})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["trip"]["destination"], "Seville");

    let (_, list) = t.send(get("/v1/reservations", Some(&passenger))).await;
    assert_eq!(list[0]["trip"]["destination"], "Seville");
}

#[tokio::test]
async fn test_payment_webhook_confirms_reservation() {
    let t = TestApp::new();
    let trip = t.trip_departing_in(Duration::days(1)).await;
    let user = Uuid::new_v4();
    let passenger = token(user, "PASSENGER");

    let (_, created) = t
        .send(post("/v1/reservations", Some(&passenger), booking_body(trip, &[7], false)))
        .await;
    let id = created["id"].as_str().unwrap().to_string();
    let hook = json!({ "reservationId": id, "status": "succeeded" });

    let (status, _) = t.send(post("/v1/webhooks/payments", None, hook.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let mut req = post("/v1/webhooks/payments", None, hook);
    req.headers_mut().insert("x-webhook-secret", WEBHOOK_SECRET.parse().unwrap());
    let (status, body) = t.send(req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "confirmed");
    assert_eq!(body["paymentStatus"], "successful");

    let (status, body) = t.send(get(&format!("/v1/reservations/{}", id), Some(&passenger))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "confirmed");

    let stranger = token(Uuid::new_v4(), "PASSENGER");
    let (status, body) = t.send(get(&format!("/v1/reservations/{}", id), Some(&stranger))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "ACCESS_DENIED");
}

#[tokio::test]
async fn test_payment_after_failure_is_acknowledged_for_refund() {
    let t = TestApp::new();
    let trip = t.trip_departing_in(Duration::days(1)).await;
    let passenger = token(Uuid::new_v4(), "PASSENGER");

    let (_, created) = t
        .send(post("/v1/reservations", Some(&passenger), booking_body(trip, &[11], false)))
        .await;
    let id = created["id"].as_str().unwrap().to_string();

    let (status, body) = t.send(webhook(&id, "failed")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "failed");

    let (status, body) = t.send(webhook(&id, "succeeded")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "failed");
    assert_eq!(body["paymentStatus"], "refunded");
}

#[tokio::test]
async fn test_late_cancellation_is_rejected() {
    let t = TestApp::new();
    let trip = t.trip_departing_in(Duration::minutes(90)).await;
    let passenger = token(Uuid::new_v4(), "PASSENGER");

    let (_, created) = t
        .send(post("/v1/reservations", Some(&passenger), booking_body(trip, &[2], false)))
        .await;
    let id = created["id"].as_str().unwrap().to_string();

    let (status, body) = t
        .send(post(&format!("/v1/reservations/{}/cancel", id), Some(&passenger), json!({})))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "TOO_LATE_TO_CANCEL");
}

#[tokio::test]
async fn test_carrier_withdraws_schedule() {
    let t = TestApp::new();
    let trip = t.trip_departing_in(Duration::days(1)).await;
    let passenger = token(Uuid::new_v4(), "PASSENGER");
    t.send(post("/v1/reservations", Some(&passenger), booking_body(trip, &[1, 2], false)))
        .await;

    let other_carrier = token(Uuid::new_v4(), "CARRIER");
    let uri = format!("/v1/carrier/schedules/{}/cancel", trip);
    let (status, _) = t.send(post(&uri, Some(&other_carrier), json!({}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let owner = token(t.carrier_id, "CARRIER");
    let (status, body) = t.send(post(&uri, Some(&owner), json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cancelled"].as_array().map(Vec::len), Some(1));

    let (_, list) = t.send(get("/v1/reservations", Some(&passenger))).await;
    assert_eq!(list[0]["status"], "cancelled");
    assert_eq!(list[0]["cancelledByCarrier"], true);
}

#[tokio::test]
async fn test_sweeper_survives_zero_interval() {
    let t = TestApp::new();
    let sweeper = tokio::spawn(worker::start_sweeper(
        t.state.engine.clone(),
        std::time::Duration::ZERO,
    ));

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(!sweeper.is_finished());
    sweeper.abort();
}
