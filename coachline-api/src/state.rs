use coachline_booking::BookingEngine;
use std::sync::Arc;

#[derive(Clone)]
pub struct AuthConfig {
    /// HMAC secret shared with the one-time-code login service.
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<BookingEngine>,
    pub auth: AuthConfig,
    pub webhook_secret: String,
}
