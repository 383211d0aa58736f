pub mod auth;

pub use auth::{carrier_auth_middleware, passenger_auth_middleware, Claims, CARRIER_ROLE, PASSENGER_ROLE};
