pub mod app_config;
pub mod database;
pub mod events;
pub mod redis_repo;
pub mod reservation_repo;
pub mod trip_repo;

pub use app_config::{BusinessRules, Config};
pub use database::DbClient;
pub use events::{EventProducer, KafkaNotifier};
pub use redis_repo::RedisClient;
pub use reservation_repo::PgReservationLedger;
pub use trip_repo::PgTripDirectory;
