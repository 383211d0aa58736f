use coachline_booking::BookingEngine;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Runs the booking sweep on a fixed interval until the process exits.
/// Intervals below one second are raised to one second.
pub async fn start_sweeper(engine: Arc<BookingEngine>, every: Duration) {
    let every = every.max(MIN_SWEEP_INTERVAL);
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Reservation sweeper started, running every {:?}", every);

    loop {
        ticker.tick().await;
        if let Err(e) = engine.sweep().await {
            error!("Reservation sweep failed: {}", e);
        }
    }
}
