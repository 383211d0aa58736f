use anyhow::Context;
use coachline_api::{app, rate_limit_middleware, worker, AppState, AuthConfig, RateLimiter};
use coachline_booking::{BookingEngine, BookingPolicy, NotificationDispatcher};
use coachline_core::{LogNotifier, Notifier, SystemClock};
use coachline_store::{
    Config, DbClient, EventProducer, KafkaNotifier, PgReservationLedger, PgTripDirectory,
    RedisClient,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "coachline_api=debug,coachline_booking=debug,tower_http=debug,axum::rejection=trace".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Coachline API on port {}", config.server.port);

    // Postgres
    let db = DbClient::new(&config.database.url)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;
    let rules = match db.fetch_business_rules(config.business_rules.clone()).await {
        Ok(rules) => rules,
        Err(e) => {
            tracing::warn!("Could not load business rules from database, using file values: {}", e);
            config.business_rules.clone()
        }
    };

    // Kafka (notifications only; the API keeps working without it)
    let notifier: Arc<dyn Notifier> = match EventProducer::new(&config.kafka.brokers) {
        Ok(producer) => Arc::new(KafkaNotifier::new(producer, config.kafka.notification_topic.clone())),
        Err(e) => {
            tracing::warn!("Kafka unavailable, notifications will only be logged: {}", e);
            Arc::new(LogNotifier)
        }
    };

    let policy = BookingPolicy::from_seconds(
        rules.hold_seconds,
        rules.cancellation_cutoff_seconds,
        rules.reveal_window_seconds,
        rules.reminder_lead_seconds,
    );
    let engine = Arc::new(BookingEngine::new(
        Arc::new(PgTripDirectory::new(db.pool.clone())),
        Arc::new(PgReservationLedger::new(
            db.pool.clone(),
            Duration::from_millis(rules.lock_timeout_ms),
        )),
        NotificationDispatcher::new(notifier),
        Arc::new(SystemClock),
        policy,
    ));

    tokio::spawn(worker::start_sweeper(
        engine.clone(),
        Duration::from_secs(rules.sweep_interval_seconds),
    ));

    // Redis
    let redis = RedisClient::new(&config.redis.url)
        .await
        .context("Failed to connect to Redis")?;
    let limiter = RateLimiter {
        redis: Arc::new(redis),
        per_minute: rules.rate_limit_per_minute,
    };

    let app_state = AppState {
        engine,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
        webhook_secret: config.payments.webhook_secret.clone(),
    };

    let app = app(app_state).layer(axum::middleware::from_fn_with_state(limiter, rate_limit_middleware));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
