use event_bus::consumer_retry::{retry_with_backoff, RetryConfig};
use event_bus::{EventBus, InMemoryBus, NatsBus, Topology};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use mealplanner_rs::{
    config::{BusType, Config, StoreType},
    consumer::ConsumerSettings,
    db,
    dlq::DeadLetterPolicy,
    metrics::Metrics,
    repos::{InMemoryRecipeReadStore, PgRecipeReadStore, RecipeReadStore},
    routes::{self, AppState},
    start_recipe_events_consumer,
};

#[tokio::main]
async fn main() {
    // Load environment variables from .env file (if present)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    tracing::info!("Starting meal planner service...");

    let config = Config::from_env().expect("Failed to load configuration from environment");

    tracing::info!(
        host = %config.host,
        port = config.port,
        store_type = ?config.store_type,
        bus_type = ?config.bus_type,
        recipe_sync_enabled = config.recipe_sync_enabled,
        "Configuration loaded"
    );

    let store: Arc<dyn RecipeReadStore> = match config.store_type {
        StoreType::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .expect("DATABASE_URL is required for the postgres store");

            tracing::info!("Connecting to database...");
            let pool = db::init_pool(database_url)
                .await
                .expect("Failed to connect to database");

            tracing::info!("Running migrations...");
            db::run_migrations(&pool)
                .await
                .expect("Failed to run migrations");

            Arc::new(PgRecipeReadStore::new(pool))
        }
        StoreType::InMemory => {
            tracing::warn!("Using in-memory read model; contents are lost on restart");
            Arc::new(InMemoryRecipeReadStore::new())
        }
    };

    let metrics = Metrics::new().expect("Failed to register metrics");
    let shutdown = CancellationToken::new();

    let consumer = if config.recipe_sync_enabled {
        match connect_bus(&config).await {
            Ok(bus) => {
                let topology = Topology::new(
                    config.recipe_events_exchange.clone(),
                    config.recipe_events_queue.clone(),
                    config.recipe_events_binding.clone(),
                );
                let settings = ConsumerSettings {
                    dead_letter: DeadLetterPolicy::for_topology(
                        &topology,
                        config.recipe_events_dlq_subject.clone(),
                        config.max_deliveries,
                    ),
                    topology,
                    setup_retry: RetryConfig::default(),
                    metrics: metrics.clone(),
                };

                match start_recipe_events_consumer(bus, store.clone(), settings, shutdown.clone())
                    .await
                {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        tracing::error!(
                            error = %e,
                            "Recipe sync unavailable; serving from the current read model"
                        );
                        None
                    }
                }
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    "Failed to connect to broker; serving from the current read model"
                );
                None
            }
        }
    } else {
        tracing::info!("Recipe sync disabled");
        None
    };

    let app = routes::router(AppState::new(store, metrics));

    let ip = config
        .host
        .parse::<std::net::IpAddr>()
        .expect("HOST must be a valid IP address");
    let addr = SocketAddr::new(ip, config.port);
    tracing::info!("Meal planner service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutdown signal received");
            server_shutdown.cancel();
        })
        .await
        .expect("Server failed to start");

    // Server may have stopped for a reason other than the signal
    shutdown.cancel();
    if let Some(handle) = consumer {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Recipe events consumer task failed");
        }
    }

    tracing::info!("Meal planner service stopped");
}

async fn connect_bus(config: &Config) -> Result<Arc<dyn EventBus>, async_nats::ConnectError> {
    match config.bus_type {
        BusType::InMemory => {
            tracing::info!("Using InMemory event bus");
            Ok(Arc::new(InMemoryBus::new()))
        }
        BusType::Nats => {
            tracing::info!("Connecting to NATS at {}", config.nats_url);
            let client = retry_with_backoff(
                || async_nats::connect(config.nats_url.as_str()),
                &RetryConfig::default(),
                "connect_nats",
                |_| true,
            )
            .await?;
            Ok(Arc::new(NatsBus::new(client)))
        }
    }
}
