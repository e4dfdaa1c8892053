//! Circulation Server - loans and reservations for a lending library

use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use circulation_server::{
    api,
    clock::SystemClock,
    config::{AppConfig, StorageBackend},
    repository::{MemoryStore, Repository},
    services::Services,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;

    init_tracing(&config);

    tracing::info!("Starting Circulation Server v{}", env!("CARGO_PKG_VERSION"));

    config.lending.validate()?;

    let repository = match config.storage.backend {
        StorageBackend::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database.max_connections)
                .min_connections(config.database.min_connections)
                .connect(&config.database.url)
                .await?;
            tracing::info!("Connected to database");

            sqlx::migrate!("./migrations").run(&pool).await?;
            tracing::info!("Database migrations completed");

            Repository::postgres(pool)
        }
        StorageBackend::Memory => {
            let store = MemoryStore::new();
            for item in &config.storage.seed_items {
                let item = store.register_item(item.clone()).await?;
                tracing::debug!("Seeded item {} ({})", item.id, item.isbn);
            }
            tracing::warn!(
                "Using in-memory storage with {} seeded item(s); nothing survives a restart",
                config.storage.seed_items.len()
            );
            Repository::in_memory(store)
        }
    };

    let services = Services::new(repository, Arc::new(SystemClock), config.lending);

    spawn_expiry_sweep(services.clone(), config.reservations.sweep_interval_secs);

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);

    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };

    let app = api::create_router(state);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("circulation_server={},tower_http=debug", config.logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Periodically expire reservations nobody picked up in time
fn spawn_expiry_sweep(services: Services, interval_secs: u64) {
    if interval_secs == 0 {
        tracing::info!("Reservation expiry sweep disabled");
        return;
    }

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            interval.tick().await;
            match services.reservations.expire_overdue().await {
                Ok(0) => {}
                Ok(expired) => tracing::info!("Expiry sweep closed {} reservation(s)", expired),
                Err(e) => tracing::error!("Expiry sweep failed: {}", e),
            }
        }
    });
}
