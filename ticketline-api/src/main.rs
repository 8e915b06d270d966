use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ticketline_api::{app, worker, AppState};
use ticketline_catalog::{InventoryLedger, MemoryInventoryLedger};
use ticketline_order::{MemoryOrderRepository, MemoryPaymentRepository, OrderRepository, PaymentRepository};
use ticketline_store::app_config::{InventoryBackend, StorageBackend};
use ticketline_store::{
    Config, DbClient, PostgresOrderRepository, PostgresPaymentRepository, RedisInventoryLedger,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ticketline_api=debug,ticketline_order=info,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Ticketline API on port {}", config.server.port);

    // Inventory ledger
    let ledger: Arc<dyn InventoryLedger> = match config.inventory.backend {
        InventoryBackend::Memory => Arc::new(MemoryInventoryLedger::new()),
        InventoryBackend::Redis => {
            let url = config
                .inventory
                .redis_url
                .as_deref()
                .context("inventory.redis_url is required for the redis backend")?;
            Arc::new(RedisInventoryLedger::new(url).await.context("Failed to connect to Redis")?)
        }
    };

    // Order and payment stores
    let (orders, payments): (Arc<dyn OrderRepository>, Arc<dyn PaymentRepository>) = match config.storage.backend {
        StorageBackend::Memory => (
            Arc::new(MemoryOrderRepository::new()),
            Arc::new(MemoryPaymentRepository::new()),
        ),
        StorageBackend::Postgres => {
            let url = config
                .storage
                .database_url
                .as_deref()
                .context("storage.database_url is required for the postgres backend")?;
            let db = DbClient::new(url, config.storage.max_connections)
                .await
                .context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;
            (
                Arc::new(PostgresOrderRepository::new(db.pool.clone())),
                Arc::new(PostgresPaymentRepository::new(db.pool)),
            )
        }
    };

    if config.inventory.backend == InventoryBackend::Memory && config.storage.backend == StorageBackend::Postgres {
        tracing::warn!("In-memory inventory is private to this process; run a single node or use the redis backend");
    }

    let app_state = AppState::new(&config, ledger, orders, payments);

    app_state
        .coordinator
        .seed_inventory(&config.timetable)
        .await
        .context("Failed to seed inventory")?;

    tokio::spawn(worker::start_expiry_sweeper(
        app_state.coordinator.clone(),
        std::time::Duration::from_secs(config.business_rules.sweep_interval_seconds.max(1)),
    ));

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
