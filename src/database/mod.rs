// PostgreSQL order store, only built with the `database` feature
#![cfg(feature = "database")]

pub mod error;
pub mod order_repository;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{info, warn};

use self::error::DatabaseError;
use crate::config::DatabaseConfig;

pub use order_repository::PgOrderRepository;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);
const IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// Open the pool described by the `database` config section
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, DatabaseError> {
    info!(
        "Connecting order store: max_connections={}",
        config.max_connections
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(1)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .idle_timeout(IDLE_TIMEOUT)
        .connect(&config.url)
        .await
        .map_err(|e| DatabaseError::from(e).with_context("connect"))?;

    ping(&pool).await?;
    Ok(pool)
}

/// Connect and make sure the orders table exists
pub async fn order_repository(config: &DatabaseConfig) -> Result<PgOrderRepository, DatabaseError> {
    let repository = PgOrderRepository::new(connect(config).await?);
    repository.ensure_schema().await?;
    info!("Order store ready");
    Ok(repository)
}

pub async fn ping(pool: &PgPool) -> Result<(), DatabaseError> {
    sqlx::query("SELECT 1").execute(pool).await.map_err(|e| {
        warn!("Order store ping failed: {}", e);
        DatabaseError::from(e).with_context("ping")
    })?;
    Ok(())
}
