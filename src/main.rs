use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use cielo_gateway::api::{self, AppState};
use cielo_gateway::config::Config;
use cielo_gateway::orders::{InMemoryOrderRepository, OrderRepository};
use cielo_gateway::payments::providers::CieloProvider;
use cielo_gateway::payments::{CieloGateway, PaymentProvider};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    init_tracing();

    let config = Config::load()?;

    tracing::info!("Starting Cielo gateway");
    tracing::info!("Environment: {}", config.server.environment);
    tracing::info!("Cielo environment: {:?}", config.cielo.environment);
    tracing::info!(
        "Payment method: {}, contract: {:?}",
        config.gateway.kind.gateway_id(),
        config.gateway.store_contract
    );

    let orders = build_order_repository(&config).await?;

    let provider: Arc<dyn PaymentProvider> = Arc::new(
        CieloProvider::new(config.cielo.clone(), config.gateway.store_contract)
            .context("Failed to initialize Cielo provider")?,
    );

    let gateway = CieloGateway::new(config.gateway.clone(), provider, orders);
    let app = api::router(AppState {
        gateway: Arc::new(gateway),
        environment: config.server.environment.clone(),
    });

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,cielo_gateway=debug,tower_http=info"));

    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[cfg(feature = "database")]
async fn build_order_repository(config: &Config) -> anyhow::Result<Arc<dyn OrderRepository>> {
    let Some(db) = &config.database else {
        tracing::warn!("No database configured, orders are kept in memory");
        return Ok(Arc::new(InMemoryOrderRepository::new()));
    };

    let repository = cielo_gateway::database::order_repository(db).await?;
    Ok(Arc::new(repository))
}

#[cfg(not(feature = "database"))]
async fn build_order_repository(config: &Config) -> anyhow::Result<Arc<dyn OrderRepository>> {
    if config.database.is_some() {
        tracing::warn!("Database configured but the `database` feature is disabled");
    }
    Ok(Arc::new(InMemoryOrderRepository::new()))
}
