use anyhow::{anyhow, Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::payments::providers::CieloConfig;
use crate::payments::types::{Environment, PaymentMethodKind};
use crate::payments::GatewaySettings;

/// Environment variable prefix; nested keys use `__`, e.g.
/// `CIELO__GATEWAY__STORE_CONTRACT=webservice`
pub const ENV_PREFIX: &str = "CIELO";
const CONFIG_FILE: &str = "config/gateway";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub cielo: CieloConfig,
    #[serde(default)]
    pub gateway: GatewaySettings,
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

impl Config {
    /// Load defaults, then `config/gateway.{toml,yaml,json}` if present, then
    /// `CIELO__*` environment variables.
    pub fn load() -> Result<Self> {
        let settings = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.environment", "development")?
            .add_source(config::File::with_name(CONFIG_FILE).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("gateway.methods"),
            )
            .build()
            .context("Failed to read configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Invalid configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port < 1024 {
            return Err(anyhow!(
                "Port must be at least 1024, got {}",
                self.server.port
            ));
        }

        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&self.server.environment.as_str()) {
            return Err(anyhow!(
                "Environment must be one of: {:?}, got {}",
                valid_environments,
                self.server.environment
            ));
        }

        if self.cielo.environment == Environment::Production
            && (self.cielo.affiliation_number.trim().is_empty()
                || self.cielo.affiliation_key.trim().is_empty())
        {
            return Err(anyhow!(
                "Cielo affiliation number and key are required in production"
            ));
        }

        if self.cielo.timeout_secs == 0 {
            return Err(anyhow!("Cielo timeout must be greater than 0"));
        }

        let gateway = &self.gateway;

        if gateway.public_url.trim().is_empty() {
            return Err(anyhow!("Gateway public URL cannot be empty"));
        }

        if gateway.methods.is_empty() {
            return Err(anyhow!("At least one card brand must be accepted"));
        }

        let wrong_kind: Vec<&str> = gateway
            .methods
            .iter()
            .filter(|brand| brand.is_debit() != (gateway.kind == PaymentMethodKind::Debit))
            .map(|brand| brand.as_str())
            .collect();
        if !wrong_kind.is_empty() {
            return Err(anyhow!(
                "Card brands {:?} do not match the {:?} payment method",
                wrong_kind,
                gateway.kind
            ));
        }

        // a 100% discount would charge nothing
        if gateway.debit_discount < Decimal::ZERO || gateway.debit_discount >= Decimal::ONE_HUNDRED
        {
            return Err(anyhow!(
                "Debit discount must be at least 0 and below 100, got {}",
                gateway.debit_discount
            ));
        }

        if !(1..=12).contains(&gateway.max_installments) {
            return Err(anyhow!(
                "Maximum installments must be between 1 and 12, got {}",
                gateway.max_installments
            ));
        }

        if let Some(database) = &self.database {
            if database.url.trim().is_empty() {
                return Err(anyhow!("Database URL cannot be empty"));
            }
            if database.max_connections == 0 {
                return Err(anyhow!("Database max connections must be greater than 0"));
            }
        }

        Ok(())
    }
}
