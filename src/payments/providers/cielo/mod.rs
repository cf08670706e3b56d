//! Cielo payment provider implementation
//!
//! Talks to the Cielo eCommerce XML webservice: transaction submission, status
//! queries and cancellations. Each call is a single POST carrying the XML
//! document in the `mensagem` form field.

pub mod xml;

use crate::error::{AppError, AppErrorKind, AppResult, ExternalError, InfrastructureError};
use crate::payments::traits::PaymentProvider;
use crate::payments::types::{
    Environment, StoreContract, TransactionRequest, TransactionResponse,
};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use self::xml::{Credentials, XmlError};

const PROVIDER: &str = "Cielo";

pub const TEST_ENDPOINT: &str = "https://qasecommerce.cielo.com.br/servicos/ecommwsec.do";
pub const PRODUCTION_ENDPOINT: &str = "https://ecommerce.cielo.com.br/servicos/ecommwsec.do";

// Public sandbox affiliations published by Cielo
const SANDBOX_WEBSERVICE_NUMBER: &str = "1006993069";
const SANDBOX_WEBSERVICE_KEY: &str =
    "25fbb99741c739dd84d7b06ec78c9bac718838630f30b112d033ce2e621b34f3";
const SANDBOX_BUYPAGE_NUMBER: &str = "1001734898";
const SANDBOX_BUYPAGE_KEY: &str =
    "e84827130b9837473681c2787007da5914d6359947015a5cdb2b8843db0fa832";

type HmacSha256 = Hmac<Sha256>;

fn default_timeout_secs() -> u64 {
    30
}

/// Cielo provider configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CieloConfig {
    #[serde(default)]
    pub environment: Environment,
    /// Store affiliation number
    #[serde(default)]
    pub affiliation_number: String,
    /// Store access key assigned by Cielo
    #[serde(default)]
    pub affiliation_key: String,
    /// Overrides the environment endpoint
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CieloConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Test,
            affiliation_number: String::new(),
            affiliation_key: String::new(),
            endpoint: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl CieloConfig {
    pub fn endpoint(&self) -> &str {
        match (&self.endpoint, self.environment) {
            (Some(endpoint), _) if !endpoint.trim().is_empty() => endpoint,
            (_, Environment::Test) => TEST_ENDPOINT,
            (_, Environment::Production) => PRODUCTION_ENDPOINT,
        }
    }

    /// Configured credentials, or the sandbox ones for an unconfigured test store
    pub fn credentials(&self, contract: StoreContract) -> Credentials {
        let unset =
            self.affiliation_number.trim().is_empty() || self.affiliation_key.trim().is_empty();

        if self.environment == Environment::Test && unset {
            let (number, key) = match contract {
                StoreContract::Webservice => (SANDBOX_WEBSERVICE_NUMBER, SANDBOX_WEBSERVICE_KEY),
                StoreContract::BuypageCielo => (SANDBOX_BUYPAGE_NUMBER, SANDBOX_BUYPAGE_KEY),
            };
            return Credentials {
                number: number.to_string(),
                key: key.to_string(),
            };
        }

        Credentials {
            number: self.affiliation_number.trim().to_string(),
            key: self.affiliation_key.trim().to_string(),
        }
    }
}

/// Cielo payment provider
pub struct CieloProvider {
    config: CieloConfig,
    credentials: Credentials,
    client: Client,
}

impl CieloProvider {
    /// Create a new Cielo provider instance
    pub fn new(config: CieloConfig, contract: StoreContract) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("cielo-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                AppError::new(AppErrorKind::Infrastructure(
                    InfrastructureError::Configuration {
                        message: format!("Failed to create HTTP client: {}", e),
                    },
                ))
            })?;

        let credentials = config.credentials(contract);

        info!(
            "Cielo provider initialized: environment={:?}, endpoint={}, affiliation={}",
            config.environment,
            config.endpoint(),
            credentials.number
        );

        Ok(Self {
            config,
            credentials,
            client,
        })
    }

    fn request_id() -> String {
        Uuid::new_v4().to_string()
    }

    fn xml_error(e: XmlError) -> AppError {
        AppError::new(AppErrorKind::External(ExternalError::InvalidResponse {
            provider: PROVIDER.to_string(),
            message: e.to_string(),
        }))
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length
        match HmacSha256::new_from_slice(self.credentials.key.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => unreachable!("HMAC can take key of any size"),
        }
    }

    /// POST one XML document, Latin-1 encoded, and interpret the answer.
    /// Single attempt.
    async fn make_request(&self, message: String) -> AppResult<TransactionResponse> {
        let endpoint = self.config.endpoint();

        let response = self
            .client
            .post(endpoint)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(xml::form_body(&message))
            .send()
            .await
            .map_err(|e| {
                error!("Cielo request failed: {}", e);
                if e.is_timeout() {
                    AppError::new(AppErrorKind::External(ExternalError::Timeout {
                        service: PROVIDER.to_string(),
                        seconds: self.config.timeout_secs,
                    }))
                } else {
                    AppError::new(AppErrorKind::External(ExternalError::PaymentProvider {
                        provider: PROVIDER.to_string(),
                        message: e.to_string(),
                        is_retryable: e.is_connect(),
                    }))
                }
            })?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await.map_err(|e| {
            error!("Failed to read Cielo response body: {}", e);
            AppError::provider(PROVIDER, format!("Failed to read response: {}", e))
        })?;
        let body = xml::decode_body(&bytes, content_type.as_deref());

        if !status.is_success() {
            error!("Cielo API error: HTTP {}", status);
            return Err(AppError::new(AppErrorKind::External(
                ExternalError::PaymentProvider {
                    provider: PROVIDER.to_string(),
                    message: format!("HTTP {}: {}", status, body),
                    is_retryable: status.is_server_error(),
                },
            )));
        }

        debug!("Cielo answered {} bytes", body.len());

        xml::parse_response(&body).map_err(|e| {
            error!("Failed to parse Cielo response: {}", e);
            Self::xml_error(e)
        })
    }
}

#[async_trait]
impl PaymentProvider for CieloProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn do_transaction(&self, request: &TransactionRequest) -> AppResult<TransactionResponse> {
        info!(
            "Submitting Cielo transaction: order={}, reference={}, amount={}, brand={}, installments={}",
            request.order_id,
            request.reference,
            request.amount_cents,
            request.brand,
            request.installments
        );

        let message = xml::transaction_request(request, &self.credentials, &Self::request_id())
            .map_err(Self::xml_error)?;
        let response = self.make_request(message).await?;

        match response.error() {
            Some(message) => warn!(
                "Cielo rejected transaction: reference={}, code={:?}, message={}",
                request.reference, response.error_code, message
            ),
            None => info!(
                "Cielo transaction created: reference={}, tid={:?}, status={:?}",
                request.reference,
                response.tid(),
                response.status
            ),
        }

        Ok(response)
    }

    async fn get_transaction(&self, tid: &str) -> AppResult<TransactionResponse> {
        info!("Querying Cielo transaction: tid={}", tid);

        let message = xml::query_request(tid, &self.credentials, &Self::request_id())
            .map_err(Self::xml_error)?;
        let response = self.make_request(message).await?;

        info!(
            "Cielo transaction state: tid={}, status={:?}",
            tid, response.status
        );

        Ok(response)
    }

    async fn cancel_transaction(
        &self,
        tid: &str,
        amount_cents: Option<u64>,
    ) -> AppResult<TransactionResponse> {
        info!(
            "Cancelling Cielo transaction: tid={}, amount={:?}",
            tid, amount_cents
        );

        let message = xml::cancel_request(tid, amount_cents, &self.credentials, &Self::request_id())
            .map_err(Self::xml_error)?;
        self.make_request(message).await
    }

    fn return_signature(&self, order_id: u64) -> String {
        let mut mac = self.mac();
        mac.update(order_id.to_string().as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn validate_return_signature(&self, order_id: u64, signature: &str) -> bool {
        let Ok(provided) = hex::decode(signature.trim()) else {
            return false;
        };

        let mut mac = self.mac();
        mac.update(order_id.to_string().as_bytes());
        // Constant-time comparison
        mac.verify_slice(&provided).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_provider() -> CieloProvider {
        let config = CieloConfig {
            affiliation_number: "1006993069".to_string(),
            affiliation_key: "test-key".to_string(),
            ..Default::default()
        };
        CieloProvider::new(config, StoreContract::Webservice).unwrap()
    }

    #[test]
    fn test_cielo_config_default() {
        let config = CieloConfig::default();
        assert_eq!(config.endpoint(), TEST_ENDPOINT);
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn test_endpoint_override_and_production() {
        let config = CieloConfig {
            environment: Environment::Production,
            ..Default::default()
        };
        assert_eq!(config.endpoint(), PRODUCTION_ENDPOINT);

        let config = CieloConfig {
            endpoint: Some("http://127.0.0.1:9999/ws".to_string()),
            ..config
        };
        assert_eq!(config.endpoint(), "http://127.0.0.1:9999/ws");
    }

    #[test]
    fn test_sandbox_credentials_fallback() {
        let config = CieloConfig::default();
        assert_eq!(
            config.credentials(StoreContract::Webservice).number,
            SANDBOX_WEBSERVICE_NUMBER
        );
        assert_eq!(
            config.credentials(StoreContract::BuypageCielo).number,
            SANDBOX_BUYPAGE_NUMBER
        );

        let production = CieloConfig {
            environment: Environment::Production,
            ..Default::default()
        };
        assert!(production
            .credentials(StoreContract::Webservice)
            .number
            .is_empty());
    }

    #[test]
    fn test_return_signature_roundtrip() {
        let provider = create_test_provider();
        let signature = provider.return_signature(57);

        assert_eq!(signature.len(), 64);
        assert!(provider.validate_return_signature(57, &signature));
        assert!(!provider.validate_return_signature(58, &signature));
    }

    #[test]
    fn test_return_signature_validation_invalid() {
        let provider = create_test_provider();
        assert!(!provider.validate_return_signature(57, "invalid_signature"));
        assert!(!provider.validate_return_signature(57, ""));
    }
}
