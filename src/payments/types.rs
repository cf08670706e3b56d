//! Payment types and data structures
//!
//! Card brands, Cielo product codes and transaction statuses, plus the
//! request/response shapes exchanged with the provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Card brands Cielo processes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardBrand {
    Visa,
    Mastercard,
    Diners,
    Discover,
    Elo,
    Amex,
    Jcb,
    Aura,
    #[serde(rename = "visaelectron")]
    VisaElectron,
    Maestro,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown card brand: {0}")]
pub struct UnknownCardBrand(pub String);

impl CardBrand {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardBrand::Visa => "visa",
            CardBrand::Mastercard => "mastercard",
            CardBrand::Diners => "diners",
            CardBrand::Discover => "discover",
            CardBrand::Elo => "elo",
            CardBrand::Amex => "amex",
            CardBrand::Jcb => "jcb",
            CardBrand::Aura => "aura",
            CardBrand::VisaElectron => "visaelectron",
            CardBrand::Maestro => "maestro",
        }
    }

    /// Human readable name shown in checkout messages
    pub fn display_name(&self) -> &'static str {
        match self {
            CardBrand::Visa => "Visa",
            CardBrand::Mastercard => "MasterCard",
            CardBrand::Diners => "Diners",
            CardBrand::Discover => "Discover",
            CardBrand::Elo => "Elo",
            CardBrand::Amex => "American Express",
            CardBrand::Jcb => "JCB",
            CardBrand::Aura => "Aura",
            CardBrand::VisaElectron => "Visa Electron",
            CardBrand::Maestro => "Maestro",
        }
    }

    pub fn is_debit(&self) -> bool {
        matches!(self, CardBrand::VisaElectron | CardBrand::Maestro)
    }

    /// Brand as Cielo expects it in `forma-pagamento`.
    ///
    /// Debit brands are not part of the Cielo vocabulary: Visa Electron goes
    /// out as `visa` and every other debit card as `mastercard`.
    pub fn wire_brand(&self, kind: PaymentMethodKind) -> CardBrand {
        match kind {
            PaymentMethodKind::Debit => match self {
                CardBrand::VisaElectron | CardBrand::Visa => CardBrand::Visa,
                _ => CardBrand::Mastercard,
            },
            PaymentMethodKind::Credit => *self,
        }
    }
}

impl FromStr for CardBrand {
    type Err = UnknownCardBrand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "visa" => Ok(CardBrand::Visa),
            "mastercard" => Ok(CardBrand::Mastercard),
            "diners" => Ok(CardBrand::Diners),
            "discover" => Ok(CardBrand::Discover),
            "elo" => Ok(CardBrand::Elo),
            "amex" => Ok(CardBrand::Amex),
            "jcb" => Ok(CardBrand::Jcb),
            "aura" => Ok(CardBrand::Aura),
            "visaelectron" => Ok(CardBrand::VisaElectron),
            "maestro" => Ok(CardBrand::Maestro),
            other => Err(UnknownCardBrand(other.to_string())),
        }
    }
}

impl fmt::Display for CardBrand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Integration mode agreed with Cielo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreContract {
    /// Buyer types card data on Cielo's hosted page
    #[default]
    BuypageCielo,
    /// Store collects card data and sends it to the webservice
    Webservice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Test,
    Production,
}

/// Value of the `autorizar` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AuthorizationMode {
    AuthenticateOnly = 0,
    AuthorizeIfAuthenticated = 1,
    #[default]
    AuthorizeAuthenticatedAndNot = 2,
    AuthorizeDirectly = 3,
}

impl TryFrom<u8> for AuthorizationMode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(AuthorizationMode::AuthenticateOnly),
            1 => Ok(AuthorizationMode::AuthorizeIfAuthenticated),
            2 => Ok(AuthorizationMode::AuthorizeAuthenticatedAndNot),
            3 => Ok(AuthorizationMode::AuthorizeDirectly),
            other => Err(format!("authorization mode must be 0..=3, got {}", other)),
        }
    }
}

impl From<AuthorizationMode> for u8 {
    fn from(mode: AuthorizationMode) -> Self {
        mode as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethodKind {
    #[default]
    Debit,
    Credit,
}

impl PaymentMethodKind {
    /// Payment method id recorded on orders paid through this gateway
    pub fn gateway_id(&self) -> &'static str {
        match self {
            PaymentMethodKind::Debit => "cielo_debit",
            PaymentMethodKind::Credit => "cielo_credit",
        }
    }
}

/// Who finances credit installments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallmentType {
    #[default]
    Store,
    Administrator,
}

/// Cielo `produto` code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductCode {
    CreditInFull,
    StoreInstallments,
    AdministratorInstallments,
    Debit,
}

impl ProductCode {
    pub fn for_payment(
        kind: PaymentMethodKind,
        installments: u32,
        installment_type: InstallmentType,
    ) -> Self {
        match kind {
            PaymentMethodKind::Debit => ProductCode::Debit,
            PaymentMethodKind::Credit if installments <= 1 => ProductCode::CreditInFull,
            PaymentMethodKind::Credit => match installment_type {
                InstallmentType::Store => ProductCode::StoreInstallments,
                InstallmentType::Administrator => ProductCode::AdministratorInstallments,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductCode::CreditInFull => "1",
            ProductCode::StoreInstallments => "2",
            ProductCode::AdministratorInstallments => "3",
            ProductCode::Debit => "A",
        }
    }
}

/// Card expiry month and four digit year
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardExpiry {
    pub month: u32,
    pub year: i32,
}

impl CardExpiry {
    /// `validade` field format (YYYYMM)
    pub fn to_cielo(&self) -> String {
        format!("{:04}{:02}", self.year, self.month)
    }
}

/// Raw card fields, only sent with the webservice store contract
#[derive(Clone, PartialEq, Eq)]
pub struct CardData {
    pub holder_name: String,
    pub number: String,
    pub expiry: CardExpiry,
    pub cvv: String,
}

impl CardData {
    pub fn last_digits(&self) -> &str {
        let start = self.number.len().saturating_sub(4);
        &self.number[start..]
    }
}

// Keeps PAN and CVV out of logs
impl fmt::Debug for CardData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardData")
            .field("holder_name", &self.holder_name)
            .field("number", &format_args!("****{}", self.last_digits()))
            .field("expiry", &self.expiry)
            .field("cvv", &"***")
            .finish()
    }
}

/// Transaction submitted to the provider
#[derive(Debug, Clone)]
pub struct TransactionRequest {
    pub order_id: u64,
    /// `{order_id}-{unix_timestamp}`, unique per attempt
    pub reference: String,
    /// Amount in centavos
    pub amount_cents: u64,
    pub brand: CardBrand,
    pub product: ProductCode,
    pub installments: u32,
    pub return_url: String,
    pub authorization: AuthorizationMode,
    pub capture: bool,
    pub card: Option<CardData>,
    pub created_at: DateTime<Utc>,
}

impl TransactionRequest {
    pub fn reference_for(order_id: u64, at: DateTime<Utc>) -> String {
        format!("{}-{}", order_id, at.timestamp())
    }
}

/// Cielo transaction status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Created,
    InProgress,
    Authenticated,
    NotAuthenticated,
    Authorized,
    NotAuthorized,
    Captured,
    Cancelled,
    Authenticating,
    Cancelling,
    Unknown(u8),
}

impl TransactionStatus {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => TransactionStatus::Created,
            1 => TransactionStatus::InProgress,
            2 => TransactionStatus::Authenticated,
            3 => TransactionStatus::NotAuthenticated,
            4 => TransactionStatus::Authorized,
            5 => TransactionStatus::NotAuthorized,
            6 => TransactionStatus::Captured,
            9 => TransactionStatus::Cancelled,
            10 => TransactionStatus::Authenticating,
            12 => TransactionStatus::Cancelling,
            other => TransactionStatus::Unknown(other),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            TransactionStatus::Created => 0,
            TransactionStatus::InProgress => 1,
            TransactionStatus::Authenticated => 2,
            TransactionStatus::NotAuthenticated => 3,
            TransactionStatus::Authorized => 4,
            TransactionStatus::NotAuthorized => 5,
            TransactionStatus::Captured => 6,
            TransactionStatus::Cancelled => 9,
            TransactionStatus::Authenticating => 10,
            TransactionStatus::Cancelling => 12,
            TransactionStatus::Unknown(code) => *code,
        }
    }

    pub fn is_paid(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Authorized | TransactionStatus::Captured
        )
    }
}

/// Interpreted provider answer. Every field is optional: an `erro` document
/// only fills the error fields, a `transacao` document the others.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionResponse {
    pub transaction_id: Option<String>,
    pub status: Option<TransactionStatus>,
    pub authentication_url: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    /// Authorization return code (`lr`)
    pub authorization_code: Option<String>,
    pub authorization_message: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

impl TransactionResponse {
    pub fn error(&self) -> Option<&str> {
        non_empty(&self.error_message)
    }

    pub fn tid(&self) -> Option<&str> {
        non_empty(&self.transaction_id)
    }

    pub fn authentication_url(&self) -> Option<&str> {
        non_empty(&self.authentication_url)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckoutOutcome {
    Success,
    Fail,
}

/// What the checkout caller gets back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutResult {
    pub result: CheckoutOutcome,
    pub redirect: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
}

impl CheckoutResult {
    pub fn success(redirect: impl Into<String>) -> Self {
        Self {
            result: CheckoutOutcome::Success,
            redirect: redirect.into(),
            messages: Vec::new(),
        }
    }

    pub fn fail(messages: Vec<String>) -> Self {
        Self {
            result: CheckoutOutcome::Fail,
            redirect: String::new(),
            messages,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result == CheckoutOutcome::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debit_brand_normalization() {
        assert_eq!(
            CardBrand::VisaElectron.wire_brand(PaymentMethodKind::Debit),
            CardBrand::Visa
        );
        assert_eq!(
            CardBrand::Maestro.wire_brand(PaymentMethodKind::Debit),
            CardBrand::Mastercard
        );
        assert_eq!(
            CardBrand::Elo.wire_brand(PaymentMethodKind::Credit),
            CardBrand::Elo
        );
    }

    #[test]
    fn test_product_code_selection() {
        assert_eq!(
            ProductCode::for_payment(PaymentMethodKind::Debit, 3, InstallmentType::Store),
            ProductCode::Debit
        );
        assert_eq!(
            ProductCode::for_payment(PaymentMethodKind::Credit, 1, InstallmentType::Store),
            ProductCode::CreditInFull
        );
        assert_eq!(
            ProductCode::for_payment(PaymentMethodKind::Credit, 4, InstallmentType::Administrator)
                .as_str(),
            "3"
        );
    }

    #[test]
    fn test_card_data_debug_is_masked() {
        let card = CardData {
            holder_name: "FULANO DE TAL".to_string(),
            number: "4012001037141112".to_string(),
            expiry: CardExpiry {
                month: 5,
                year: 2030,
            },
            cvv: "123".to_string(),
        };
        let debug = format!("{:?}", card);
        assert!(!debug.contains("4012001037141112"));
        assert!(!debug.contains("123\""));
        assert!(debug.contains("****1112"));
        assert_eq!(card.expiry.to_cielo(), "203005");
    }

    #[test]
    fn test_blank_fields_are_absent() {
        let response = TransactionResponse {
            transaction_id: Some("  ".to_string()),
            error_message: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(response.tid(), None);
        assert_eq!(response.error(), None);
    }

    #[test]
    fn test_authorization_mode_from_number() {
        assert_eq!(
            AuthorizationMode::try_from(3),
            Ok(AuthorizationMode::AuthorizeDirectly)
        );
        assert!(AuthorizationMode::try_from(7).is_err());
        assert_eq!(TransactionStatus::from_code(6), TransactionStatus::Captured);
        assert_eq!(TransactionStatus::from_code(42).code(), 42);
    }
}
