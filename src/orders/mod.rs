//! Orders as seen by the gateway
//!
//! The storefront owns orders; the gateway only needs the total, the status
//! and a metadata map where the transaction id and card brand are recorded.

pub mod in_memory;

use crate::error::AppResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub use in_memory::InMemoryOrderRepository;

/// Metadata key holding the Cielo transaction id
pub const META_TRANSACTION_ID: &str = "_transaction_id";
/// Metadata key holding the card brand sent to Cielo
pub const META_CARD_BRAND: &str = "_wc_cielo_card_brand";
/// Metadata key holding the sum of refunds issued so far
pub const META_REFUNDED_TOTAL: &str = "_cielo_refunded_total";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderStatus {
    #[default]
    Pending,
    OnHold,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::OnHold => "on-hold",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Failed => "failed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }

    /// Payment already received
    pub fn is_paid(&self) -> bool {
        matches!(self, OrderStatus::Processing | OrderStatus::Completed)
    }

    /// Paid, refunded or cancelled: a buyer return no longer changes it
    pub fn is_settled(&self) -> bool {
        self.is_paid() || matches!(self, OrderStatus::Refunded | OrderStatus::Cancelled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "on-hold" => Ok(OrderStatus::OnHold),
            "processing" => Ok(OrderStatus::Processing),
            "completed" => Ok(OrderStatus::Completed),
            "failed" => Ok(OrderStatus::Failed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "refunded" => Ok(OrderStatus::Refunded),
            other => Err(format!("unknown order status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    /// Order total in BRL
    pub total: Decimal,
    pub status: OrderStatus,
    pub payment_method: Option<String>,
    #[serde(default)]
    pub meta: HashMap<String, String>,
    #[serde(default)]
    pub notes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(id: u64, total: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id,
            total,
            status: OrderStatus::Pending,
            payment_method: None,
            meta: HashMap::new(),
            notes: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.meta.get(key).map(String::as_str)
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.meta(META_TRANSACTION_ID).filter(|tid| !tid.is_empty())
    }

    pub fn card_brand(&self) -> Option<&str> {
        self.meta(META_CARD_BRAND)
    }

    pub fn refunded_total(&self) -> Decimal {
        self.meta(META_REFUNDED_TOTAL)
            .and_then(|value| value.parse().ok())
            .unwrap_or(Decimal::ZERO)
    }

    /// Part of the total not refunded yet
    pub fn refundable(&self) -> Decimal {
        (self.total - self.refunded_total()).max(Decimal::ZERO)
    }
}

/// Order persistence used by the gateway
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Find an order by its ID
    async fn find_by_id(&self, id: u64) -> AppResult<Option<Order>>;

    /// Insert a new order, failing if the id is taken
    async fn insert(&self, order: &Order) -> AppResult<Order>;

    /// Write the given metadata entries, keeping the others
    async fn update_meta(&self, id: u64, entries: &[(&str, &str)]) -> AppResult<()>;

    async fn set_status(&self, id: u64, status: OrderStatus) -> AppResult<()>;

    async fn set_payment_method(&self, id: u64, payment_method: &str) -> AppResult<()>;

    async fn add_note(&self, id: u64, note: &str) -> AppResult<()>;

    /// Find an order, treating absence as an error
    async fn get(&self, id: u64) -> AppResult<Order> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| crate::error::AppError::not_found("Order", id))
    }
}
