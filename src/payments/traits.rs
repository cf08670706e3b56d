//! Payment provider trait definitions
//!
//! Defines the interface the checkout workflow expects from a card processor.

use crate::error::AppResult;
use crate::payments::types::{TransactionRequest, TransactionResponse};
use async_trait::async_trait;

/// Trait for payment provider implementations
///
/// Every remote call is made exactly once. A provider-level rejection (card
/// declined, invalid data) is not an `Err`: it comes back as a
/// [`TransactionResponse`] carrying an error message. `Err` is reserved for
/// transport and protocol failures.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Provider name used in logs and errors
    fn name(&self) -> &'static str;

    /// Submit a new transaction
    ///
    /// # Returns
    /// * `TransactionResponse` - transaction id, authentication URL or error message
    async fn do_transaction(&self, request: &TransactionRequest) -> AppResult<TransactionResponse>;

    /// Query the current state of a transaction by its id
    async fn get_transaction(&self, tid: &str) -> AppResult<TransactionResponse>;

    /// Cancel a transaction, fully when `amount_cents` is `None`
    async fn cancel_transaction(
        &self,
        tid: &str,
        amount_cents: Option<u64>,
    ) -> AppResult<TransactionResponse>;

    /// Signature appended to the return URL of an order
    fn return_signature(&self, order_id: u64) -> String;

    /// Validate the signature the buyer's browser brings back on return
    ///
    /// # Returns
    /// * `bool` - True if signature is valid, false otherwise
    fn validate_return_signature(&self, order_id: u64, signature: &str) -> bool;
}
