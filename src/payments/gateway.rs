//! Checkout workflow
//!
//! [`CieloGateway`] runs the transaction submission for one order: collect the
//! checkout input, dispatch a single transaction to the provider, record the
//! transaction id on the order and map the answer to a [`CheckoutResult`].
//! It also finalizes orders when the buyer comes back from Cielo and issues
//! refunds.

use crate::error::{AppError, AppResult, ExternalError};
use crate::orders::{
    Order, OrderRepository, OrderStatus, META_CARD_BRAND, META_REFUNDED_TOTAL, META_TRANSACTION_ID,
};
use crate::payments::traits::PaymentProvider;
use crate::payments::types::{
    AuthorizationMode, CardBrand, CheckoutResult, InstallmentType, PaymentMethodKind, ProductCode,
    StoreContract, TransactionRequest, TransactionResponse, TransactionStatus,
};
use crate::payments::validation::{self, CheckoutForm};
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Shown to the buyer when the failure is on our side or Cielo's transport
pub const GENERIC_CHECKOUT_ERROR: &str =
    "An error has occurred while processing your payment, please try again.";

fn default_methods() -> Vec<CardBrand> {
    vec![CardBrand::VisaElectron]
}

fn default_max_installments() -> u32 {
    3
}

fn default_smallest_installment() -> Decimal {
    Decimal::from(5)
}

fn default_public_url() -> String {
    "http://localhost:8080".to_string()
}

/// Store-side gateway settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySettings {
    #[serde(default)]
    pub kind: PaymentMethodKind,
    #[serde(default)]
    pub store_contract: StoreContract,
    /// Accepted card brands
    #[serde(default = "default_methods")]
    pub methods: Vec<CardBrand>,
    #[serde(default)]
    pub authorization: AuthorizationMode,
    /// Percentage discount for debit card payments
    #[serde(default)]
    pub debit_discount: Decimal,
    #[serde(default = "default_max_installments")]
    pub max_installments: u32,
    /// Minimum value of a single credit installment
    #[serde(default = "default_smallest_installment")]
    pub smallest_installment: Decimal,
    #[serde(default)]
    pub installment_type: InstallmentType,
    /// Public base URL of this service, used to build return URLs
    #[serde(default = "default_public_url")]
    pub public_url: String,
    /// Where the buyer lands after returning; `{order_id}` is substituted
    #[serde(default)]
    pub order_received_url: Option<String>,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            kind: PaymentMethodKind::Debit,
            store_contract: StoreContract::BuypageCielo,
            methods: default_methods(),
            authorization: AuthorizationMode::default(),
            debit_discount: Decimal::ZERO,
            max_installments: default_max_installments(),
            smallest_installment: default_smallest_installment(),
            installment_type: InstallmentType::Store,
            public_url: default_public_url(),
            order_received_url: None,
        }
    }
}

impl GatewaySettings {
    /// Amount charged for an order total, after the debit discount
    pub fn payable_total(&self, total: Decimal) -> Decimal {
        if self.kind != PaymentMethodKind::Debit || self.debit_discount <= Decimal::ZERO {
            return total;
        }

        (total * (Decimal::ONE_HUNDRED - self.debit_discount) / Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }

    pub fn order_received_url(&self, order_id: u64) -> String {
        match &self.order_received_url {
            Some(template) if !template.trim().is_empty() => {
                template.replace("{order_id}", &order_id.to_string())
            }
            _ => format!(
                "{}/checkout/order-received/{}",
                self.public_url.trim_end_matches('/'),
                order_id
            ),
        }
    }
}

/// Amount in centavos
pub fn to_cents(amount: Decimal) -> AppResult<u64> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u64()
        .filter(|cents| *cents > 0)
        .ok_or_else(|| AppError::validation(format!("Invalid payment amount: {}", amount)))
}

/// Result of the buyer coming back from Cielo
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReturnOutcome {
    pub order_id: u64,
    pub order_status: OrderStatus,
    pub transaction_status: TransactionStatus,
    pub redirect: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefundOutcome {
    pub order_id: u64,
    pub amount: Decimal,
    pub full: bool,
    pub order_status: OrderStatus,
}

/// Order status and note for a transaction status reported on return
fn return_transition(status: TransactionStatus) -> (OrderStatus, String) {
    match status {
        TransactionStatus::Authorized => (
            OrderStatus::Processing,
            "Cielo: transaction authorized.".to_string(),
        ),
        TransactionStatus::Captured => (
            OrderStatus::Processing,
            "Cielo: transaction captured.".to_string(),
        ),
        TransactionStatus::Created
        | TransactionStatus::InProgress
        | TransactionStatus::Authenticated
        | TransactionStatus::Authenticating => (
            OrderStatus::OnHold,
            "Cielo: awaiting transaction authorization.".to_string(),
        ),
        TransactionStatus::NotAuthenticated => (
            OrderStatus::Failed,
            "Cielo: transaction not authenticated.".to_string(),
        ),
        TransactionStatus::NotAuthorized => (
            OrderStatus::Failed,
            "Cielo: transaction not authorized.".to_string(),
        ),
        TransactionStatus::Cancelled | TransactionStatus::Cancelling => (
            OrderStatus::Cancelled,
            "Cielo: transaction cancelled.".to_string(),
        ),
        TransactionStatus::Unknown(code) => (
            OrderStatus::OnHold,
            format!("Cielo: unknown transaction status {}.", code),
        ),
    }
}

pub struct CieloGateway {
    settings: GatewaySettings,
    provider: Arc<dyn PaymentProvider>,
    orders: Arc<dyn OrderRepository>,
}

impl CieloGateway {
    pub fn new(
        settings: GatewaySettings,
        provider: Arc<dyn PaymentProvider>,
        orders: Arc<dyn OrderRepository>,
    ) -> Self {
        Self {
            settings,
            provider,
            orders,
        }
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    pub fn orders(&self) -> &Arc<dyn OrderRepository> {
        &self.orders
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Signed URL Cielo sends the buyer back to
    pub fn return_url(&self, order_id: u64) -> String {
        format!(
            "{}/cielo/return?order={}&sig={}",
            self.settings.public_url.trim_end_matches('/'),
            order_id,
            self.provider.return_signature(order_id)
        )
    }

    /// Run the checkout for an order.
    ///
    /// Buyer-facing problems (invalid input, declined card, missing redirect)
    /// come back as a failed [`CheckoutResult`]; `Err` means the order could
    /// not be loaded or updated.
    pub async fn process_payment(
        &self,
        order_id: u64,
        form: &CheckoutForm,
    ) -> AppResult<CheckoutResult> {
        let order = self.orders.get(order_id).await?;

        if order.status.is_paid() {
            warn!(
                "Checkout attempted on paid order: order={}, status={}",
                order.id, order.status
            );
            return Ok(CheckoutResult::fail(vec![
                "This order has already been paid.".to_string(),
            ]));
        }

        let now = Utc::now();
        let input = match validation::collect(form, &self.settings, order.total, now.date_naive())
        {
            Ok(input) => input,
            Err(messages) => {
                info!(
                    "Checkout input rejected: order={}, errors={}",
                    order.id,
                    messages.len()
                );
                return Ok(CheckoutResult::fail(messages));
            }
        };

        let payable = self.settings.payable_total(order.total);
        let amount_cents = match to_cents(payable) {
            Ok(cents) => cents,
            Err(e) => {
                error!(
                    "Order amount cannot be charged: order={}, total={}, payable={}, error={}",
                    order.id, order.total, payable, e
                );
                return Ok(CheckoutResult::fail(vec![GENERIC_CHECKOUT_ERROR.to_string()]));
            }
        };

        let brand = input.brand.wire_brand(self.settings.kind);
        let request = TransactionRequest {
            order_id: order.id,
            reference: TransactionRequest::reference_for(order.id, now),
            amount_cents,
            brand,
            product: ProductCode::for_payment(
                self.settings.kind,
                input.installments,
                self.settings.installment_type,
            ),
            installments: input.installments,
            return_url: self.return_url(order.id),
            authorization: self.settings.authorization,
            capture: true,
            card: input.card,
            created_at: now,
        };

        let response = match self.provider.do_transaction(&request).await {
            Ok(response) => response,
            Err(e) => {
                error!(
                    "Transaction submission failed: order={}, reference={}, error={}",
                    order.id, request.reference, e
                );
                return Ok(CheckoutResult::fail(vec![GENERIC_CHECKOUT_ERROR.to_string()]));
            }
        };

        self.interpret(&order, brand, &response).await
    }

    async fn interpret(
        &self,
        order: &Order,
        brand: CardBrand,
        response: &TransactionResponse,
    ) -> AppResult<CheckoutResult> {
        if let Some(tid) = response.tid() {
            self.orders
                .update_meta(
                    order.id,
                    &[(META_TRANSACTION_ID, tid), (META_CARD_BRAND, brand.as_str())],
                )
                .await?;
            self.orders
                .set_payment_method(order.id, self.settings.kind.gateway_id())
                .await?;
        }

        if let Some(message) = response.error() {
            return Ok(CheckoutResult::fail(vec![message.to_string()]));
        }

        let redirect = match self.settings.store_contract {
            StoreContract::BuypageCielo => response.authentication_url().map(str::to_string),
            StoreContract::Webservice => response.tid().map(|_| self.return_url(order.id)),
        };

        match redirect {
            Some(redirect) if !redirect.is_empty() => {
                info!(
                    "Checkout submitted: order={}, tid={:?}",
                    order.id,
                    response.tid()
                );
                Ok(CheckoutResult::success(redirect))
            }
            _ => {
                warn!(
                    "Cielo answer carried no redirect: order={}, status={:?}",
                    order.id, response.status
                );
                Ok(CheckoutResult::fail(vec![GENERIC_CHECKOUT_ERROR.to_string()]))
            }
        }
    }

    /// Finalize an order after the buyer returns from Cielo.
    pub async fn check_return(&self, order_id: u64, signature: &str) -> AppResult<ReturnOutcome> {
        if !self.provider.validate_return_signature(order_id, signature) {
            warn!("Rejected return with invalid signature: order={}", order_id);
            return Err(AppError::unauthorized("Invalid return signature"));
        }

        let order = self.orders.get(order_id).await?;
        let tid = order
            .transaction_id()
            .ok_or_else(|| {
                AppError::validation(format!("Order '{}' has no Cielo transaction", order_id))
            })?
            .to_string();

        let response = self.provider.get_transaction(&tid).await?;

        if let Some(message) = response.error() {
            self.orders
                .add_note(order_id, &format!("Cielo: {}", message))
                .await?;
            return Err(AppError::provider(self.provider.name(), message));
        }

        let status = response.status.ok_or_else(|| {
            AppError::from(ExternalError::InvalidResponse {
                provider: self.provider.name().to_string(),
                message: format!("no status for transaction {}", tid),
            })
        })?;

        // Repeated returns must not reopen a paid, refunded or cancelled order
        let order_status = if order.status.is_settled() {
            order.status
        } else {
            let (next, note) = return_transition(status);
            self.orders.set_status(order_id, next).await?;
            self.orders.add_note(order_id, &note).await?;
            next
        };

        info!(
            "Order finalized from return: order={}, tid={}, transaction_status={:?}, order_status={}",
            order_id, tid, status, order_status
        );

        Ok(ReturnOutcome {
            order_id,
            order_status,
            transaction_status: status,
            redirect: self.settings.order_received_url(order_id),
        })
    }

    /// Cancel the order's transaction. A missing `amount` refunds whatever is
    /// left; the refund is full once nothing refundable remains.
    pub async fn process_refund(
        &self,
        order_id: u64,
        amount: Option<Decimal>,
        reason: Option<&str>,
    ) -> AppResult<RefundOutcome> {
        let order = self.orders.get(order_id).await?;

        if !order.status.is_paid() {
            return Err(AppError::validation(format!(
                "Order '{}' is {} and cannot be refunded",
                order_id, order.status
            )));
        }

        let tid = order
            .transaction_id()
            .ok_or_else(|| {
                AppError::validation(format!("Order '{}' has no Cielo transaction", order_id))
            })?
            .to_string();

        let refunded = order.refunded_total();
        let remaining = order.refundable();
        let amount = amount.unwrap_or(remaining);
        if amount <= Decimal::ZERO || amount > remaining {
            return Err(AppError::validation(format!(
                "Refund amount must be greater than 0 and at most {}",
                remaining
            )));
        }

        let full = amount == remaining;
        // without `valor` Cielo cancels the rest of the transaction
        let amount_cents = if full { None } else { Some(to_cents(amount)?) };

        let response = self.provider.cancel_transaction(&tid, amount_cents).await?;
        if let Some(message) = response.error() {
            self.orders
                .add_note(order_id, &format!("Cielo: refund failed: {}", message))
                .await?;
            return Err(AppError::provider(self.provider.name(), message));
        }

        let refunded_total = (refunded + amount).to_string();
        self.orders
            .update_meta(order_id, &[(META_REFUNDED_TOTAL, refunded_total.as_str())])
            .await?;

        let order_status = if full {
            self.orders.set_status(order_id, OrderStatus::Refunded).await?;
            OrderStatus::Refunded
        } else {
            order.status
        };

        let note = match reason.map(str::trim).filter(|r| !r.is_empty()) {
            Some(reason) => format!("Cielo: refunded R$ {} ({}).", amount, reason),
            None => format!("Cielo: refunded R$ {}.", amount),
        };
        self.orders.add_note(order_id, &note).await?;

        info!(
            "Refund processed: order={}, tid={}, amount={}, full={}",
            order_id, tid, amount, full
        );

        Ok(RefundOutcome {
            order_id,
            amount,
            full,
            order_status,
        })
    }
}
