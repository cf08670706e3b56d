use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::api::AppState;
use crate::error::{AppError, AppResult};
use crate::orders::Order;
use crate::payments::gateway::RefundOutcome;

/// One centavo
const MIN_ORDER_TOTAL: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub id: u64,
    pub total: Decimal,
}

/// Register an order handed over by the storefront
pub async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> AppResult<(StatusCode, Json<Order>)> {
    if request.total < MIN_ORDER_TOTAL {
        return Err(AppError::validation(format!(
            "Order total must be at least {}",
            MIN_ORDER_TOTAL
        )));
    }

    let order = state
        .gateway
        .orders()
        .insert(&Order::new(request.id, request.total))
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> AppResult<Json<Order>> {
    let order = state.gateway.orders().get(id).await?;
    Ok(Json(order))
}

#[derive(Debug, Default, Deserialize)]
pub struct RefundRequest {
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn refund_order(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<RefundRequest>,
) -> AppResult<Json<RefundOutcome>> {
    let outcome = state
        .gateway
        .process_refund(id, request.amount, request.reason.as_deref())
        .await?;
    Ok(Json(outcome))
}
