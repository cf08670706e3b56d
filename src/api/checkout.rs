use axum::extract::{Path, Query, State};
use axum::response::Redirect;
use axum::{Form, Json};
use serde::Deserialize;

use crate::api::AppState;
use crate::error::AppResult;
use crate::payments::types::CheckoutResult;
use crate::payments::validation::CheckoutForm;

/// Submit the checkout form for an order
pub async fn process_checkout(
    State(state): State<AppState>,
    Path(order_id): Path<u64>,
    Form(form): Form<CheckoutForm>,
) -> AppResult<Json<CheckoutResult>> {
    let result = state.gateway.process_payment(order_id, &form).await?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct ReturnParams {
    pub order: u64,
    pub sig: String,
}

/// Landing point after the buyer authenticates at Cielo
pub async fn cielo_return(
    State(state): State<AppState>,
    Query(params): Query<ReturnParams>,
) -> AppResult<Redirect> {
    let outcome = state
        .gateway
        .check_return(params.order, &params.sig)
        .await?;
    Ok(Redirect::to(&outcome.redirect))
}
