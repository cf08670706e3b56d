use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::payments::types::{PaymentMethodKind, StoreContract};

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub environment: String,
    pub provider: String,
    pub payment_method: PaymentMethodKind,
    pub store_contract: StoreContract,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let settings = state.gateway.settings();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        environment: state.environment.clone(),
        provider: state.gateway.provider_name().to_string(),
        payment_method: settings.kind,
        store_contract: settings.store_contract,
    })
}
