//! HTTP surface of the gateway

pub mod checkout;
pub mod health;
pub mod orders;

use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use http::StatusCode;
use serde::Serialize;
use std::sync::Arc;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::error::{AppError, AppErrorKind, ExternalError};
use crate::payments::CieloGateway;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<CieloGateway>,
    pub environment: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/orders", post(orders::create_order))
        .route("/orders/:id", get(orders::get_order))
        .route("/orders/:id/refund", post(orders::refund_order))
        .route("/checkout/:order_id", post(checkout::process_checkout))
        .route("/cielo/return", get(checkout::cielo_return))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match &self.kind {
            AppErrorKind::Validation { .. } => (StatusCode::BAD_REQUEST, "validation_error"),
            AppErrorKind::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            AppErrorKind::Unauthorized { .. } => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppErrorKind::Conflict { .. } => (StatusCode::CONFLICT, "conflict"),
            AppErrorKind::External(ExternalError::Timeout { .. }) => {
                (StatusCode::GATEWAY_TIMEOUT, "provider_timeout")
            }
            AppErrorKind::External(_) => (StatusCode::BAD_GATEWAY, "provider_error"),
            AppErrorKind::Infrastructure(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        let body = ErrorResponse {
            error: code,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
