//! HTTP surface: health check and the protected `/executeOrder` route.

pub mod auth;
pub mod orders;

use crate::core::retry::RetryPolicy;
use crate::domain::ports::{Notifier, Rebalancer};
use crate::utils::error::{error_body, TradeError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub rebalancer: Arc<dyn Rebalancer>,
    pub notifier: Arc<dyn Notifier>,
    pub retry: RetryPolicy,
    pub secret_key: Option<String>,
}

impl IntoResponse for TradeError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!("{} {}", status, self);
        }
        (status, Json(error_body(&self))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(orders::health))
        .route("/executeOrder", post(orders::execute_order))
        // 允許所有來源 (正式環境請收斂)
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
