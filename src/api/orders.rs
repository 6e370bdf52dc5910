use crate::api::auth::AuthUser;
use crate::api::AppState;
use crate::core::retry::{execute_with_retry, ExecuteOrderResponse};
use crate::domain::model::OrderRequest;
use crate::utils::error::TradeError;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;

pub async fn health() -> Json<&'static str> {
    Json("Hello world")
}

pub async fn execute_order(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<OrderRequest>, JsonRejection>,
) -> Result<Json<ExecuteOrderResponse>, TradeError> {
    // 任何無效的 body 都回 422
    let Json(payload) = payload.map_err(|e| TradeError::Unprocessable(e.body_text()))?;

    tracing::info!(
        subject = user.subject().unwrap_or("-"),
        account = %payload.account,
        "executeOrder"
    );

    let response = execute_with_retry(
        state.rebalancer.as_ref(),
        state.notifier.as_ref(),
        &payload,
        &state.retry,
    )
    .await?;

    Ok(Json(response))
}
