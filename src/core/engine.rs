use async_trait::async_trait;
use crate::core::executor::{
    align_leverage, ensure_isolated, execute_market_orders, ExecutionOptions,
};
use crate::core::planner;
use crate::domain::model::{
    Account, AccountSecret, ExecutionReport, OrderBook, OrderRequest, RebalanceResult,
};
use crate::domain::ports::{ExchangeApi, Rebalancer, SecretStore, TraderFactory, TradingClient};
use crate::utils::error::{Result, TradeError};
use serde_json::json;
use std::collections::HashMap;

/// Runs a single rebalance attempt for one account.
pub struct RebalanceEngine<E, S, F> {
    exchange: E,
    secrets: S,
    traders: F,
    options: ExecutionOptions,
}

impl<E, S, F> RebalanceEngine<E, S, F>
where
    E: ExchangeApi,
    S: SecretStore,
    F: TraderFactory,
{
    pub fn new(exchange: E, secrets: S, traders: F) -> Self {
        Self::with_options(exchange, secrets, traders, ExecutionOptions::default())
    }

    pub fn with_options(exchange: E, secrets: S, traders: F, options: ExecutionOptions) -> Self {
        Self {
            exchange,
            secrets,
            traders,
            options,
        }
    }

    async fn load_secret(&self, secret_id: &str) -> Result<AccountSecret> {
        self.secrets
            .load(secret_id)
            .await
            .map_err(|e| TradeError::Upstream(format!("Failed to fetch secret: {}", e)))
    }

    async fn fetch_account(&self, wallet_address: &str) -> Result<Account> {
        let response = self.exchange.account_by_l1_address(wallet_address).await?;
        response
            .accounts
            .into_iter()
            .next()
            .ok_or_else(|| TradeError::Upstream("Invalid future account response".to_string()))
    }

    async fn fetch_account_index(&self, wallet_address: &str) -> Result<i64> {
        let account = self.fetch_account(wallet_address).await.map_err(|e| {
            TradeError::Upstream(format!("Failed to fetch account index: {}", e))
        })?;
        if account.index == 0 {
            return Err(TradeError::Upstream(
                "Failed to fetch account index: Invalid account index response".to_string(),
            ));
        }
        Ok(account.index)
    }

    async fn fetch_market_state(
        &self,
        wallet_address: &str,
    ) -> Result<(HashMap<String, f64>, Vec<OrderBook>, Account)> {
        let prices = match self.exchange.exchange_stats().await {
            Ok(stats) if !stats.order_book_stats.is_empty() => {
                planner::price_map(&stats.order_book_stats)
            }
            Ok(_) => {
                return Err(TradeError::Upstream(
                    "Failed to fetch future market price: Invalid market price response"
                        .to_string(),
                ))
            }
            Err(e) => {
                return Err(TradeError::Upstream(format!(
                    "Failed to fetch future market price: {}",
                    e
                )))
            }
        };

        let books = self
            .exchange
            .order_books()
            .await
            .map_err(|e| {
                TradeError::Upstream(format!("Failed to fetch future exchange info: {}", e))
            })?
            .order_books;

        let account = self.fetch_account(wallet_address).await.map_err(|e| {
            TradeError::Upstream(format!("Failed to fetch future account: {}", e))
        })?;

        Ok((prices, books, account))
    }

    pub async fn execute(&self, request: &OrderRequest) -> Result<ExecutionReport> {
        tracing::info!(account = %request.account, orders = request.order.len(), "Starting rebalance");

        let secret = self.load_secret(&request.account).await?;
        let account_index = self.fetch_account_index(&secret.wallet_address).await?;
        let trader = self.traders.connect(&secret, account_index).await?;

        let result = self.rebalance(request, &secret, trader.as_ref()).await;

        // session 一定要關閉，即使下單失敗
        if let Err(e) = trader.close().await {
            tracing::warn!("Failed to close trading session: {}", e);
        }

        let result = result?;
        Ok(ExecutionReport {
            status: "ok".to_string(),
            account: request.account.clone(),
            result,
        })
    }

    async fn rebalance(
        &self,
        request: &OrderRequest,
        secret: &AccountSecret,
        trader: &dyn TradingClient,
    ) -> Result<RebalanceResult> {
        planner::validate_request(request)?;

        let (prices, books, account) = self.fetch_market_state(&secret.wallet_address).await?;
        let margin = planner::margin_balance(&account)?;

        let current = planner::current_positions(&account, &prices, margin)?;
        tracing::debug!("current_open_position_percentage: {:?}", current);

        let summary = planner::order_summary(request, &current, &prices, &books, margin)?;
        tracing::info!("order_summary: {}", serde_json::to_string(&summary)?);

        let leverage_phase = async {
            ensure_isolated(&summary, &account, &books, trader, &self.options).await?;
            align_leverage(&summary, &account, &books, trader, &self.options).await
        };
        leverage_phase.await.map_err(|e| {
            TradeError::Internal(format!("Error executing leverage/margin updates: {}", e))
        })?;

        let (closing, adjusting) = planner::final_orders(&summary);
        tracing::info!(
            "final_order1: {}, final_order2: {}",
            serde_json::to_string(&closing)?,
            serde_json::to_string(&adjusting)?
        );

        let closing_responses =
            execute_market_orders(&closing, &books, true, trader, &self.options).await?;
        let adjusting_responses =
            execute_market_orders(&adjusting, &books, false, trader, &self.options).await?;

        let has_error = closing_responses
            .iter()
            .chain(adjusting_responses.iter())
            .any(|e| !e.response.is_ok());
        if has_error {
            return Err(TradeError::rejected(
                502,
                json!({
                    "status": "error",
                    "account": request.account,
                    "result": "One or more orders failed (Lighter API returned an error code).",
                }),
            ));
        }

        Ok(RebalanceResult {
            current_position: current,
            all_order_before_adjusted: summary,
            order1_after_adjusted: closing,
            order2_after_adjusted: adjusting,
            lighter_order1_response: closing_responses,
            lighter_order2_response: adjusting_responses,
        })
    }
}

#[async_trait]
impl<E, S, F> Rebalancer for RebalanceEngine<E, S, F>
where
    E: ExchangeApi,
    S: SecretStore,
    F: TraderFactory,
{
    async fn execute(&self, request: &OrderRequest) -> Result<ExecutionReport> {
        RebalanceEngine::execute(self, request).await
    }
}
