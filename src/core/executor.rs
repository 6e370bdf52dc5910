use crate::core::planner::{market_order_params, DEFAULT_SLIPPAGE};
use crate::domain::model::{
    Account, FinalOrder, OrderBook, OrderExecution, OrderSummaryRow, ISOLATED_MARGIN_MODE,
};
use crate::domain::ports::TradingClient;
use crate::utils::error::{Result, TradeError};
use std::collections::HashMap;
use std::time::Duration;

/// Pacing and pricing knobs for the signed calls.
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// Pause after each leverage or margin-mode update.
    pub leverage_call_delay: Duration,
    /// Pause between two market orders of the same batch.
    pub order_call_delay: Duration,
    pub base_client_order_index: i64,
    pub slippage: f64,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            leverage_call_delay: Duration::from_secs(1),
            order_call_delay: Duration::from_millis(500),
            base_client_order_index: 1000,
            slippage: DEFAULT_SLIPPAGE,
        }
    }
}

pub fn market_id_map(books: &[OrderBook]) -> HashMap<&str, u32> {
    books
        .iter()
        .map(|b| (b.symbol.as_str(), b.market_id))
        .collect()
}

fn market_id(map: &HashMap<&str, u32>, symbol: &str) -> Result<u32> {
    map.get(symbol).copied().ok_or_else(|| {
        let mut keys: Vec<&str> = map.keys().copied().collect();
        keys.sort_unstable();
        TradeError::BadRequest(format!(
            "Market ID not found for {} (keys={:?})",
            symbol, keys
        ))
    })
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Switches every held market that is still on cross margin to isolated,
/// keeping its current leverage.
pub async fn ensure_isolated(
    summary: &[OrderSummaryRow],
    account: &Account,
    books: &[OrderBook],
    trader: &dyn TradingClient,
    options: &ExecutionOptions,
) -> Result<()> {
    let ids = market_id_map(books);

    for row in summary {
        let held = account.position(&row.symbol);
        let market = market_id(&ids, &row.symbol)?;

        let Some(held) = held else { continue };
        if held.margin_mode == ISOLATED_MARGIN_MODE {
            continue;
        }

        tracing::info!(symbol = %row.symbol, market, "switching margin mode to isolated");
        let response = trader
            .update_leverage(market, held.leverage(), ISOLATED_MARGIN_MODE)
            .await
            .map_err(|e| {
                TradeError::Internal(format!("Failed to set ISOLATED for {}: {}", row.symbol, e))
            })?;

        if !response.is_ok() {
            return Err(TradeError::Upstream(format!(
                "Error switching to ISOLATED for {}: {}",
                row.symbol,
                response.message.as_deref().unwrap_or("unknown error")
            )));
        }

        pause(options.leverage_call_delay).await;
    }

    Ok(())
}

/// Sends a leverage update for every market whose held leverage differs from
/// the target row. Markets without a position always get one.
pub async fn align_leverage(
    summary: &[OrderSummaryRow],
    account: &Account,
    books: &[OrderBook],
    trader: &dyn TradingClient,
    options: &ExecutionOptions,
) -> Result<()> {
    let ids = market_id_map(books);

    for row in summary {
        let current_leverage = account.position(&row.symbol).map(|p| p.leverage());
        let market = market_id(&ids, &row.symbol)?;

        if current_leverage == Some(row.leverage) {
            continue;
        }

        tracing::info!(
            symbol = %row.symbol,
            market,
            from = ?current_leverage,
            to = row.leverage,
            "updating leverage"
        );
        let response = trader
            .update_leverage(market, row.leverage, ISOLATED_MARGIN_MODE)
            .await
            .map_err(|e| {
                TradeError::Internal(format!(
                    "Failed to update leverage for {}: {}",
                    row.symbol, e
                ))
            })?;

        if !response.is_ok() {
            return Err(TradeError::Upstream(format!(
                "Error updating leverage for {}: {}",
                row.symbol,
                response.message.as_deref().unwrap_or("unknown error")
            )));
        }

        pause(options.leverage_call_delay).await;
    }

    Ok(())
}

/// Submits the batch in order. Responses are collected as-is, the caller
/// decides what a non-200 code means for the whole rebalance.
pub async fn execute_market_orders(
    orders: &[FinalOrder],
    books: &[OrderBook],
    reduce_only: bool,
    trader: &dyn TradingClient,
    options: &ExecutionOptions,
) -> Result<Vec<OrderExecution>> {
    if orders.is_empty() {
        return Ok(Vec::new());
    }

    let ids = market_id_map(books);
    let mut executions = Vec::with_capacity(orders.len());

    for (i, order) in orders.iter().enumerate() {
        let market = market_id(&ids, &order.symbol)?;
        let params = market_order_params(
            order,
            market,
            options.base_client_order_index + i as i64,
            options.slippage,
            reduce_only,
        );

        let response = trader.create_market_order(&params).await.map_err(|e| {
            TradeError::Internal(format!(
                "Failed to execute order for {}: {}",
                order.symbol, e
            ))
        })?;

        tracing::info!(
            "✅ Market order {:?} {} qty={} reduce_only={}, slippage={:.1}%",
            order.side,
            order.symbol,
            order.quantity,
            reduce_only,
            options.slippage * 100.0
        );
        executions.push(OrderExecution {
            order: order.clone(),
            response,
        });

        if i + 1 < orders.len() {
            pause(options.order_call_delay).await;
        }
    }

    Ok(executions)
}
