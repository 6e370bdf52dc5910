//! Rebalancing math: turns target weights plus the live account into the
//! orders needed to reach them. Everything here is pure and synchronous.

use crate::domain::model::{
    Account, ClosePosition, CurrentPosition, FinalOrder, MarketOrderParams, OrderBook,
    OrderBookStat, OrderRequest, OrderSummaryRow, OrderType, Side,
};
use crate::utils::error::{Result, TradeError};
use std::collections::HashMap;

pub const MAX_TOTAL_WEIGHT: f64 = 1.0;
pub const MAX_LEVERAGE: u32 = 5;
/// Share of the account value the rebalance is allowed to commit.
pub const MARGIN_BUFFER: f64 = 0.98;
pub const DEFAULT_SLIPPAGE: f64 = 0.03;

/// Rounds half to even, the way the exchange's reference client does.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round_ties_even() / factor
}

pub fn step_size(size_decimals: u32) -> f64 {
    1.0 / 10f64.powi(size_decimals as i32)
}

pub fn validate_request(request: &OrderRequest) -> Result<()> {
    let total_quantity: f64 = request.order.iter().map(|o| o.quantity.abs()).sum();
    if total_quantity > MAX_TOTAL_WEIGHT {
        return Err(TradeError::BadRequest("Sum input order > 100%".to_string()));
    }

    if request.order.iter().any(|o| o.leverage > MAX_LEVERAGE) {
        return Err(TradeError::BadRequest(format!(
            "Leverage factor can't be more than {}",
            MAX_LEVERAGE
        )));
    }

    Ok(())
}

pub fn price_map(stats: &[OrderBookStat]) -> HashMap<String, f64> {
    stats
        .iter()
        .map(|s| (s.symbol.clone(), s.last_trade_price))
        .collect()
}

pub fn margin_balance(account: &Account) -> Result<f64> {
    let balance = account.total_asset_value * MARGIN_BUFFER;
    if balance == 0.0 {
        return Err(TradeError::BadRequest("Total margin balance is 0".to_string()));
    }
    Ok(balance)
}

pub fn current_positions(
    account: &Account,
    prices: &HashMap<String, f64>,
    margin: f64,
) -> Result<Vec<CurrentPosition>> {
    account
        .positions
        .iter()
        .filter(|p| p.position != 0.0)
        .map(|p| {
            let price = *prices.get(&p.symbol).ok_or_else(|| {
                TradeError::Upstream(format!("Market price not found for {}", p.symbol))
            })?;
            let leverage = p.leverage();
            if leverage == 0 {
                return Err(TradeError::Upstream(format!(
                    "Invalid initial margin fraction for {}",
                    p.symbol
                )));
            }
            let quantity = p.signed_quantity();

            Ok(CurrentPosition {
                symbol: p.symbol.clone(),
                quantity,
                quantity_percentage: (quantity * price) / leverage as f64 / margin,
                leverage,
            })
        })
        .collect()
}

fn find_book<'a>(books: &'a [OrderBook], symbol: &str) -> Result<&'a OrderBook> {
    books
        .iter()
        .find(|b| b.symbol == symbol)
        .ok_or_else(|| TradeError::BadRequest(format!("Order book not found for {}", symbol)))
}

fn row_base(book: &OrderBook, market_price: f64) -> OrderSummaryRow {
    OrderSummaryRow {
        symbol: book.symbol.clone(),
        percentage: 0.0,
        usd_amount: 0.0,
        coin_amount: 0.0,
        min_order_size: book.min_base_amount,
        min_notional_size: book.min_quote_amount,
        step_size: step_size(book.supported_size_decimals),
        size_decimals: book.supported_size_decimals,
        price_decimals: book.supported_price_decimals,
        market_price,
        leverage: 0,
        close_position: ClosePosition::No,
        execute_first: 0,
    }
}

/// Builds the per-market delta table. Rows for held positions come first
/// (close or adjust), then rows for markets the account does not hold yet.
pub fn order_summary(
    request: &OrderRequest,
    current: &[CurrentPosition],
    prices: &HashMap<String, f64>,
    books: &[OrderBook],
    margin: f64,
) -> Result<Vec<OrderSummaryRow>> {
    let mut summary = Vec::with_capacity(current.len() + request.order.len());

    for held in current {
        let target = request.order.iter().find(|o| o.symbol == held.symbol);
        let price = prices.get(&held.symbol).copied().ok_or_else(|| {
            TradeError::Upstream(format!("Market price not found for {}", held.symbol))
        })?;
        let market_price = round_to(price, 8);
        let mut row = row_base(find_book(books, &held.symbol)?, market_price);

        match target {
            Some(target) if target.quantity != 0.0 => {
                if market_price == 0.0 {
                    return Err(TradeError::Upstream(format!(
                        "Market price not found for {}",
                        held.symbol
                    )));
                }
                let current_coin =
                    (held.quantity_percentage * margin) / market_price * held.leverage as f64;
                let target_coin = (target.quantity * margin) / market_price * target.leverage as f64;

                row.percentage = target.quantity - held.quantity_percentage;
                row.usd_amount = target.quantity * margin * target.leverage as f64
                    - held.quantity_percentage * margin * held.leverage as f64;
                row.coin_amount = target_coin - current_coin;
                row.leverage = target.leverage;
                row.close_position = ClosePosition::No;
                // 減倉的單先送，釋放保證金
                row.execute_first = u8::from(current_coin.abs() - target_coin.abs() > 0.0);
            }
            _ => {
                row.percentage = -held.quantity_percentage;
                row.usd_amount = -held.quantity_percentage * margin;
                row.coin_amount = -held.quantity;
                row.leverage = held.leverage;
                row.close_position = ClosePosition::Yes;
            }
        }

        summary.push(row);
    }

    for target in &request.order {
        if current.iter().any(|c| c.symbol == target.symbol) {
            continue;
        }

        let market_price = round_to(prices.get(&target.symbol).copied().unwrap_or(0.0), 8);
        if market_price == 0.0 {
            return Err(TradeError::Upstream(format!(
                "Market price not found for {}",
                target.symbol
            )));
        }
        let mut row = row_base(find_book(books, &target.symbol)?, market_price);

        row.percentage = target.quantity;
        row.usd_amount = target.quantity * margin * target.leverage as f64;
        row.coin_amount = (target.quantity * margin) / market_price * target.leverage as f64;
        row.leverage = target.leverage;
        row.close_position = if target.quantity == 0.0 {
            ClosePosition::Yes
        } else {
            ClosePosition::No
        };

        summary.push(row);
    }

    Ok(summary)
}

fn to_final_order(row: &OrderSummaryRow) -> FinalOrder {
    let steps = round_to(row.coin_amount.abs() / row.step_size, 8).floor();

    FinalOrder {
        symbol: row.symbol.clone(),
        side: if row.coin_amount >= 0.0 { Side::Buy } else { Side::Sell },
        order_type: OrderType::Market,
        quantity: round_to(steps * row.step_size, row.size_decimals),
        market_price: row.market_price,
        size_decimals: row.size_decimals,
        price_decimals: row.price_decimals,
    }
}

fn meets_minimums(row: &OrderSummaryRow) -> bool {
    let coin = row.coin_amount.abs();
    let tradable = (coin / row.step_size).trunc() * row.step_size;
    tradable >= row.min_order_size && coin * row.market_price >= row.min_notional_size
}

/// Splits the summary into closing orders and adjusting orders, each sorted so
/// that rows flagged `execute_first` go out before the rest.
pub fn final_orders(summary: &[OrderSummaryRow]) -> (Vec<FinalOrder>, Vec<FinalOrder>) {
    let mut closing: Vec<&OrderSummaryRow> = summary
        .iter()
        .filter(|r| r.coin_amount.abs() > 0.0 && r.close_position == ClosePosition::Yes)
        .collect();
    let mut adjusting: Vec<&OrderSummaryRow> = summary
        .iter()
        .filter(|r| r.close_position == ClosePosition::No && meets_minimums(r))
        .collect();

    // sort_by is stable
    closing.sort_by(|a, b| b.execute_first.cmp(&a.execute_first));
    adjusting.sort_by(|a, b| b.execute_first.cmp(&a.execute_first));

    (
        closing.into_iter().map(to_final_order).collect(),
        adjusting.into_iter().map(to_final_order).collect(),
    )
}

pub fn market_order_params(
    order: &FinalOrder,
    market_index: u32,
    client_order_index: i64,
    slippage: f64,
    reduce_only: bool,
) -> MarketOrderParams {
    let base_amount = (order.quantity * 10f64.powi(order.size_decimals as i32)).round_ties_even();
    let worst_price = match order.side {
        Side::Buy => order.market_price * (1.0 + slippage),
        Side::Sell => order.market_price * (1.0 - slippage),
    };
    let avg_execution_price =
        (worst_price * 10f64.powi(order.price_decimals as i32)).round_ties_even();

    MarketOrderParams {
        market_index,
        client_order_index,
        base_amount: base_amount as i64,
        avg_execution_price: avg_execution_price as i64,
        is_ask: order.side == Side::Sell,
        reduce_only,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{OrderIn, Position};

    fn book(symbol: &str, market_id: u32, size_decimals: u32) -> OrderBook {
        OrderBook {
            symbol: symbol.to_string(),
            market_id,
            min_base_amount: 0.001,
            min_quote_amount: 10.0,
            supported_size_decimals: size_decimals,
            supported_price_decimals: 2,
        }
    }

    fn position(symbol: &str, qty: f64, sign: i32, imf: f64) -> Position {
        Position {
            market_id: 1,
            symbol: symbol.to_string(),
            initial_margin_fraction: imf,
            position: qty,
            sign,
            margin_mode: 0,
        }
    }

    fn request(orders: &[(&str, f64, u32)]) -> OrderRequest {
        OrderRequest {
            account: "acct".to_string(),
            order: orders
                .iter()
                .map(|(s, q, l)| OrderIn {
                    symbol: s.to_string(),
                    quantity: *q,
                    leverage: *l,
                })
                .collect(),
        }
    }

    #[test]
    fn test_validate_request_limits() {
        assert!(validate_request(&request(&[("BTC", 0.5, 2), ("ETH", -0.5, 5)])).is_ok());

        let err = validate_request(&request(&[("BTC", 0.6, 2), ("ETH", -0.5, 2)])).unwrap_err();
        assert_eq!(err.to_string(), "Sum input order > 100%");
        assert_eq!(err.status_code(), 400);

        let err = validate_request(&request(&[("BTC", 0.1, 6)])).unwrap_err();
        assert_eq!(err.to_string(), "Leverage factor can't be more than 5");
    }

    #[test]
    fn test_margin_balance_rejects_empty_account() {
        let account = Account {
            index: 1,
            l1_address: String::new(),
            total_asset_value: 0.0,
            positions: vec![],
        };
        assert_eq!(margin_balance(&account).unwrap_err().status_code(), 400);
    }

    #[test]
    fn test_current_positions_skips_flat_and_signs_shorts() {
        let account = Account {
            index: 1,
            l1_address: String::new(),
            total_asset_value: 1000.0,
            positions: vec![position("BTC", 0.0, 1, 20.0), position("ETH", 1.0, -1, 50.0)],
        };
        let prices = HashMap::from([("BTC".to_string(), 50000.0), ("ETH".to_string(), 196.0)]);

        let current = current_positions(&account, &prices, 980.0).unwrap();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].symbol, "ETH");
        assert_eq!(current[0].quantity, -1.0);
        assert_eq!(current[0].leverage, 2);
        assert!((current[0].quantity_percentage - (-0.1)).abs() < 1e-12);
    }

    #[test]
    fn test_order_summary_close_adjust_and_open() {
        let margin = 1000.0;
        let prices = HashMap::from([
            ("BTC".to_string(), 100.0),
            ("ETH".to_string(), 10.0),
            ("SOL".to_string(), 5.0),
        ]);
        let books = vec![book("BTC", 1, 3), book("ETH", 2, 2), book("SOL", 3, 1)];
        let current = vec![
            // 0.2 of margin at 2x = 4 BTC long
            CurrentPosition {
                symbol: "BTC".into(),
                quantity: 4.0,
                quantity_percentage: 0.2,
                leverage: 2,
            },
            CurrentPosition {
                symbol: "ETH".into(),
                quantity: -10.0,
                quantity_percentage: -0.1,
                leverage: 1,
            },
        ];
        let req = request(&[("BTC", 0.1, 2), ("SOL", 0.3, 1)]);

        let summary = order_summary(&req, &current, &prices, &books, margin).unwrap();
        assert_eq!(summary.len(), 3);

        let btc = &summary[0];
        assert_eq!(btc.close_position, ClosePosition::No);
        assert!((btc.coin_amount - (-2.0)).abs() < 1e-9);
        assert!((btc.usd_amount - (-200.0)).abs() < 1e-9);
        assert_eq!(btc.execute_first, 1);

        let eth = &summary[1];
        assert_eq!(eth.close_position, ClosePosition::Yes);
        assert_eq!(eth.coin_amount, 10.0);
        assert_eq!(eth.leverage, 1);

        let sol = &summary[2];
        assert_eq!(sol.close_position, ClosePosition::No);
        assert!((sol.coin_amount - 60.0).abs() < 1e-9);
        assert_eq!(sol.step_size, 0.1);
        assert_eq!(sol.execute_first, 0);
    }

    #[test]
    fn test_order_summary_requires_price_and_book() {
        let req = request(&[("DOGE", 0.1, 1)]);
        let err = order_summary(&req, &[], &HashMap::new(), &[], 100.0).unwrap_err();
        assert_eq!(err.status_code(), 502);

        let prices = HashMap::from([("DOGE".to_string(), 0.1)]);
        let err = order_summary(&req, &[], &prices, &[], 100.0).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_order_summary_rejects_zero_price_for_held_market() {
        let prices = HashMap::from([("ETH".to_string(), 0.0)]);
        let books = vec![book("ETH", 0, 4)];
        let current = vec![CurrentPosition {
            symbol: "ETH".into(),
            quantity: 1.0,
            quantity_percentage: 0.0,
            leverage: 2,
        }];

        let req = request(&[("ETH", 0.2, 2)]);
        let err = order_summary(&req, &current, &prices, &books, 1000.0).unwrap_err();
        assert_eq!(err.status_code(), 502);
        assert_eq!(err.to_string(), "Market price not found for ETH");
    }

    #[test]
    fn test_final_orders_split_sort_and_quantize() {
        let base = row_base(&book("BTC", 1, 3), 100.0);
        let rows = vec![
            OrderSummaryRow {
                symbol: "OPEN".into(),
                coin_amount: 0.12345,
                leverage: 1,
                ..base.clone()
            },
            OrderSummaryRow {
                symbol: "REDUCE".into(),
                coin_amount: -0.5,
                execute_first: 1,
                leverage: 1,
                ..base.clone()
            },
            OrderSummaryRow {
                symbol: "TINY".into(),
                coin_amount: 0.0004,
                leverage: 1,
                ..base.clone()
            },
            OrderSummaryRow {
                symbol: "CLOSE".into(),
                coin_amount: -1.23456,
                close_position: ClosePosition::Yes,
                ..base.clone()
            },
            OrderSummaryRow {
                symbol: "NOOP".into(),
                coin_amount: 0.0,
                close_position: ClosePosition::Yes,
                ..base
            },
        ];

        let (closing, adjusting) = final_orders(&rows);

        assert_eq!(closing.len(), 1);
        assert_eq!(closing[0].symbol, "CLOSE");
        assert_eq!(closing[0].side, Side::Sell);
        assert_eq!(closing[0].quantity, 1.234);

        let symbols: Vec<&str> = adjusting.iter().map(|o| o.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["REDUCE", "OPEN"]);
        assert_eq!(adjusting[1].side, Side::Buy);
        assert_eq!(adjusting[1].quantity, 0.123);
    }

    #[test]
    fn test_market_order_params_applies_slippage() {
        let order = FinalOrder {
            symbol: "ETH".into(),
            side: Side::Buy,
            order_type: OrderType::Market,
            quantity: 0.25,
            market_price: 2000.0,
            size_decimals: 4,
            price_decimals: 2,
        };

        let params = market_order_params(&order, 7, 1001, DEFAULT_SLIPPAGE, false);
        assert_eq!(params.base_amount, 2500);
        assert_eq!(params.avg_execution_price, 206000);
        assert!(!params.is_ask);

        let sell = FinalOrder {
            side: Side::Sell,
            ..order
        };
        let params = market_order_params(&sell, 7, 1002, DEFAULT_SLIPPAGE, true);
        assert_eq!(params.avg_execution_price, 194000);
        assert!(params.is_ask);
        assert!(params.reduce_only);
    }

    #[test]
    fn test_round_to_is_half_even() {
        assert_eq!(round_to(0.125, 2), 0.12);
        assert_eq!(round_to(2.5, 0), 2.0);
    }
}
