use serde::{Deserialize, Deserializer, Serialize};

/// Lighter margin modes.
pub const CROSS_MARGIN_MODE: u8 = 0;
pub const ISOLATED_MARGIN_MODE: u8 = 1;

/// One target weight in a rebalance request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIn {
    pub symbol: String,
    pub quantity: f64,
    pub leverage: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub account: String,
    pub order: Vec<OrderIn>,
}

#[derive(Clone, Deserialize)]
pub struct AccountSecret {
    #[serde(rename = "WALLET_ADDRESS")]
    pub wallet_address: String,
    #[serde(rename = "PRIVATE_KEY")]
    pub private_key: String,
    #[serde(rename = "API_KEY_INDEX", deserialize_with = "de::lenient_u8")]
    pub api_key_index: u8,
}

impl std::fmt::Debug for AccountSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountSecret")
            .field("wallet_address", &self.wallet_address)
            .field("private_key", &"***")
            .field("api_key_index", &self.api_key_index)
            .finish()
    }
}

// ---- Exchange views ----

#[derive(Debug, Clone, Deserialize)]
pub struct AccountsResponse {
    #[serde(default = "ok_code")]
    pub code: i32,
    #[serde(default)]
    pub accounts: Vec<Account>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub index: i64,
    #[serde(default)]
    pub l1_address: String,
    #[serde(deserialize_with = "de::lenient_f64")]
    pub total_asset_value: f64,
    #[serde(default)]
    pub positions: Vec<Position>,
}

impl Account {
    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.symbol == symbol)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Position {
    pub market_id: u32,
    pub symbol: String,
    #[serde(deserialize_with = "de::lenient_f64")]
    pub initial_margin_fraction: f64,
    #[serde(deserialize_with = "de::lenient_f64")]
    pub position: f64,
    pub sign: i32,
    #[serde(default)]
    pub margin_mode: u8,
}

impl Position {
    /// `initial_margin_fraction` is a percentage, 20.00 means 5x.
    pub fn leverage(&self) -> u32 {
        if self.initial_margin_fraction <= 0.0 {
            return 0;
        }
        (100.0 / self.initial_margin_fraction) as u32
    }

    pub fn signed_quantity(&self) -> f64 {
        if self.sign == 1 {
            self.position
        } else {
            -self.position
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderBooksResponse {
    #[serde(default = "ok_code")]
    pub code: i32,
    #[serde(default)]
    pub order_books: Vec<OrderBook>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderBook {
    pub symbol: String,
    pub market_id: u32,
    #[serde(deserialize_with = "de::lenient_f64")]
    pub min_base_amount: f64,
    #[serde(deserialize_with = "de::lenient_f64")]
    pub min_quote_amount: f64,
    pub supported_size_decimals: u32,
    pub supported_price_decimals: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeStats {
    #[serde(default = "ok_code")]
    pub code: i32,
    #[serde(default)]
    pub order_book_stats: Vec<OrderBookStat>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderBookStat {
    pub symbol: String,
    #[serde(deserialize_with = "de::lenient_f64")]
    pub last_trade_price: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NextNonce {
    #[serde(default = "ok_code")]
    pub code: i32,
    pub nonce: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxResponse {
    pub code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
}

impl TxResponse {
    pub fn is_ok(&self) -> bool {
        self.code == 200
    }
}

// ---- Rebalance tables ----

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentPosition {
    pub symbol: String,
    pub quantity: f64,
    pub quantity_percentage: f64,
    pub leverage: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ClosePosition {
    #[serde(rename = "Y")]
    Yes,
    #[serde(rename = "N")]
    No,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummaryRow {
    pub symbol: String,
    pub percentage: f64,
    pub usd_amount: f64,
    pub coin_amount: f64,
    pub min_order_size: f64,
    pub min_notional_size: f64,
    pub step_size: f64,
    pub size_decimals: u32,
    pub price_decimals: u32,
    pub market_price: f64,
    pub leverage: u32,
    pub close_position: ClosePosition,
    pub execute_first: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Market,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalOrder {
    pub symbol: String,
    pub side: Side,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub quantity: f64,
    pub market_price: f64,
    pub size_decimals: u32,
    pub price_decimals: u32,
}

/// Integer-scaled market order ready to be signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarketOrderParams {
    pub market_index: u32,
    pub client_order_index: i64,
    pub base_amount: i64,
    pub avg_execution_price: i64,
    pub is_ask: bool,
    pub reduce_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderExecution {
    pub order: FinalOrder,
    pub response: TxResponse,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalanceResult {
    pub current_position: Vec<CurrentPosition>,
    pub all_order_before_adjusted: Vec<OrderSummaryRow>,
    pub order1_after_adjusted: Vec<FinalOrder>,
    pub order2_after_adjusted: Vec<FinalOrder>,
    pub lighter_order1_response: Vec<OrderExecution>,
    pub lighter_order2_response: Vec<OrderExecution>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub status: String,
    pub account: String,
    pub result: RebalanceResult,
}

fn ok_code() -> i32 {
    200
}

mod de {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        String(String),
    }

    // Lighter 部分數值欄位以字串回傳
    pub fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match NumberOrString::deserialize(deserializer)? {
            NumberOrString::Number(n) => Ok(n),
            NumberOrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
        }
    }

    pub fn lenient_u8<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
        let value = lenient_f64(deserializer)?;
        if value.fract() != 0.0 || !(0.0..=255.0).contains(&value) {
            return Err(serde::de::Error::custom(format!(
                "expected a small integer, got {}",
                value
            )));
        }
        Ok(value as u8)
    }
}
