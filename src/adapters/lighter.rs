//! Lighter REST client, transaction signing seam and the trading session
//! built on top of both.

use crate::domain::model::{
    AccountSecret, AccountsResponse, ExchangeStats, MarketOrderParams, NextNonce,
    OrderBooksResponse, TxResponse,
};
use crate::domain::ports::{ExchangeApi, TraderFactory, TradingClient};
use crate::utils::error::{Result, TradeError};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://mainnet.zklighter.elliot.ai";

pub const TX_TYPE_CREATE_ORDER: u8 = 14;
pub const TX_TYPE_UPDATE_LEVERAGE: u8 = 20;
pub const ORDER_TYPE_MARKET: u8 = 1;
pub const TIME_IN_FORCE_IMMEDIATE_OR_CANCEL: u8 = 0;

trait CodedResponse {
    fn code(&self) -> i32;
}

impl CodedResponse for AccountsResponse {
    fn code(&self) -> i32 {
        self.code
    }
}

impl CodedResponse for ExchangeStats {
    fn code(&self) -> i32 {
        self.code
    }
}

impl CodedResponse for OrderBooksResponse {
    fn code(&self) -> i32 {
        self.code
    }
}

impl CodedResponse for NextNonce {
    fn code(&self) -> i32 {
        self.code
    }
}

#[derive(Debug, Clone)]
pub struct LighterClient {
    client: Client,
    base_url: String,
}

impl LighterClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T>(&self, path: &str, query: &[(&str, String)]) -> Result<T>
    where
        T: DeserializeOwned + CodedResponse,
    {
        tracing::debug!("GET {} {:?}", path, query);
        let response = self.client.get(self.url(path)).query(query).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TradeError::Upstream(format!(
                "{} returned {}: {}",
                path, status, body
            )));
        }

        let parsed: T = response.json().await?;
        if parsed.code() != 200 {
            return Err(TradeError::Upstream(format!(
                "{} returned code {}",
                path,
                parsed.code()
            )));
        }
        Ok(parsed)
    }

    pub async fn next_nonce(&self, account_index: i64, api_key_index: u8) -> Result<i64> {
        let nonce: NextNonce = self
            .get_json(
                "/api/v1/nextNonce",
                &[
                    ("account_index", account_index.to_string()),
                    ("api_key_index", api_key_index.to_string()),
                ],
            )
            .await?;
        Ok(nonce.nonce)
    }

    /// Submits a signed transaction. Rejections come back as a non-200 code,
    /// only transport failures are errors.
    pub async fn send_tx(&self, tx: &SignedTx) -> Result<TxResponse> {
        let form = [
            ("tx_type", tx.tx_type.to_string()),
            ("tx_info", tx.tx_info.clone()),
        ];
        let response = self
            .client
            .post(self.url("/api/v1/sendTx"))
            .form(&form)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        match serde_json::from_str::<TxResponse>(&body) {
            Ok(parsed) => Ok(parsed),
            Err(_) => Ok(TxResponse {
                code: i32::from(status.as_u16()),
                message: Some(body),
                tx_hash: None,
            }),
        }
    }
}

#[async_trait]
impl ExchangeApi for LighterClient {
    async fn account_by_l1_address(&self, address: &str) -> Result<AccountsResponse> {
        self.get_json(
            "/api/v1/account",
            &[("by", "l1_address".to_string()), ("value", address.to_string())],
        )
        .await
    }

    async fn exchange_stats(&self) -> Result<ExchangeStats> {
        self.get_json("/api/v1/exchangeStats", &[]).await
    }

    async fn order_books(&self) -> Result<OrderBooksResponse> {
        self.get_json("/api/v1/orderBooks", &[]).await
    }
}

// ---- signing ----

#[derive(Clone, Serialize)]
pub struct SigningContext {
    pub private_key: String,
    pub account_index: i64,
    pub api_key_index: u8,
    pub nonce: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SignedTx {
    pub tx_type: u8,
    pub tx_info: String,
}

#[async_trait]
pub trait TxSigner: Send + Sync {
    async fn sign_update_leverage(
        &self,
        ctx: &SigningContext,
        market_index: u32,
        leverage: u32,
        margin_mode: u8,
    ) -> Result<SignedTx>;

    async fn sign_create_order(
        &self,
        ctx: &SigningContext,
        order: &MarketOrderParams,
    ) -> Result<SignedTx>;
}

/// Lighter signatures come from its native signer library, which runs as a
/// local sidecar. This forwards unsigned intents to it over HTTP.
#[derive(Debug, Clone)]
pub struct RemoteSigner {
    client: Client,
    signer_url: String,
}

#[derive(Serialize)]
struct UpdateLeverageIntent<'a> {
    #[serde(flatten)]
    ctx: &'a SigningContext,
    market_index: u32,
    initial_margin_fraction: u32,
    margin_mode: u8,
}

#[derive(Serialize)]
struct CreateOrderIntent<'a> {
    #[serde(flatten)]
    ctx: &'a SigningContext,
    market_index: u32,
    client_order_index: i64,
    base_amount: i64,
    price: i64,
    is_ask: bool,
    order_type: u8,
    time_in_force: u8,
    reduce_only: bool,
    trigger_price: i64,
    order_expiry: i64,
}

impl RemoteSigner {
    pub fn new(client: Client, signer_url: impl Into<String>) -> Self {
        Self {
            client,
            signer_url: signer_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn sign<T: Serialize + Sync>(&self, path: &str, intent: &T) -> Result<SignedTx> {
        let response = self
            .client
            .post(format!("{}{}", self.signer_url, path))
            .json(intent)
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TradeError::Internal(format!(
                "signer {} returned {}: {}",
                path, status, body
            )));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl TxSigner for RemoteSigner {
    async fn sign_update_leverage(
        &self,
        ctx: &SigningContext,
        market_index: u32,
        leverage: u32,
        margin_mode: u8,
    ) -> Result<SignedTx> {
        if leverage == 0 {
            return Err(TradeError::BadRequest("Leverage must be at least 1".to_string()));
        }
        let intent = UpdateLeverageIntent {
            ctx,
            market_index,
            // 保證金比例以萬分之一為單位
            initial_margin_fraction: 10_000 / leverage,
            margin_mode,
        };
        self.sign("/sign/update_leverage", &intent).await
    }

    async fn sign_create_order(
        &self,
        ctx: &SigningContext,
        order: &MarketOrderParams,
    ) -> Result<SignedTx> {
        let intent = CreateOrderIntent {
            ctx,
            market_index: order.market_index,
            client_order_index: order.client_order_index,
            base_amount: order.base_amount,
            price: order.avg_execution_price,
            is_ask: order.is_ask,
            order_type: ORDER_TYPE_MARKET,
            time_in_force: TIME_IN_FORCE_IMMEDIATE_OR_CANCEL,
            reduce_only: order.reduce_only,
            trigger_price: 0,
            order_expiry: 0,
        };
        self.sign("/sign/create_order", &intent).await
    }
}

// ---- trading session ----

pub struct LighterTrader {
    client: LighterClient,
    signer: Arc<dyn TxSigner>,
    private_key: String,
    account_index: i64,
    api_key_index: u8,
}

impl LighterTrader {
    async fn context(&self) -> Result<SigningContext> {
        let nonce = self
            .client
            .next_nonce(self.account_index, self.api_key_index)
            .await?;
        Ok(SigningContext {
            private_key: self.private_key.clone(),
            account_index: self.account_index,
            api_key_index: self.api_key_index,
            nonce,
        })
    }
}

#[async_trait]
impl TradingClient for LighterTrader {
    async fn update_leverage(
        &self,
        market_index: u32,
        leverage: u32,
        margin_mode: u8,
    ) -> Result<TxResponse> {
        let ctx = self.context().await?;
        let tx = self
            .signer
            .sign_update_leverage(&ctx, market_index, leverage, margin_mode)
            .await?;
        self.client.send_tx(&tx).await
    }

    async fn create_market_order(&self, order: &MarketOrderParams) -> Result<TxResponse> {
        let ctx = self.context().await?;
        let tx = self.signer.sign_create_order(&ctx, order).await?;
        self.client.send_tx(&tx).await
    }

    async fn close(&self) -> Result<()> {
        tracing::debug!(account_index = self.account_index, "trading session closed");
        Ok(())
    }
}

#[derive(Clone)]
pub struct LighterTraderFactory {
    client: LighterClient,
    signer: Arc<dyn TxSigner>,
}

impl LighterTraderFactory {
    pub fn new(client: LighterClient, signer: Arc<dyn TxSigner>) -> Self {
        Self { client, signer }
    }
}

#[async_trait]
impl TraderFactory for LighterTraderFactory {
    async fn connect(
        &self,
        secret: &AccountSecret,
        account_index: i64,
    ) -> Result<Box<dyn TradingClient>> {
        Ok(Box::new(LighterTrader {
            client: self.client.clone(),
            signer: Arc::clone(&self.signer),
            private_key: secret.private_key.clone(),
            account_index,
            api_key_index: secret.api_key_index,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_rejects_non_200_code() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/api/v1/orderBooks");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(json!({"code": 29500, "order_books": []}));
        });

        let client = LighterClient::new(server.base_url()).unwrap();
        let err = client.order_books().await.unwrap_err();

        mock.assert();
        assert_eq!(err.status_code(), 502);
        assert!(err.to_string().contains("code 29500"));
    }

    #[tokio::test]
    async fn test_send_tx_keeps_rejection_as_response() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/v1/sendTx")
                .body_contains("tx_type=14");
            then.status(400)
                .header("Content-Type", "application/json")
                .json_body(json!({"code": 21701, "message": "invalid nonce"}));
        });

        let client = LighterClient::new(server.base_url()).unwrap();
        let response = client
            .send_tx(&SignedTx {
                tx_type: TX_TYPE_CREATE_ORDER,
                tx_info: "{}".into(),
            })
            .await
            .unwrap();

        mock.assert();
        assert_eq!(response.code, 21701);
        assert!(!response.is_ok());
    }

    #[tokio::test]
    async fn test_remote_signer_sends_margin_fraction() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/sign/update_leverage")
                .json_body_partial(
                    r#"{"market_index": 3, "initial_margin_fraction": 2500, "margin_mode": 1, "nonce": 42}"#,
                );
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(json!({"tx_type": 20, "tx_info": "{\"sig\":\"x\"}"}));
        });

        let signer = RemoteSigner::new(Client::new(), server.base_url());
        let ctx = SigningContext {
            private_key: "key".into(),
            account_index: 7,
            api_key_index: 2,
            nonce: 42,
        };

        let tx = signer.sign_update_leverage(&ctx, 3, 4, 1).await.unwrap();
        mock.assert();
        assert_eq!(tx.tx_type, TX_TYPE_UPDATE_LEVERAGE);
    }
}
