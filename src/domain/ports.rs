use crate::domain::model::{
    AccountSecret, AccountsResponse, ExchangeStats, ExecutionReport, MarketOrderParams,
    OrderBooksResponse, OrderRequest, TxResponse,
};
use crate::utils::error::Result;
use async_trait::async_trait;

/// Read-only market and account data.
#[async_trait]
pub trait ExchangeApi: Send + Sync {
    async fn account_by_l1_address(&self, address: &str) -> Result<AccountsResponse>;
    async fn exchange_stats(&self) -> Result<ExchangeStats>;
    async fn order_books(&self) -> Result<OrderBooksResponse>;
}

/// Signed operations for one account. A response with a non-200 code is an
/// exchange-side rejection, `Err` is a transport or signing failure.
#[async_trait]
pub trait TradingClient: Send + Sync {
    async fn update_leverage(
        &self,
        market_index: u32,
        leverage: u32,
        margin_mode: u8,
    ) -> Result<TxResponse>;

    async fn create_market_order(&self, order: &MarketOrderParams) -> Result<TxResponse>;

    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait TraderFactory: Send + Sync {
    async fn connect(
        &self,
        secret: &AccountSecret,
        account_index: i64,
    ) -> Result<Box<dyn TradingClient>>;
}

pub trait SecretStore: Send + Sync {
    fn load(
        &self,
        secret_id: &str,
    ) -> impl std::future::Future<Output = Result<AccountSecret>> + Send;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str);
}

/// One full rebalance attempt, so retries can wrap any implementation.
#[async_trait]
pub trait Rebalancer: Send + Sync {
    async fn execute(&self, request: &OrderRequest) -> Result<ExecutionReport>;
}
