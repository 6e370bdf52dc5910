pub mod engine;
pub mod executor;
pub mod planner;
pub mod retry;

pub use crate::domain::model::{ExecutionReport, OrderRequest};
pub use crate::domain::ports::{ExchangeApi, Notifier, Rebalancer, SecretStore, TraderFactory, TradingClient};
pub use crate::utils::error::Result;
