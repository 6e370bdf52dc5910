pub mod adapters;
pub mod api;
pub mod app;
pub mod config;
pub mod core;
pub mod deploy;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::Settings;

pub use api::{router, AppState};
pub use core::{engine::RebalanceEngine, retry::execute_with_retry};
pub use domain::model::{ExecutionReport, OrderIn, OrderRequest};
pub use utils::error::{Result, TradeError};
