#[cfg(feature = "lambda")]
use lambda_http::{run, Error};
#[cfg(feature = "lambda")]
use lighter_rebalancer::utils::{logger, validation::Validate};
#[cfg(feature = "lambda")]
use lighter_rebalancer::{app, router, Settings};

#[cfg(feature = "lambda")]
#[tokio::main]
async fn main() -> Result<(), Error> {
    logger::init_lambda_logger();
    tracing::info!("Starting lighter-rebalancer Lambda function");

    // 設定只在冷啟動時載入一次
    let settings = Settings::from_env()
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)?;
    settings
        .validate()
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)?;

    let state = app::build_state(&settings)
        .await
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)?;

    run(router(state)).await
}
