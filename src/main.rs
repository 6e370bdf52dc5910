use clap::Parser;
use lighter_rebalancer::config::cli::Command;
use lighter_rebalancer::deploy::{self, DeployConfig, DeployStep, ProcessRunner};
use lighter_rebalancer::utils::error::ErrorSeverity;
use lighter_rebalancer::utils::{logger, validation::Validate};
use lighter_rebalancer::{app, execute_with_retry, router, CliConfig, OrderRequest, Settings, TradeError};

fn load_settings(config: &CliConfig) -> lighter_rebalancer::Result<Settings> {
    let settings = match &config.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::from_env()?,
    };
    settings.validate()?;
    Ok(settings)
}

async fn serve(settings: &Settings, bind: &str) -> lighter_rebalancer::Result<()> {
    let state = app::build_state(settings).await?;
    let listener = tokio::net::TcpListener::bind(bind).await?;

    tracing::info!("🌐 Listening on {}", bind);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn execute(
    settings: &Settings,
    request_path: &std::path::Path,
    no_retry: bool,
) -> lighter_rebalancer::Result<serde_json::Value> {
    let raw = std::fs::read_to_string(request_path)?;
    let request: OrderRequest = serde_json::from_str(&raw)?;
    let state = app::build_state(settings).await?;

    if no_retry {
        let report = state.rebalancer.execute(&request).await?;
        return Ok(serde_json::to_value(report)?);
    }

    let response = execute_with_retry(
        state.rebalancer.as_ref(),
        state.notifier.as_ref(),
        &request,
        &state.retry,
    )
    .await?;
    Ok(serde_json::to_value(response)?)
}

async fn run(config: CliConfig) -> lighter_rebalancer::Result<()> {
    match config.command.clone() {
        Command::Serve { bind } => {
            let settings = load_settings(&config)?;
            serve(&settings, &bind).await
        }
        Command::Execute { request, no_retry } => {
            let settings = load_settings(&config)?;
            let output = execute(&settings, &request, no_retry).await?;
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Command::Deploy(args) => {
            let dry_run = args.dry_run;
            let deploy_config = DeployConfig::from(args);

            if dry_run {
                for step in deploy::plan(&deploy_config) {
                    match step {
                        DeployStep::Run { command, .. } => println!("{}", command),
                        DeployStep::Pipe { source, sink, .. } => println!("{} | {}", source, sink),
                    }
                }
                return Ok(());
            }

            let pushed = deploy::deploy(&ProcessRunner, &deploy_config).await?;
            println!("✅ Image pushed: {}", pushed);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    let config = CliConfig::parse();

    // 初始化日誌
    logger::init_cli_logger(config.verbose);
    tracing::info!("Starting lighter-rebalancer CLI");
    if config.verbose {
        tracing::debug!("CLI config: {:?}", config);
    }

    if let Err(e) = run(config).await {
        report_failure(&e);

        let exit_code = match e.severity() {
            ErrorSeverity::Low => 1,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };
        std::process::exit(exit_code);
    }
}

fn report_failure(e: &TradeError) {
    tracing::error!(
        "❌ Failed: {} (status: {}, severity: {:?})",
        e,
        e.status_code(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());
}
