//! Wiring: builds the engine, notifier and HTTP state from `Settings`.

use crate::adapters::lighter::{LighterClient, LighterTraderFactory, RemoteSigner};
use crate::adapters::line::{LineNotifier, NoopNotifier};
use crate::adapters::secrets::EnvSecretStore;
use crate::api::AppState;
use crate::config::{SecretSource, Settings};
use crate::core::engine::RebalanceEngine;
use crate::domain::ports::{Notifier, Rebalancer};
use crate::utils::error::{Result, TradeError};
use std::sync::Arc;
use std::time::Duration;

pub fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()?)
}

pub fn build_notifier(settings: &Settings, client: reqwest::Client) -> Arc<dyn Notifier> {
    match &settings.line_bot_token {
        Some(token) if settings.alerts_enabled() => Arc::new(LineNotifier::new(
            client,
            token.clone(),
            settings.target_ids.clone(),
        )),
        _ => {
            tracing::info!("LINE alerts disabled");
            Arc::new(NoopNotifier)
        }
    }
}

pub async fn build_rebalancer(
    settings: &Settings,
    client: reqwest::Client,
) -> Result<Arc<dyn Rebalancer>> {
    let signer_url = settings
        .signer_url
        .clone()
        .ok_or_else(|| TradeError::missing_config("SIGNER_URL"))?;

    let exchange = LighterClient::with_client(client.clone(), settings.base_url.clone());
    let signer = Arc::new(RemoteSigner::new(client, signer_url));
    let traders = LighterTraderFactory::new(exchange.clone(), signer);

    match settings.secret_source {
        SecretSource::Env => {
            let secrets = EnvSecretStore::new(
                settings.wallet_address.clone(),
                settings.private_key.clone(),
                settings.api_key_index,
            );
            Ok(Arc::new(RebalanceEngine::new(exchange, secrets, traders)))
        }
        #[cfg(feature = "aws")]
        SecretSource::Aws => {
            let secrets =
                crate::adapters::secrets::AwsSecretStore::from_region(&settings.secrets_region)
                    .await;
            Ok(Arc::new(RebalanceEngine::new(exchange, secrets, traders)))
        }
        #[cfg(not(feature = "aws"))]
        SecretSource::Aws => Err(TradeError::ConfigError {
            message: "SECRET_SOURCE=aws requires the `aws` feature".to_string(),
        }),
    }
}

pub async fn build_state(settings: &Settings) -> Result<AppState> {
    let client = http_client()?;

    Ok(AppState {
        rebalancer: build_rebalancer(settings, client.clone()).await?,
        notifier: build_notifier(settings, client),
        retry: settings.retry_policy(),
        secret_key: settings.secret_key.clone(),
    })
}
