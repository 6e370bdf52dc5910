use crate::domain::model::AccountSecret;
use crate::domain::ports::SecretStore;
use crate::utils::error::{Result, TradeError};

pub const DEFAULT_SECRETS_REGION: &str = "ap-northeast-2";

/// Parses the JSON document stored under a secret id.
pub fn parse_secret(secret_id: &str, raw: &str) -> Result<AccountSecret> {
    serde_json::from_str(raw).map_err(|e| {
        TradeError::Upstream(format!("Secret {} is not valid JSON: {}", secret_id, e))
    })
}

/// Credentials taken from the process settings, for local runs where the
/// request's account id is only a label.
#[derive(Debug, Clone, Default)]
pub struct EnvSecretStore {
    secret: Option<AccountSecret>,
}

impl EnvSecretStore {
    pub fn new(
        wallet_address: Option<String>,
        private_key: Option<String>,
        api_key_index: Option<u8>,
    ) -> Self {
        let secret = match (wallet_address, private_key, api_key_index) {
            (Some(wallet_address), Some(private_key), Some(api_key_index)) => Some(AccountSecret {
                wallet_address,
                private_key,
                api_key_index,
            }),
            _ => None,
        };
        Self { secret }
    }
}

impl SecretStore for EnvSecretStore {
    async fn load(&self, secret_id: &str) -> Result<AccountSecret> {
        tracing::debug!("Using local credentials for account {}", secret_id);
        self.secret.clone().ok_or_else(|| {
            TradeError::missing_config("WALLET_ADDRESS / PRIVATE_KEY / API_KEY_INDEX")
        })
    }
}

#[cfg(feature = "aws")]
pub use aws::AwsSecretStore;

#[cfg(feature = "aws")]
mod aws {
    use super::*;
    use aws_config::BehaviorVersion;
    use aws_sdk_secretsmanager::config::Region;
    use aws_sdk_secretsmanager::error::DisplayErrorContext;
    use aws_sdk_secretsmanager::Client as SecretsClient;

    #[derive(Debug, Clone)]
    pub struct AwsSecretStore {
        client: SecretsClient,
    }

    impl AwsSecretStore {
        pub fn new(client: SecretsClient) -> Self {
            Self { client }
        }

        pub async fn from_region(region: &str) -> Self {
            let config = aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(region.to_string()))
                .load()
                .await;
            Self::new(SecretsClient::new(&config))
        }
    }

    impl SecretStore for AwsSecretStore {
        async fn load(&self, secret_id: &str) -> Result<AccountSecret> {
            let output = self
                .client
                .get_secret_value()
                .secret_id(secret_id)
                .send()
                .await
                .map_err(|e| {
                    TradeError::Upstream(format!(
                        "Failed to fetch secret {}: {}",
                        secret_id,
                        DisplayErrorContext(&e)
                    ))
                })?;

            let raw = match (output.secret_string(), output.secret_binary()) {
                (Some(text), _) => text.to_string(),
                (None, Some(blob)) => String::from_utf8(blob.as_ref().to_vec()).map_err(|e| {
                    TradeError::Upstream(format!("Secret {} is not UTF-8: {}", secret_id, e))
                })?,
                (None, None) => {
                    return Err(TradeError::Upstream(
                        "Secret returned empty SecretString/SecretBinary".to_string(),
                    ))
                }
            };

            parse_secret(secret_id, &raw)
        }
    }
}
