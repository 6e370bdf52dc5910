use crate::adapters::lighter::DEFAULT_BASE_URL;
use crate::adapters::secrets::DEFAULT_SECRETS_REGION;
use crate::core::retry::RetryPolicy;
use crate::utils::error::{Result, TradeError};
use crate::utils::validation::{
    validate_aws_region, validate_non_empty_string, validate_range, validate_required_field,
    validate_url, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretSource {
    /// AWS Secrets Manager, keyed by the request's `account`.
    Aws,
    /// WALLET_ADDRESS / PRIVATE_KEY / API_KEY_INDEX from the settings.
    Env,
}

impl std::str::FromStr for SecretSource {
    type Err = TradeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aws" => Ok(SecretSource::Aws),
            "env" => Ok(SecretSource::Env),
            other => Err(TradeError::InvalidConfigValueError {
                field: "secret_source".to_string(),
                value: other.to_string(),
                reason: "Expected `aws` or `env`".to_string(),
            }),
        }
    }
}

fn default_secret_source() -> SecretSource {
    if cfg!(feature = "aws") {
        SecretSource::Aws
    } else {
        SecretSource::Env
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_region() -> String {
    DEFAULT_SECRETS_REGION.to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    3
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Settings {
    /// HS256 key for bearer tokens.
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default)]
    pub wallet_address: Option<String>,
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default)]
    pub api_key_index: Option<u8>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub signer_url: Option<String>,
    #[serde(default)]
    pub line_bot_token: Option<String>,
    #[serde(default)]
    pub target_ids: Vec<String>,
    #[serde(default = "default_secret_source")]
    pub secret_source: SecretSource,
    #[serde(default = "default_region")]
    pub secrets_region: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redacted = |v: &Option<String>| v.as_ref().map(|_| "***");
        f.debug_struct("Settings")
            .field("secret_key", &redacted(&self.secret_key))
            .field("wallet_address", &self.wallet_address)
            .field("private_key", &redacted(&self.private_key))
            .field("api_key_index", &self.api_key_index)
            .field("base_url", &self.base_url)
            .field("signer_url", &self.signer_url)
            .field("line_bot_token", &redacted(&self.line_bot_token))
            .field("target_ids", &self.target_ids)
            .field("secret_source", &self.secret_source)
            .field("secrets_region", &self.secrets_region)
            .field("max_retries", &self.max_retries)
            .field("retry_delay_secs", &self.retry_delay_secs)
            .finish()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            secret_key: None,
            wallet_address: None,
            private_key: None,
            api_key_index: None,
            base_url: default_base_url(),
            signer_url: None,
            line_bot_token: None,
            target_ids: Vec::new(),
            secret_source: default_secret_source(),
            secrets_region: default_region(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match non_empty_var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| TradeError::InvalidConfigValueError {
                field: name.to_string(),
                value: raw,
                reason: "Could not parse value".to_string(),
            }),
        None => Ok(None),
    }
}

pub fn split_targets(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            secret_key: non_empty_var("SECRET_KEY"),
            wallet_address: non_empty_var("WALLET_ADDRESS"),
            private_key: non_empty_var("PRIVATE_KEY"),
            api_key_index: parse_var("API_KEY_INDEX")?,
            base_url: non_empty_var("BASE_URL").unwrap_or(defaults.base_url),
            signer_url: non_empty_var("SIGNER_URL"),
            line_bot_token: non_empty_var("LINE_BOT_TOKEN"),
            target_ids: non_empty_var("TARGET_IDS")
                .map(|raw| split_targets(&raw))
                .unwrap_or_default(),
            secret_source: match non_empty_var("SECRET_SOURCE") {
                Some(raw) => raw.parse()?,
                None => defaults.secret_source,
            },
            secrets_region: non_empty_var("SECRETS_REGION")
                .or_else(|| non_empty_var("AWS_REGION"))
                .unwrap_or(defaults.secrets_region),
            max_retries: parse_var("MAX_RETRIES")?.unwrap_or(defaults.max_retries),
            retry_delay_secs: parse_var("RETRY_DELAY_SECS")?.unwrap_or(defaults.retry_delay_secs),
        })
    }

    /// 從 TOML 檔案載入設定
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content)?;

        toml::from_str(&processed).map_err(|e| TradeError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${LINE_BOT_TOKEN})
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| TradeError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            delay: Duration::from_secs(self.retry_delay_secs),
        }
    }

    pub fn alerts_enabled(&self) -> bool {
        self.line_bot_token.is_some() && !self.target_ids.is_empty()
    }
}

impl Validate for Settings {
    fn validate(&self) -> Result<()> {
        validate_url("base_url", &self.base_url)?;

        let signer_url = validate_required_field("SIGNER_URL", &self.signer_url)?;
        validate_url("signer_url", signer_url)?;

        let secret_key = validate_required_field("SECRET_KEY", &self.secret_key)?;
        validate_non_empty_string("secret_key", secret_key)?;

        match self.secret_source {
            SecretSource::Aws => validate_aws_region("secrets_region", &self.secrets_region)?,
            SecretSource::Env => {
                validate_required_field("WALLET_ADDRESS", &self.wallet_address)?;
                validate_required_field("PRIVATE_KEY", &self.private_key)?;
                validate_required_field("API_KEY_INDEX", &self.api_key_index)?;
            }
        }

        validate_range("max_retries", self.max_retries, 1, 10)?;
        validate_range("retry_delay_secs", self.retry_delay_secs, 0, 60)?;

        if self.line_bot_token.is_some() && self.target_ids.is_empty() {
            tracing::warn!("LINE_BOT_TOKEN is set but TARGET_IDS is empty, alerts are disabled");
        }

        tracing::info!("✅ Configuration validation passed");
        Ok(())
    }
}
