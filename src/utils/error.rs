use serde_json::{json, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TradeError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Unprocessable(String),

    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Internal(String),

    /// 已整理好回應內容的錯誤 (detail 可能是物件)
    #[error("Request rejected with status {status}: {detail}")]
    Rejected { status: u16, detail: Value },

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value for {field} ({value}): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Command `{command}` failed: {message}")]
    CommandError { command: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl TradeError {
    /// HTTP status the error is reported with.
    pub fn status_code(&self) -> u16 {
        match self {
            TradeError::BadRequest(_) => 400,
            TradeError::Unauthorized(_) => 401,
            TradeError::Forbidden(_) => 403,
            TradeError::Unprocessable(_) => 422,
            TradeError::Upstream(_) => 502,
            TradeError::Rejected { status, .. } => *status,
            _ => 500,
        }
    }

    /// JSON value placed under `detail` in error responses.
    pub fn detail(&self) -> Value {
        match self {
            TradeError::Rejected { detail, .. } => detail.clone(),
            other => Value::String(other.to_string()),
        }
    }

    /// Errors raised on purpose by the rebalancing flow, as opposed to
    /// transport, parsing and configuration failures.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            TradeError::BadRequest(_)
                | TradeError::Unauthorized(_)
                | TradeError::Forbidden(_)
                | TradeError::Unprocessable(_)
                | TradeError::Upstream(_)
                | TradeError::Internal(_)
                | TradeError::Rejected { .. }
        )
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            TradeError::BadRequest(_)
            | TradeError::Unauthorized(_)
            | TradeError::Forbidden(_)
            | TradeError::Unprocessable(_) => ErrorSeverity::Low,
            TradeError::Upstream(_) | TradeError::ApiError(_) => ErrorSeverity::Medium,
            TradeError::ConfigError { .. }
            | TradeError::InvalidConfigValueError { .. }
            | TradeError::MissingConfigError { .. }
            | TradeError::IoError(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            TradeError::BadRequest(_) => "Check the order weights and leverage in the request",
            TradeError::Unauthorized(_) | TradeError::Forbidden(_) => {
                "Send a valid HS256 bearer token with a `sub` claim"
            }
            TradeError::Upstream(_) | TradeError::ApiError(_) => {
                "The exchange or AWS was unreachable; retry later"
            }
            TradeError::ConfigError { .. }
            | TradeError::InvalidConfigValueError { .. }
            | TradeError::MissingConfigError { .. } => {
                "Fix the environment variables or the TOML config file"
            }
            TradeError::CommandError { .. } => "Make sure docker and the aws CLI are installed and logged in",
            _ => "Inspect the logs for the failing step",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        format!("[{}] {}", self.status_code(), self)
    }

    /// Wraps the error into a `Rejected` carrying an arbitrary detail body.
    pub fn rejected(status: u16, detail: Value) -> Self {
        TradeError::Rejected { status, detail }
    }

    pub fn missing_config(field: &str) -> Self {
        TradeError::MissingConfigError {
            field: field.to_string(),
        }
    }
}

/// Body written for an error response: `{"detail": ...}`.
pub fn error_body(err: &TradeError) -> Value {
    json!({ "detail": err.detail() })
}

pub type Result<T> = std::result::Result<T, TradeError>;
