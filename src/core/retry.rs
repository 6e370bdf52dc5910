use crate::domain::model::OrderRequest;
use crate::domain::ports::{Notifier, Rebalancer};
use crate::utils::error::{Result, TradeError};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;

pub const ALERT_TYPE: &str = "Lighter futures";

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecuteOrderResponse {
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    pub account: String,
    pub result: Value,
    pub attempt: u32,
}

/// Runs the rebalance up to `policy.max_attempts` times, pushing an alert
/// after every attempt and one more when the last attempt fails.
pub async fn execute_with_retry<R, N>(
    rebalancer: &R,
    notifier: &N,
    request: &OrderRequest,
    policy: &RetryPolicy,
) -> Result<ExecuteOrderResponse>
where
    R: Rebalancer + ?Sized,
    N: Notifier + ?Sized,
{
    let max_attempts = policy.max_attempts.max(1);

    let mut attempt = 1;
    loop {
        tracing::info!("Attempt {} of {}", attempt, max_attempts);

        let err = match rebalancer.execute(request).await {
            Ok(report) => {
                notifier
                    .notify(
                        &json!({
                            "type": ALERT_TYPE,
                            "status": report.status,
                            "account": report.account,
                            "attempt": attempt,
                        })
                        .to_string(),
                    )
                    .await;

                tracing::info!("✅ Order executed successfully");
                return Ok(ExecuteOrderResponse {
                    kind: ALERT_TYPE.to_string(),
                    status: report.status,
                    account: report.account,
                    result: serde_json::to_value(&report.result)?,
                    attempt,
                });
            }
            Err(err) => err,
        };

        if err.is_expected() {
            tracing::warn!("❌ HTTP error on attempt {}: {}", attempt, err.detail());
        } else {
            tracing::error!("❌ Unexpected error on attempt {}: {}", attempt, err);
        }

        let error_payload = json!({
            "type": ALERT_TYPE,
            "status": "error",
            "account": request.account,
            "result": err.detail(),
            "attempt": attempt,
        });
        notifier.notify(&error_payload.to_string()).await;

        if attempt == max_attempts {
            notifier
                .notify(
                    &json!({
                        "type": ALERT_TYPE,
                        "status": "error",
                        "account": request.account,
                        "message": "Max retries reached",
                    })
                    .to_string(),
                )
                .await;

            return Err(if err.is_expected() {
                err
            } else {
                TradeError::rejected(500, error_payload)
            });
        }

        tracing::info!("⏳ Waiting {:?} before retrying...", policy.delay);
        tokio::time::sleep(policy.delay).await;
        attempt += 1;
    }
}
