use crate::domain::ports::Notifier;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tokio::task::JoinSet;

pub const LINE_PUSH_ENDPOINT: &str = "https://api.line.me/v2/bot/message/push";

/// Pushes a text message to every configured LINE target.
#[derive(Debug, Clone)]
pub struct LineNotifier {
    client: Client,
    endpoint: String,
    token: String,
    target_ids: Vec<String>,
}

impl LineNotifier {
    pub fn new(client: Client, token: impl Into<String>, target_ids: Vec<String>) -> Self {
        Self::with_endpoint(client, LINE_PUSH_ENDPOINT, token, target_ids)
    }

    pub fn with_endpoint(
        client: Client,
        endpoint: impl Into<String>,
        token: impl Into<String>,
        target_ids: Vec<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            token: token.into(),
            target_ids,
        }
    }
}

#[async_trait]
impl Notifier for LineNotifier {
    async fn notify(&self, message: &str) {
        let mut pushes = JoinSet::new();

        for target_id in &self.target_ids {
            let request = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.token)
                .header("Content-Type", "application/json; charset=UTF-8")
                .json(&json!({
                    "to": target_id,
                    "messages": [{ "type": "text", "text": message }],
                }));
            let target_id = target_id.clone();

            pushes.spawn(async move { (target_id, request.send().await) });
        }

        while let Some(joined) = pushes.join_next().await {
            match joined {
                Ok((target_id, Ok(response))) if response.status().is_success() => {
                    tracing::info!("✅ LINE push delivered to {}", target_id);
                }
                Ok((target_id, Ok(response))) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    tracing::warn!("❌ LINE error for {} ({}): {}", target_id, status, body);
                }
                Ok((target_id, Err(e))) => {
                    tracing::warn!("❌ Error sending to {}: {}", target_id, e);
                }
                Err(e) => tracing::warn!("❌ LINE push task failed: {}", e),
            }
        }
    }
}

/// Used when no LINE token or targets are configured.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, message: &str) {
        tracing::debug!("alert (not delivered): {}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn test_pushes_to_every_target() {
        let server = MockServer::start();
        let first = server.mock(|when, then| {
            when.method(POST)
                .path("/push")
                .header("Authorization", "Bearer line-token")
                .json_body_partial(r#"{"to": "U1"}"#);
            then.status(200).json_body(serde_json::json!({}));
        });
        let second = server.mock(|when, then| {
            when.method(POST)
                .path("/push")
                .json_body_partial(r#"{"to": "U2"}"#)
                .body_contains(r#""text":"hi""#);
            then.status(400).body("bad target");
        });

        let notifier = LineNotifier::with_endpoint(
            Client::new(),
            server.url("/push"),
            "line-token",
            vec!["U1".to_string(), "U2".to_string()],
        );
        notifier.notify("hi").await;

        first.assert();
        second.assert();
    }
}
