use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use lighter_rebalancer::core::retry::RetryPolicy;
use lighter_rebalancer::domain::model::{ExecutionReport, RebalanceResult};
use lighter_rebalancer::domain::ports::{Notifier, Rebalancer};
use lighter_rebalancer::{router, AppState, OrderRequest, Result, TradeError};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

const SECRET: &str = "test-secret";

struct StaticRebalancer {
    fail_with: Option<u16>,
}

#[async_trait]
impl Rebalancer for StaticRebalancer {
    async fn execute(&self, request: &OrderRequest) -> Result<ExecutionReport> {
        if let Some(status) = self.fail_with {
            return Err(TradeError::rejected(status, json!("exchange down")));
        }
        Ok(ExecutionReport {
            status: "ok".to_string(),
            account: request.account.clone(),
            result: RebalanceResult {
                current_position: vec![],
                all_order_before_adjusted: vec![],
                order1_after_adjusted: vec![],
                order2_after_adjusted: vec![],
                lighter_order1_response: vec![],
                lighter_order2_response: vec![],
            },
        })
    }
}

#[derive(Default)]
struct CollectingNotifier {
    messages: Mutex<Vec<String>>,
}

#[async_trait]
impl Notifier for CollectingNotifier {
    async fn notify(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

fn state(rebalancer: StaticRebalancer, notifier: Arc<CollectingNotifier>) -> AppState {
    AppState {
        rebalancer: Arc::new(rebalancer),
        notifier,
        retry: RetryPolicy {
            max_attempts: 2,
            delay: Duration::ZERO,
        },
        secret_key: Some(SECRET.to_string()),
    }
}

fn token(claims: Value, key: &str) -> String {
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(key.as_bytes()),
    )
    .unwrap()
}

fn order_request(authorization: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/executeOrder")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder
        .body(Body::from(
            json!({
                "account": "lighter/main",
                "order": [{"symbol": "BTC", "quantity": 0.5, "leverage": 2}]
            })
            .to_string(),
        ))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = router(state(
        StaticRebalancer { fail_with: None },
        Arc::default(),
    ));

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!("Hello world"));
}

#[tokio::test]
async fn test_execute_order_requires_authorization_header() {
    let app = router(state(
        StaticRebalancer { fail_with: None },
        Arc::default(),
    ));

    let response = app.oneshot(order_request(None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_execute_order_rejects_bad_credentials() {
    let notifier = Arc::new(CollectingNotifier::default());
    let app = router(state(StaticRebalancer { fail_with: None }, notifier.clone()));

    let response = app
        .clone()
        .oneshot(order_request(Some("Basic abc")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        json_body(response).await,
        json!({"detail": "Invalid Authorization header"})
    );

    let forged = token(json!({"sub": "bot"}), "other-secret");
    let response = app
        .clone()
        .oneshot(order_request(Some(&format!("Bearer {}", forged))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .starts_with("Token validation failed"));

    let anonymous = token(json!({"role": "bot"}), SECRET);
    let response = app
        .oneshot(order_request(Some(&format!("Bearer {}", anonymous))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await, json!({"detail": "Missing subject claim"}));

    // 驗證失敗不會觸發下單或通知
    assert!(notifier.messages.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_execute_order_returns_result_and_alerts() {
    let notifier = Arc::new(CollectingNotifier::default());
    let app = router(state(StaticRebalancer { fail_with: None }, notifier.clone()));
    let jwt = token(json!({"sub": "strategy-bot"}), SECRET);

    let response = app
        .oneshot(order_request(Some(&format!("Bearer {}", jwt))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["type"], "Lighter futures");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["account"], "lighter/main");
    assert_eq!(body["attempt"], 1);
    assert!(body["result"]["order1AfterAdjusted"].is_array());

    let messages = notifier.messages.lock().unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("\"status\":\"ok\""));
}

#[tokio::test]
async fn test_execute_order_surfaces_final_failure() {
    let notifier = Arc::new(CollectingNotifier::default());
    let app = router(state(
        StaticRebalancer {
            fail_with: Some(502),
        },
        notifier.clone(),
    ));
    let jwt = token(json!({"sub": "strategy-bot"}), SECRET);

    let response = app
        .oneshot(order_request(Some(&format!("Bearer {}", jwt))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(json_body(response).await, json!({"detail": "exchange down"}));

    // 每次失敗一則，加上最後的 Max retries reached
    let messages = notifier.messages.lock().unwrap();
    assert_eq!(messages.len(), 3);
    assert!(messages[2].contains("Max retries reached"));
}

#[tokio::test]
async fn test_execute_order_rejects_invalid_body_as_detail() {
    let notifier = Arc::new(CollectingNotifier::default());
    let app = router(state(StaticRebalancer { fail_with: None }, notifier.clone()));
    let authorization = format!("Bearer {}", token(json!({"sub": "strategy-bot"}), SECRET));

    let bodies = [
        "{not json".to_string(),
        json!({
            "account": "lighter/main",
            "order": [{"symbol": "BTC", "quantity": 0.5, "leverage": -1}]
        })
        .to_string(),
    ];

    for body in bodies {
        let request = Request::builder()
            .method("POST")
            .uri("/executeOrder")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, authorization.as_str())
            .body(Body::from(body))
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(response).await;
        assert!(body["detail"].is_string());
    }

    assert!(notifier.messages.lock().unwrap().is_empty());
}
