use crate::api::AppState;
use crate::utils::error::TradeError;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::{Map, Value};

pub type Claims = Map<String, Value>;

/// Verified bearer-token claims. Handlers taking this extractor are
/// protected.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

impl AuthUser {
    pub fn subject(&self) -> Option<&str> {
        self.0.get("sub").and_then(Value::as_str)
    }
}

pub fn verify_token(authorization: &str, secret_key: Option<&str>) -> Result<Claims, TradeError> {
    let token = authorization
        .strip_prefix("Bearer ")
        .ok_or_else(|| TradeError::Unauthorized("Invalid Authorization header".to_string()))?;

    let secret_key = secret_key.ok_or_else(|| {
        TradeError::Forbidden("Token validation failed: SECRET_KEY is not configured".to_string())
    })?;

    let mut validation = Validation::new(Algorithm::HS256);
    // exp 只在有帶時檢查
    validation.required_spec_claims.clear();
    validation.validate_aud = false;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret_key.as_bytes()),
        &validation,
    )
    .map_err(|e| TradeError::Forbidden(format!("Token validation failed: {}", e)))?;

    if !data.claims.contains_key("sub") {
        return Err(TradeError::Unauthorized("Missing subject claim".to_string()));
    }

    Ok(data.claims)
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = TradeError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or_else(|| TradeError::Unprocessable("Missing Authorization header".to_string()))?
            .to_str()
            .map_err(|_| TradeError::Unauthorized("Invalid Authorization header".to_string()))?;

        verify_token(header, state.secret_key.as_deref()).map(AuthUser)
    }
}
