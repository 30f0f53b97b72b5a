//! Bearer-token verification shared by the WebSocket handshake and the REST inbox.
//!
//! Tokens are HS256 JWTs issued by the platform's auth service. The user id is
//! read from `sub`, or from `userId` for tokens minted by the legacy issuer.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(alias = "userId")]
    pub sub: Uuid,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

#[derive(Clone)]
pub struct JwtAuth {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtAuth {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Mint a token for `user_id` valid for `ttl_secs`. Used by the CLI and tests.
    pub fn issue(&self, user_id: Uuid, ttl_secs: i64) -> anyhow::Result<String> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: user_id,
            exp: now + ttl_secs,
            iat: Some(now),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Verify signature and expiry. Accepts an optional `Bearer ` prefix.
    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let token = token.trim();
        let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();
        if token.is_empty() {
            anyhow::bail!("empty token");
        }
        let data = decode::<Claims>(token, &self.decoding, &self.validation)?;
        Ok(data.claims)
    }
}

/// Authenticated caller of the REST inbox.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Uuid);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::Unauthorized)?;

        let claims = state.auth.verify(header).map_err(|e| {
            tracing::debug!("rejected bearer token: {}", e);
            AppError::Unauthorized
        })?;
        Ok(AuthUser(claims.sub))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_then_verify() {
        let auth = JwtAuth::new("secret");
        let user = Uuid::new_v4();
        let token = auth.issue(user, 60).unwrap();

        assert_eq!(auth.verify(&token).unwrap().sub, user);
        assert_eq!(auth.verify(&format!("Bearer {}", token)).unwrap().sub, user);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = JwtAuth::new("one").issue(Uuid::new_v4(), 60).unwrap();
        assert!(JwtAuth::new("two").verify(&token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        // Past the default 60s leeway
        let token = JwtAuth::new("secret").issue(Uuid::new_v4(), -600).unwrap();
        assert!(JwtAuth::new("secret").verify(&token).is_err());
    }

    #[test]
    fn test_legacy_user_id_claim() {
        let user = Uuid::new_v4();
        let exp = chrono::Utc::now().timestamp() + 60;
        let token = encode(
            &Header::new(Algorithm::HS256),
            &serde_json::json!({ "userId": user, "exp": exp }),
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();
        assert_eq!(JwtAuth::new("secret").verify(&token).unwrap().sub, user);
    }

    #[test]
    fn test_garbage_and_empty_rejected() {
        let auth = JwtAuth::new("secret");
        assert!(auth.verify("not-a-jwt").is_err());
        assert!(auth.verify("Bearer ").is_err());
    }
}
