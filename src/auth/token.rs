//! Signed, time-limited bearer tokens (HS256 JWT).

use std::sync::Arc;

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::{User, UserRole};

/// Claims embedded in every issued token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    pub id:        i64,
    pub username:  String,
    pub role:      UserRole,
    pub full_name: String,
    pub room:      Option<String>,
    pub iat:       i64,
    pub exp:       i64,
    pub jti:       String,
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: Arc<EncodingKey>,
    decoding_key: Arc<DecodingKey>,
    ttl:          chrono::Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding_key: Arc::new(EncodingKey::from_secret(secret.as_bytes())),
            decoding_key: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
            ttl:          chrono::Duration::hours(ttl_hours),
        }
    }

    pub fn issue(&self, user: &User) -> AppResult<String> {
        let now = chrono::Utc::now();
        let claims = Claims {
            id:        user.id,
            username:  user.username.clone(),
            role:      user.role,
            full_name: user.full_name.clone(),
            room:      user.room.clone(),
            iat:       now.timestamp(),
            exp:       (now + self.ttl).timestamp(),
            jti:       Uuid::new_v4().to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Token signing failed: {e}")))
    }

    /// Checks signature and expiry. Any failure is `Unauthorized`.
    pub fn verify(&self, token: &str) -> AppResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|err| {
                tracing::debug!(error = %err, "Rejected bearer token");
                AppError::Unauthorized
            })
    }

    #[cfg(test)]
    pub fn sign_claims(&self, claims: &Claims) -> String {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key).unwrap()
    }
}
