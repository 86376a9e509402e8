use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    fn ttl_secs(self, config: &Config) -> i64 {
        match self {
            TokenType::Access => config.jwt_access_ttl_secs,
            TokenType::Refresh => config.jwt_refresh_ttl_secs,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub exp: i64,
    pub iat: i64,
    pub token_type: TokenType,
    /// Set on refresh tokens so two issued in the same second never collide
    /// in `refresh_tokens.token_hash`.
    #[serde(default)]
    pub jti: Option<Uuid>,
}

impl Claims {
    pub fn new(user_id: Uuid, email: &str, token_type: TokenType, config: &Config) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id,
            email: email.to_string(),
            exp: (now + Duration::seconds(token_type.ttl_secs(config))).timestamp(),
            iat: now.timestamp(),
            token_type,
            jti: (token_type == TokenType::Refresh).then(Uuid::new_v4),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

pub fn create_token(
    user_id: Uuid,
    email: &str,
    token_type: TokenType,
    config: &Config,
) -> AppResult<String> {
    let claims = Claims::new(user_id, email, token_type, config);
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to sign {:?} token: {}", token_type, e)))
}

pub fn create_access_token(user_id: Uuid, email: &str, config: &Config) -> AppResult<String> {
    create_token(user_id, email, TokenType::Access, config)
}

pub fn create_refresh_token(user_id: Uuid, email: &str, config: &Config) -> AppResult<String> {
    create_token(user_id, email, TokenType::Refresh, config)
}

pub fn create_token_pair(user_id: Uuid, email: &str, config: &Config) -> AppResult<TokenPair> {
    Ok(TokenPair {
        access_token: create_access_token(user_id, email, config)?,
        refresh_token: create_refresh_token(user_id, email, config)?,
        expires_in: config.jwt_access_ttl_secs,
    })
}

/// SHA-256 of a raw token or confirmation code, as lowercase hex.
pub fn hash_token(raw_token: &str) -> String {
    hex::encode(Sha256::digest(raw_token.as_bytes()))
}

/// Signature and expiry check. Any failure is `Unauthorized`.
pub fn verify_token(token: &str, config: &Config) -> AppResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::Unauthorized)
}

/// [`verify_token`], also requiring the given token type.
pub fn verify_token_of(token: &str, expected: TokenType, config: &Config) -> AppResult<Claims> {
    let claims = verify_token(token, config)?;
    if claims.token_type != expected {
        return Err(AppError::Unauthorized);
    }
    Ok(claims)
}
