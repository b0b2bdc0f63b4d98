//! Access/refresh tokens, secure random tokens and API keys.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::SecurityConfig;
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT claims.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: String,
    pub tier: String,
    pub kind: TokenKind,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
}

/// Who a token is issued to.
#[derive(Debug, Clone)]
pub struct Principal<'a> {
    pub user_id: &'a str,
    pub email: &'a str,
    pub role: &'a str,
    pub tier: &'a str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

/// Issues and verifies HS256 tokens.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(config: &SecurityConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 5;
        Self {
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            access_ttl: Duration::minutes(config.access_token_expire_minutes),
            refresh_ttl: Duration::minutes(config.refresh_token_expire_minutes),
        }
    }

    pub fn issue(&self, principal: &Principal<'_>, kind: TokenKind) -> Result<String, AppError> {
        let now = Utc::now();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let claims = Claims {
            sub: principal.user_id.to_string(),
            email: principal.email.to_string(),
            role: principal.role.to_string(),
            tier: principal.tier.to_string(),
            kind,
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("token encoding failed: {e}")))
    }

    pub fn issue_pair(&self, principal: &Principal<'_>) -> Result<TokenPair, AppError> {
        Ok(TokenPair {
            access_token: self.issue(principal, TokenKind::Access)?,
            refresh_token: self.issue(principal, TokenKind::Refresh)?,
            token_type: "bearer".to_string(),
            expires_in: self.access_ttl.num_seconds(),
        })
    }

    /// Decode and check signature, expiry and kind.
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<Claims, AppError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AppError::TokenExpired,
                _ => {
                    tracing::debug!(error = %e, "Token rejected");
                    AppError::InvalidToken
                }
            }
        })?;

        if data.claims.kind != expected {
            crate::security_event!(
                "token_kind_mismatch",
                user_id = %data.claims.sub,
                "Token presented for the wrong purpose"
            );
            return Err(AppError::InvalidToken);
        }
        Ok(data.claims)
    }
}

/// URL-safe random token of `length` characters.
pub fn generate_secure_token(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// API key of the form `pc_{purpose}_{32 random chars}`.
pub fn generate_api_key(user_id: &str, purpose: &str) -> String {
    let key = format!("pc_{}_{}", purpose, generate_secure_token(32));
    crate::security_event!(
        "api_key_generated",
        user_id = %user_id,
        purpose = %purpose,
        "API key generated"
    );
    key
}

/// Shape check for keys produced by [`generate_api_key`].
pub fn is_valid_api_key_format(key: &str) -> bool {
    let Some(rest) = key.strip_prefix("pc_") else {
        return false;
    };
    match rest.rsplit_once('_') {
        Some((purpose, secret)) => {
            !purpose.is_empty()
                && secret.len() == 32
                && secret.chars().all(|c| c.is_ascii_alphanumeric())
        }
        None => false,
    }
}
