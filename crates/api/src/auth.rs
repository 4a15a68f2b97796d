//! HS256 bearer tokens.
//!
//! Access tokens authenticate requests. Refresh tokens are exchanged for a new
//! pair and are single use: each refresh revokes the token it consumed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::Config;
use crate::error::ApiError;

/// Default refresh token lifetime: one day.
pub const DEFAULT_REFRESH_TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenType::Access => f.write_str("access"),
            TokenType::Refresh => f.write_str("refresh"),
        }
    }
}

/// JWT claims carried by access and refresh tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Username of the caller.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub token_type: TokenType,
}

impl Claims {
    pub fn new(username: &str, expires_in_secs: i64, token_type: TokenType) -> Self {
        let now = Utc::now();
        Self {
            sub: username.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(expires_in_secs)).timestamp(),
            jti: Uuid::new_v4().to_string(),
            token_type,
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authorization header must be `Bearer <token>`")]
    MalformedHeader,

    #[error("Given token not valid: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("Given token not valid for any token type: expected {expected} token")]
    WrongTokenType { expected: TokenType },

    #[error("Token is blacklisted")]
    Revoked,

    #[error("failed to sign token: {0}")]
    Signing(jsonwebtoken::errors::Error),
}

/// An access token with the refresh token that renews it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Issues, validates and rotates tokens.
///
/// Revoked refresh token ids are kept in memory until the token would have
/// expired anyway.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_ttl_secs: i64,
    refresh_token_ttl_secs: i64,
    revoked: Arc<Mutex<HashMap<String, i64>>>,
}

impl TokenService {
    pub fn new(secret: &str, access_token_ttl_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_token_ttl_secs,
            refresh_token_ttl_secs: DEFAULT_REFRESH_TOKEN_TTL_SECS,
            revoked: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_refresh_ttl(mut self, refresh_token_ttl_secs: i64) -> Self {
        self.refresh_token_ttl_secs = refresh_token_ttl_secs;
        self
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.jwt_signing_key, config.access_token_ttl_secs)
            .with_refresh_ttl(config.refresh_token_ttl_secs)
    }

    /// Signs a fresh access token for `username`.
    pub fn issue(&self, username: &str) -> Result<String, AuthError> {
        self.encode(&Claims::new(
            username,
            self.access_token_ttl_secs,
            TokenType::Access,
        ))
    }

    /// Signs an access token and a refresh token for `username`.
    pub fn issue_pair(&self, username: &str) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access: self.issue(username)?,
            refresh: self.encode(&Claims::new(
                username,
                self.refresh_token_ttl_secs,
                TokenType::Refresh,
            ))?,
        })
    }

    pub fn encode(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &self.encoding_key,
        )
        .map_err(AuthError::Signing)
    }

    /// Checks signature and expiry. Accepts either token type.
    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)?.claims;
        if self.is_revoked(&claims.jti) {
            return Err(AuthError::Revoked);
        }
        Ok(claims)
    }

    pub fn validate_access(&self, token: &str) -> Result<Claims, AuthError> {
        self.validate_as(token, TokenType::Access)
    }

    /// Exchanges a refresh token for a new pair. The consumed refresh token
    /// cannot be used again.
    pub fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.validate_as(refresh_token, TokenType::Refresh)?;
        if !self.revoke(&claims) {
            return Err(AuthError::Revoked);
        }
        self.issue_pair(&claims.sub)
    }

    fn validate_as(&self, token: &str, expected: TokenType) -> Result<Claims, AuthError> {
        let claims = self.validate(token)?;
        if claims.token_type != expected {
            return Err(AuthError::WrongTokenType { expected });
        }
        Ok(claims)
    }

    /// Returns false if the token was already revoked.
    fn revoke(&self, claims: &Claims) -> bool {
        let now = Utc::now().timestamp();
        let mut revoked = self.revoked.lock().unwrap_or_else(PoisonError::into_inner);
        revoked.retain(|_, exp| *exp > now);
        revoked.insert(claims.jti.clone(), claims.exp).is_none()
    }

    fn is_revoked(&self, jti: &str) -> bool {
        self.revoked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(jti)
    }
}

/// Validates an optional bearer token and stores its claims in the request
/// extensions.
///
/// Requests without an `Authorization` header pass through anonymously. A
/// header that is present but invalid is rejected with 401 on every route.
pub async fn authenticate(
    State(tokens): State<TokenService>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(header) = request.headers().get(AUTHORIZATION) else {
        return next.run(request).await;
    };

    let token = header
        .to_str()
        .ok()
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or(AuthError::MalformedHeader);

    match token.and_then(|t| tokens.validate_access(t)) {
        Ok(claims) => {
            tracing::debug!(user = %claims.sub, "Token validated");
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(e) => {
            tracing::warn!(error = %e, "Token validation failed");
            ApiError::Unauthorized(e.to_string()).into_response()
        }
    }
}
