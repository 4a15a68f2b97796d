//! Token refresh and verification.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use domain::Store;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::auth::TokenPair;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub token: String,
}

/// Empty body returned for a valid token.
#[derive(Debug, Serialize)]
pub struct VerifyResponse {}

/// POST /api/auth/token/refresh: swap a refresh token for a new pair.
#[tracing::instrument(skip_all)]
pub async fn refresh<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    body: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<TokenPair>, ApiError> {
    let Json(req) = body?;
    let pair = state.tokens.refresh(&req.refresh)?;
    tracing::info!("Token refreshed");
    Ok(Json(pair))
}

/// POST /api/auth/token/verify: 200 for a valid token of either type.
#[tracing::instrument(skip_all)]
pub async fn verify<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    body: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let Json(req) = body?;
    state.tokens.validate(&req.token)?;
    Ok(Json(VerifyResponse {}))
}
