//! API error types with HTTP response mapping.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::IdParseError;
use domain::{DomainError, ValidationErrors};
use serde_json::json;

use crate::auth::AuthError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Field-level validation failure raised by the HTTP layer itself.
    Validation(ValidationErrors),
    /// Missing or invalid credentials.
    Unauthorized(String),
    /// Domain logic error.
    Domain(DomainError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ApiError::Validation(errors) => validation_body(&errors),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, json!({ "error": msg })),
            ApiError::Domain(err) => domain_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal server error" }),
                )
            }
        };

        (status, axum::Json(body)).into_response()
    }
}

fn validation_body(errors: &ValidationErrors) -> (StatusCode, serde_json::Value) {
    (
        StatusCode::BAD_REQUEST,
        json!({ "error": format!("Validation failed: {errors}"), "fields": errors }),
    )
}

fn domain_error_to_response(err: DomainError) -> (StatusCode, serde_json::Value) {
    match &err {
        DomainError::Validation(errors) => validation_body(errors),
        DomainError::InsufficientStock { product_id, .. } => (
            StatusCode::BAD_REQUEST,
            json!({ "error": err.to_string(), "product_id": product_id }),
        ),
        DomainError::DuplicateProductCode(_) => (
            StatusCode::BAD_REQUEST,
            json!({
                "error": err.to_string(),
                "fields": { "code": ["product with this code already exists."] },
            }),
        ),
        DomainError::NotFound { .. } => (StatusCode::NOT_FOUND, json!({ "error": err.to_string() })),
        DomainError::InvalidStatusTransition { .. } => {
            (StatusCode::CONFLICT, json!({ "error": err.to_string() }))
        }
        DomainError::Database(e) => {
            tracing::error!(error = %e, "database error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "Internal server error" }),
            )
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        ApiError::Validation(errors)
    }
}

impl From<IdParseError> for ApiError {
    fn from(err: IdParseError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Signing(e) => ApiError::Internal(e.to_string()),
            other => ApiError::Unauthorized(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
