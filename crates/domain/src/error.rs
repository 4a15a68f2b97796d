//! Domain error types.

use common::ProductId;
use thiserror::Error;

use crate::order::OrderStatus;
use crate::validation::ValidationErrors;

/// Errors that can occur during catalog and order operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Input failed field-level validation.
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// The requested entity does not exist or was deleted.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A product cannot cover the requested quantity.
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: i32,
    },

    /// The order's status machine does not allow this change.
    #[error("Invalid status transition: cannot move order from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    /// Another product already uses this code.
    #[error("Product code already exists: {0}")]
    DuplicateProductCode(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl DomainError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        DomainError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<ValidationErrors> for DomainError {
    fn from(errors: ValidationErrors) -> Self {
        DomainError::Validation(errors)
    }
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
