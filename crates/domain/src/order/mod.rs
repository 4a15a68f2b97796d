//! Orders, their items and status history.

mod history;
mod service;
mod status;
mod stock;

pub use history::{ChangeContext, ChangeSource, StatusHistoryEntry};
pub use service::{OrderDetails, OrderService};
pub use status::OrderStatus;
pub use stock::{StockEffect, consolidate, ensure_available, plan_transition, stock_effect};

use chrono::{DateTime, Utc};
use common::{Money, OrderId, ProductId};
use serde::{Deserialize, Serialize};

use crate::catalog::Product;
use crate::error::DomainError;
use crate::validation::ValidationErrors;

/// An order with its items. Items never change after placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_code: String,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub total_price: Money,
    pub status_changed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Builds a freshly placed, pending order.
    pub fn placed(new_order: &NewOrder, items: Vec<OrderItem>, at: DateTime<Utc>) -> Self {
        let total_price = items.iter().map(OrderItem::line_total).sum();
        Self {
            id: new_order.id,
            order_code: new_order.order_code.clone(),
            status: OrderStatus::Pending,
            items,
            total_price,
            status_changed_at: Some(at),
            created_at: at,
            updated_at: at,
        }
    }

    /// Total number of units across all items.
    pub fn total_quantity(&self) -> u64 {
        self.items.iter().map(|i| u64::from(i.quantity)).sum()
    }
}

/// A product line inside an order, with the price captured at order time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub product_code: String,
    pub quantity: u32,
    pub unit_price: Money,
}

impl OrderItem {
    /// Snapshots `product` for an order of `quantity` units.
    ///
    /// Fails when the product is inactive or cannot cover the quantity.
    pub fn snapshot(product: &Product, quantity: u32) -> Result<Self, DomainError> {
        if !product.active {
            return Err(ValidationErrors::single(
                "items",
                format!("Product {} is not available for ordering.", product.id),
            )
            .into());
        }
        ensure_available(product.id, quantity, product.stock_quantity)?;
        Ok(Self {
            product_id: product.id,
            product_name: product.name.clone(),
            product_code: product.code.clone(),
            quantity,
            unit_price: product.final_price(),
        })
    }

    /// Returns the total price for this item (quantity * unit_price).
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// A requested product and quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl OrderLine {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// Everything a store needs to place an order atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub id: OrderId,
    pub order_code: String,
    pub lines: Vec<OrderLine>,
    pub context: ChangeContext,
    pub notes: Option<String>,
}

impl NewOrder {
    pub fn new(lines: Vec<OrderLine>, context: ChangeContext) -> Self {
        Self {
            id: OrderId::new(),
            order_code: generate_order_code(),
            lines,
            context,
            notes: None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.lines.is_empty() {
            errors.add("items", "An order needs at least one item.");
        }
        if self.lines.iter().any(|l| l.quantity == 0) {
            errors.add("quantity", "Ensure this value is greater than or equal to 1.");
        }
        let total: u64 = self.lines.iter().map(|l| u64::from(l.quantity)).sum();
        if total > i32::MAX as u64 {
            errors.add("quantity", "Requested quantity is too large.");
        }
        errors.into_result()
    }
}

/// A requested status write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub new_status: OrderStatus,
    pub context: ChangeContext,
    pub notes: Option<String>,
}

impl StatusChange {
    pub fn new(new_status: OrderStatus, context: ChangeContext) -> Self {
        Self {
            new_status,
            context,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }
}

/// Generates a human-facing order code such as `ORD-3F9A0C12BE`.
pub fn generate_order_code() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("ORD-{}", hex[..10].to_ascii_uppercase())
}
