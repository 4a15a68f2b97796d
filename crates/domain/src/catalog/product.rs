//! Catalog products and their derived prices.

use chrono::{DateTime, Utc};
use common::{CategoryId, Money, ProductId};
use serde::{Deserialize, Serialize};

use crate::validation::{ValidationErrors, check_text};

/// Largest accepted base price: ten digits with two decimal places.
pub const MAX_PRICE_CENTS: i64 = 9_999_999_999;

/// A sellable product with its current stock level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub code: String,
    pub description: String,
    pub category_id: CategoryId,
    pub base_price: Money,
    pub discount_percent: u8,
    pub stock_quantity: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Builds a new product from validated input.
    pub fn from_draft(draft: ProductDraft) -> Self {
        let now = Utc::now();
        let mut product = Self {
            id: ProductId::new(),
            name: String::new(),
            code: String::new(),
            description: String::new(),
            category_id: draft.category_id,
            base_price: Money::zero(),
            discount_percent: 0,
            stock_quantity: 0,
            active: true,
            created_at: now,
            updated_at: now,
        };
        product.apply(draft);
        product.updated_at = now;
        product
    }

    /// Overwrites the editable fields. The draft must already be validated.
    pub fn apply(&mut self, draft: ProductDraft) {
        self.name = draft.name;
        self.code = draft.code;
        self.description = draft.description;
        self.category_id = draft.category_id;
        self.base_price = Money::from_cents(draft.base_price_cents);
        self.discount_percent = draft.discount_percent.clamp(0, 100) as u8;
        if let Some(stock) = draft.stock_quantity {
            self.stock_quantity = stock;
        }
        self.active = draft.active;
        self.updated_at = Utc::now();
    }

    /// Price after the discount is applied.
    pub fn final_price(&self) -> Money {
        self.base_price.discounted(self.discount_percent)
    }

    pub fn discount_amount(&self) -> Money {
        self.base_price - self.final_price()
    }

    pub fn in_stock(&self) -> bool {
        self.stock_quantity > 0
    }
}

/// Full set of editable product fields, as received from a client.
///
/// Numeric fields are kept wide so out-of-range input can be reported
/// instead of failing to parse. An unset `stock_quantity` keeps the current
/// level on update and starts at zero on create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductDraft {
    pub name: String,
    pub code: String,
    pub description: String,
    pub category_id: CategoryId,
    pub base_price_cents: i64,
    pub discount_percent: i32,
    pub stock_quantity: Option<i32>,
    pub active: bool,
}

impl ProductDraft {
    pub fn new(
        name: impl Into<String>,
        code: impl Into<String>,
        category_id: CategoryId,
        base_price_cents: i64,
    ) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
            description: String::new(),
            category_id,
            base_price_cents,
            discount_percent: 0,
            stock_quantity: None,
            active: true,
        }
    }

    pub fn with_stock(mut self, stock_quantity: i32) -> Self {
        self.stock_quantity = Some(stock_quantity);
        self
    }

    pub fn with_discount(mut self, discount_percent: i32) -> Self {
        self.discount_percent = discount_percent;
        self
    }

    /// Checks field shapes. Category existence and code uniqueness are
    /// checked by the catalog service and the store.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        check_text(&mut errors, "name", &self.name, 255);
        check_text(&mut errors, "code", &self.code, 50);
        if self.base_price_cents < 0 {
            errors.add(
                "base_price_cents",
                "Ensure this value is greater than or equal to 0.",
            );
        } else if self.base_price_cents > MAX_PRICE_CENTS {
            errors.add(
                "base_price_cents",
                format!("Ensure this value is less than or equal to {MAX_PRICE_CENTS}."),
            );
        }
        if !(0..=100).contains(&self.discount_percent) {
            errors.add(
                "discount_percent",
                "Ensure this value is between 0 and 100.",
            );
        }
        if self.stock_quantity.is_some_and(|stock| stock < 0) {
            errors.add(
                "stock_quantity",
                "Ensure this value is greater than or equal to 0.",
            );
        }
        errors.into_result()
    }
}

impl From<&Product> for ProductDraft {
    fn from(product: &Product) -> Self {
        Self {
            name: product.name.clone(),
            code: product.code.clone(),
            description: product.description.clone(),
            category_id: product.category_id,
            base_price_cents: product.base_price.cents(),
            discount_percent: i32::from(product.discount_percent),
            stock_quantity: None,
            active: product.active,
        }
    }
}

/// Partial product update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub code: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<CategoryId>,
    pub base_price_cents: Option<i64>,
    pub discount_percent: Option<i32>,
    pub stock_quantity: Option<i32>,
    pub active: Option<bool>,
}

impl ProductPatch {
    pub fn apply_to(self, draft: &mut ProductDraft) {
        if let Some(name) = self.name {
            draft.name = name;
        }
        if let Some(code) = self.code {
            draft.code = code;
        }
        if let Some(description) = self.description {
            draft.description = description;
        }
        if let Some(category_id) = self.category_id {
            draft.category_id = category_id;
        }
        if let Some(cents) = self.base_price_cents {
            draft.base_price_cents = cents;
        }
        if let Some(discount) = self.discount_percent {
            draft.discount_percent = discount;
        }
        if let Some(stock) = self.stock_quantity {
            draft.stock_quantity = Some(stock);
        }
        if let Some(active) = self.active {
            draft.active = active;
        }
    }
}
