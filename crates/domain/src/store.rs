//! Persistence port implemented by the `store` crate.

use async_trait::async_trait;
use common::{CategoryId, OrderId, Page, PageRequest, ProductId};

use crate::catalog::{Category, Product};
use crate::error::Result;
use crate::order::{NewOrder, Order, OrderStatus, StatusChange, StatusHistoryEntry};

/// Filters for listing products.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductQuery {
    pub category_id: Option<CategoryId>,
    /// Inclusive lower bound on the final price, in cents.
    pub min_price: Option<i64>,
    /// Inclusive upper bound on the final price, in cents.
    pub max_price: Option<i64>,
    pub in_stock: Option<bool>,
    pub active: Option<bool>,
    pub page: PageRequest,
}

impl ProductQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn category(mut self, category_id: CategoryId) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn price_between(mut self, min: Option<i64>, max: Option<i64>) -> Self {
        self.min_price = min;
        self.max_price = max;
        self
    }

    pub fn in_stock(mut self, in_stock: bool) -> Self {
        self.in_stock = Some(in_stock);
        self
    }

    pub fn paged(mut self, page: PageRequest) -> Self {
        self.page = page;
        self
    }

    /// Returns true if `product` passes every filter. Paging is not applied.
    pub fn matches(&self, product: &Product) -> bool {
        let price = product.final_price().cents();
        self.category_id.is_none_or(|id| product.category_id == id)
            && self.min_price.is_none_or(|min| price >= min)
            && self.max_price.is_none_or(|max| price <= max)
            && self.in_stock.is_none_or(|want| product.in_stock() == want)
            && self.active.is_none_or(|want| product.active == want)
    }
}

/// Filters for listing orders. Results are newest first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderQuery {
    pub status: Option<OrderStatus>,
    pub page: PageRequest,
}

/// Storage for the catalog and orders.
///
/// Soft-deleted categories and products are invisible to every read.
/// `place_order` and `transition_order` must apply their stock changes and
/// history rows atomically: either all of it is persisted or none.
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_category(&self, category: Category) -> Result<Category>;

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>>;

    /// Every visible category, in no particular order.
    async fn list_categories(&self) -> Result<Vec<Category>>;

    /// Overwrites a visible category. Fails with `NotFound` otherwise.
    async fn update_category(&self, category: Category) -> Result<Category>;

    /// Soft-deletes the given categories. Returns how many were deleted.
    async fn soft_delete_categories(&self, ids: &[CategoryId]) -> Result<u64>;

    /// Fails with `DuplicateProductCode` if the code is taken, including by a
    /// soft-deleted product.
    async fn insert_product(&self, product: Product) -> Result<Product>;

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;

    /// Matching products ordered by name.
    async fn list_products(&self, query: &ProductQuery) -> Result<Page<Product>>;

    /// Overwrites the editable fields of a visible product and returns the
    /// stored row. The stock level is only written when `write_stock` is set,
    /// so orders placed since `product` was read are kept.
    async fn update_product(&self, product: Product, write_stock: bool) -> Result<Product>;

    /// Returns false if the product did not exist or was already deleted.
    async fn soft_delete_product(&self, id: ProductId) -> Result<bool>;

    /// Creates an order, reserving stock for every line and recording the
    /// creation history row.
    ///
    /// Fails with `NotFound` for unknown products and `InsufficientStock` for
    /// the first product (in ascending id order) that cannot cover its line.
    async fn place_order(&self, order: NewOrder) -> Result<Order>;

    /// Moves an order to a new status, applying the stock effect and
    /// recording one history row. Writing the current status is a no-op.
    async fn transition_order(&self, id: OrderId, change: StatusChange) -> Result<Order>;

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    async fn list_orders(&self, query: &OrderQuery) -> Result<Page<Order>>;

    /// History rows for an order, newest first.
    async fn order_history(&self, id: OrderId) -> Result<Vec<StatusHistoryEntry>>;
}
