//! Domain layer for the storefront.
//!
//! This crate provides:
//! - Catalog models (categories, products) and the category tree
//! - Orders, the order status machine and the stock adjustment rule
//! - Append-only status history records
//! - The `Store` persistence port and the services built on it

pub mod catalog;
pub mod error;
pub mod order;
pub mod store;
pub mod validation;

pub use catalog::{
    CatalogService, Category, CategoryDraft, CategoryNode, CategoryPatch, CategorySummary,
    CategoryTree, Product, ProductDetails, ProductDraft, ProductPatch,
};
pub use error::{DomainError, Result};
pub use order::{
    ChangeContext, ChangeSource, NewOrder, Order, OrderDetails, OrderItem, OrderLine,
    OrderService, OrderStatus, StatusChange, StatusHistoryEntry, StockEffect,
};
pub use store::{OrderQuery, ProductQuery, Store};
pub use validation::ValidationErrors;
