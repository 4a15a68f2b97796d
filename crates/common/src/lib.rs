//! Shared types for the storefront workspace.

pub mod money;
pub mod pagination;
pub mod types;

pub use money::Money;
pub use pagination::{DEFAULT_LIMIT, MAX_LIMIT, Page, PageRequest};
pub use types::{CategoryId, HistoryId, IdParseError, OrderId, ProductId};
