//! Storage backends for the storefront.
//!
//! Both backends implement [`domain::Store`]. [`PostgresStore`] runs each
//! order operation in one transaction with row locks on the touched products;
//! [`InMemoryStore`] serializes writers behind a single lock and is used for
//! tests and local runs without a database.

pub mod memory;
pub mod postgres;

pub use domain::Store;
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

/// Converts an order quantity to a stock delta.
///
/// Quantities are validated to fit in `i32` before they reach a store.
pub(crate) fn units(quantity: u32) -> i32 {
    i32::try_from(quantity).unwrap_or(i32::MAX)
}
