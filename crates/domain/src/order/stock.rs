//! Stock adjustment rule for order lifecycle events.
//!
//! An order holds its items' stock in every status except `cancelled`. Stock
//! is decremented when an order starts holding (creation, reopen) and
//! restored when it stops holding (cancellation), so each decrement is undone
//! exactly once.

use std::collections::BTreeMap;

use common::ProductId;

use crate::error::DomainError;

use super::{OrderLine, OrderStatus};

/// What a status write does to product stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockEffect {
    /// Check availability and decrement every item's quantity.
    Reserve,
    /// Give every item's quantity back.
    Release,
    /// Leave stock alone.
    Keep,
}

/// Computes the stock effect of moving an order from `old` to `new`.
///
/// `old` is `None` when the order is being created.
pub fn stock_effect(old: Option<OrderStatus>, new: OrderStatus) -> StockEffect {
    let held_before = old.is_some_and(|s| s.holds_stock());
    match (held_before, new.holds_stock()) {
        (false, true) => StockEffect::Reserve,
        (true, false) => StockEffect::Release,
        _ => StockEffect::Keep,
    }
}

/// Checks a status write against the status machine.
///
/// Returns `None` when `next` equals `current` (a no-op write), otherwise the
/// stock effect the transition carries.
pub fn plan_transition(
    current: OrderStatus,
    next: OrderStatus,
) -> Result<Option<StockEffect>, DomainError> {
    if current == next {
        return Ok(None);
    }
    if !current.can_transition_to(next) {
        return Err(DomainError::InvalidStatusTransition {
            from: current,
            to: next,
        });
    }
    Ok(Some(stock_effect(Some(current), next)))
}

/// Sums quantities per product.
///
/// The map iterates in ascending product id order, which is also the order
/// product rows are locked in.
pub fn consolidate(lines: &[OrderLine]) -> BTreeMap<ProductId, u32> {
    let mut demand = BTreeMap::new();
    for line in lines {
        *demand.entry(line.product_id).or_insert(0) += line.quantity;
    }
    demand
}

/// Fails with `InsufficientStock` unless `available` covers `requested`.
pub fn ensure_available(
    product_id: ProductId,
    requested: u32,
    available: i32,
) -> Result<(), DomainError> {
    if i64::from(available) >= i64::from(requested) {
        Ok(())
    } else {
        Err(DomainError::InsufficientStock {
            product_id,
            requested,
            available,
        })
    }
}
