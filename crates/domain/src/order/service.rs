//! Order service: placement, status changes and history on top of a [`Store`].

use std::sync::Arc;
use std::time::Instant;

use common::{OrderId, Page};

use crate::error::{DomainError, Result};
use crate::store::{OrderQuery, Store};

use super::{ChangeContext, NewOrder, Order, OrderLine, OrderStatus, StatusChange, StatusHistoryEntry};

/// An order together with its status history, newest entry first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDetails {
    pub order: Order,
    pub history: Vec<StatusHistoryEntry>,
}

/// Service for managing orders.
///
/// Every status write goes through [`Store::transition_order`], so stock and
/// history always move together with the order.
pub struct OrderService<S: Store> {
    store: Arc<S>,
}

impl<S: Store> Clone for OrderService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: Store> OrderService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Places an order, reserving stock for every line.
    #[tracing::instrument(skip(self, lines, context), fields(lines = lines.len()))]
    pub async fn place_order(
        &self,
        lines: Vec<OrderLine>,
        context: ChangeContext,
        notes: Option<String>,
    ) -> Result<Order> {
        let start = Instant::now();
        let mut new_order = NewOrder::new(lines, context);
        new_order.notes = notes;

        if let Err(errors) = new_order.validate() {
            metrics::counter!("orders_rejected_total", "reason" => "validation").increment(1);
            return Err(errors.into());
        }

        match self.store.place_order(new_order).await {
            Ok(order) => {
                metrics::counter!("orders_placed_total").increment(1);
                metrics::histogram!("order_placement_duration_seconds")
                    .record(start.elapsed().as_secs_f64());
                tracing::info!(
                    order_id = %order.id,
                    order_code = %order.order_code,
                    total = %order.total_price,
                    "Order placed"
                );
                Ok(order)
            }
            Err(e) => {
                let reason = match &e {
                    DomainError::InsufficientStock {
                        product_id,
                        requested,
                        available,
                    } => {
                        tracing::warn!(%product_id, requested, available, "Order rejected");
                        "insufficient_stock"
                    }
                    DomainError::NotFound { .. } => "not_found",
                    DomainError::Validation(_) => "validation",
                    _ => "error",
                };
                metrics::counter!("orders_rejected_total", "reason" => reason).increment(1);
                Err(e)
            }
        }
    }

    /// Writes a new status. Setting the current status again changes nothing.
    #[tracing::instrument(skip(self, context, notes))]
    pub async fn change_status(
        &self,
        id: OrderId,
        status: OrderStatus,
        context: ChangeContext,
        notes: Option<String>,
    ) -> Result<Order> {
        let before = self
            .store
            .get_order(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Order", id))?;

        let change = StatusChange::new(status, context).with_notes(notes);
        let order = self.store.transition_order(id, change).await?;

        if before.status != order.status {
            metrics::counter!("order_status_changes_total", "status" => order.status.as_str())
                .increment(1);
            tracing::info!(
                order_id = %id,
                from = %before.status,
                to = %order.status,
                "Order status changed"
            );
        }
        Ok(order)
    }

    /// Cancels an order and returns its stock.
    pub async fn cancel_order(
        &self,
        id: OrderId,
        context: ChangeContext,
        notes: Option<String>,
    ) -> Result<Order> {
        self.change_status(id, OrderStatus::Cancelled, context, notes)
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, id: OrderId) -> Result<OrderDetails> {
        let order = self
            .store
            .get_order(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Order", id))?;
        let history = self.store.order_history(id).await?;
        Ok(OrderDetails { order, history })
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_orders(&self, query: OrderQuery) -> Result<Page<Order>> {
        self.store.list_orders(&query).await
    }

    /// History rows for an order, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn history(&self, id: OrderId) -> Result<Vec<StatusHistoryEntry>> {
        if self.store.get_order(id).await?.is_none() {
            return Err(DomainError::not_found("Order", id));
        }
        self.store.order_history(id).await
    }
}
