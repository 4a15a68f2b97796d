use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{CategoryId, OrderId, Page, ProductId};
use domain::order::{consolidate, ensure_available, plan_transition};
use domain::{
    Category, DomainError, NewOrder, Order, OrderItem, OrderQuery, OrderStatus, Product,
    ProductQuery, Result, StatusChange, StatusHistoryEntry, StockEffect, Store,
};
use tokio::sync::RwLock;

use crate::units;

#[derive(Debug, Clone)]
struct Record<T> {
    value: T,
    deleted: bool,
}

impl<T> Record<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            deleted: false,
        }
    }

    fn visible(&self) -> Option<&T> {
        (!self.deleted).then_some(&self.value)
    }
}

#[derive(Default)]
struct State {
    categories: HashMap<CategoryId, Record<Category>>,
    products: HashMap<ProductId, Record<Product>>,
    orders: HashMap<OrderId, Order>,
    /// Every history row in insertion order.
    history: Vec<StatusHistoryEntry>,
}

/// In-memory store implementation for tests and database-less runs.
///
/// All writes take one lock, so order placement and status changes are
/// atomic with respect to each other.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Returns the total number of history rows across all orders.
    pub async fn history_count(&self) -> usize {
        self.state.read().await.history.len()
    }

    /// Clears everything, including soft-deleted rows.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        *state = State::default();
    }
}

fn code_taken(state: &State, code: &str, except: Option<ProductId>) -> bool {
    state
        .products
        .values()
        .any(|r| r.value.code == code && Some(r.value.id) != except)
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_category(&self, category: Category) -> Result<Category> {
        let mut state = self.state.write().await;
        state
            .categories
            .insert(category.id, Record::new(category.clone()));
        Ok(category)
    }

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>> {
        let state = self.state.read().await;
        Ok(state
            .categories
            .get(&id)
            .and_then(Record::visible)
            .cloned())
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let state = self.state.read().await;
        Ok(state
            .categories
            .values()
            .filter_map(Record::visible)
            .cloned()
            .collect())
    }

    async fn update_category(&self, category: Category) -> Result<Category> {
        let mut state = self.state.write().await;
        match state.categories.get_mut(&category.id) {
            Some(record) if !record.deleted => {
                record.value = category.clone();
                Ok(category)
            }
            _ => Err(DomainError::not_found("Category", category.id)),
        }
    }

    async fn soft_delete_categories(&self, ids: &[CategoryId]) -> Result<u64> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let mut deleted = 0;
        for id in ids {
            if let Some(record) = state.categories.get_mut(id)
                && !record.deleted
            {
                record.deleted = true;
                record.value.updated_at = now;
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn insert_product(&self, product: Product) -> Result<Product> {
        let mut state = self.state.write().await;
        if code_taken(&state, &product.code, None) {
            return Err(DomainError::DuplicateProductCode(product.code));
        }
        state
            .products
            .insert(product.id, Record::new(product.clone()));
        Ok(product)
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let state = self.state.read().await;
        Ok(state.products.get(&id).and_then(Record::visible).cloned())
    }

    async fn list_products(&self, query: &ProductQuery) -> Result<Page<Product>> {
        let state = self.state.read().await;
        let mut products: Vec<Product> = state
            .products
            .values()
            .filter_map(Record::visible)
            .filter(|p| query.matches(p))
            .cloned()
            .collect();
        products.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(query.page.slice(products))
    }

    async fn update_product(&self, mut product: Product, write_stock: bool) -> Result<Product> {
        let mut state = self.state.write().await;
        if code_taken(&state, &product.code, Some(product.id)) {
            return Err(DomainError::DuplicateProductCode(product.code));
        }
        match state.products.get_mut(&product.id) {
            Some(record) if !record.deleted => {
                if !write_stock {
                    product.stock_quantity = record.value.stock_quantity;
                }
                record.value = product.clone();
                Ok(product)
            }
            _ => Err(DomainError::not_found("Product", product.id)),
        }
    }

    async fn soft_delete_product(&self, id: ProductId) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.products.get_mut(&id) {
            Some(record) if !record.deleted => {
                record.deleted = true;
                record.value.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn place_order(&self, order: NewOrder) -> Result<Order> {
        let mut state = self.state.write().await;

        // Check every line before touching any stock.
        let mut items = Vec::new();
        for (product_id, quantity) in consolidate(&order.lines) {
            let product = state
                .products
                .get(&product_id)
                .and_then(Record::visible)
                .ok_or_else(|| DomainError::not_found("Product", product_id))?;
            items.push(OrderItem::snapshot(product, quantity)?);
        }

        let now = Utc::now();
        for item in &items {
            if let Some(record) = state.products.get_mut(&item.product_id) {
                record.value.stock_quantity -= units(item.quantity);
                record.value.updated_at = now;
            }
        }

        let placed = Order::placed(&order, items, now);
        state.history.push(StatusHistoryEntry::record(
            placed.id,
            None,
            OrderStatus::Pending,
            &order.context,
            order.notes,
            now,
        ));
        state.orders.insert(placed.id, placed.clone());
        Ok(placed)
    }

    async fn transition_order(&self, id: OrderId, change: StatusChange) -> Result<Order> {
        let mut guard = self.state.write().await;
        let State {
            products,
            orders,
            history,
            ..
        } = &mut *guard;

        let order = orders
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("Order", id))?;
        let Some(effect) = plan_transition(order.status, change.new_status)? else {
            return Ok(order.clone());
        };

        let now = Utc::now();
        match effect {
            StockEffect::Reserve => {
                for item in &order.items {
                    let available = products
                        .get(&item.product_id)
                        .map(|r| r.value.stock_quantity)
                        .unwrap_or(0);
                    ensure_available(item.product_id, item.quantity, available)?;
                }
                for item in &order.items {
                    if let Some(record) = products.get_mut(&item.product_id) {
                        record.value.stock_quantity -= units(item.quantity);
                        record.value.updated_at = now;
                    }
                }
            }
            StockEffect::Release => {
                for item in &order.items {
                    if let Some(record) = products.get_mut(&item.product_id) {
                        record.value.stock_quantity += units(item.quantity);
                        record.value.updated_at = now;
                    }
                }
            }
            StockEffect::Keep => {}
        }

        history.push(StatusHistoryEntry::record(
            id,
            Some(order.status),
            change.new_status,
            &change.context,
            change.notes,
            now,
        ));
        order.status = change.new_status;
        order.status_changed_at = Some(now);
        order.updated_at = now;
        Ok(order.clone())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state.orders.get(&id).cloned())
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<Page<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|o| query.status.is_none_or(|s| o.status == s))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(query.page.slice(orders))
    }

    async fn order_history(&self, id: OrderId) -> Result<Vec<StatusHistoryEntry>> {
        let state = self.state.read().await;
        Ok(state
            .history
            .iter()
            .rev()
            .filter(|entry| entry.order_id == id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{CategoryDraft, ChangeContext, OrderLine, ProductDraft};

    async fn seeded(stock: i32) -> (InMemoryStore, Product) {
        let store = InMemoryStore::new();
        let category = store
            .insert_category(Category::from_draft(CategoryDraft::new("Tools")))
            .await
            .unwrap();
        let product = store
            .insert_product(Product::from_draft(
                ProductDraft::new("Hammer", "HM-1", category.id, 1_500).with_stock(stock),
            ))
            .await
            .unwrap();
        (store, product)
    }

    #[tokio::test]
    async fn deleted_product_is_invisible_but_keeps_its_code() {
        let (store, product) = seeded(1).await;
        assert!(store.soft_delete_product(product.id).await.unwrap());
        assert!(!store.soft_delete_product(product.id).await.unwrap());
        assert!(store.get_product(product.id).await.unwrap().is_none());

        let again = Product::from_draft(ProductDraft::new(
            "Hammer 2",
            "HM-1",
            product.category_id,
            100,
        ));
        let err = store.insert_product(again).await.unwrap_err();
        assert!(matches!(err, DomainError::DuplicateProductCode(code) if code == "HM-1"));
    }

    #[tokio::test]
    async fn failed_placement_changes_nothing() {
        let (store, product) = seeded(2).await;
        let order = NewOrder::new(
            vec![OrderLine::new(product.id, 3)],
            ChangeContext::system(),
        );
        assert!(store.place_order(order).await.is_err());
        assert_eq!(store.order_count().await, 0);
        assert_eq!(store.history_count().await, 0);
        let after = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(after.stock_quantity, 2);
    }

    #[tokio::test]
    async fn history_is_newest_first() {
        let (store, product) = seeded(5).await;
        let order = store
            .place_order(NewOrder::new(
                vec![OrderLine::new(product.id, 1)],
                ChangeContext::system(),
            ))
            .await
            .unwrap();
        store
            .transition_order(
                order.id,
                StatusChange::new(OrderStatus::Confirmed, ChangeContext::system()),
            )
            .await
            .unwrap();

        let history = store.order_history(order.id).await.unwrap();
        let statuses: Vec<_> = history.iter().map(|h| h.new_status).collect();
        assert_eq!(statuses, vec![OrderStatus::Confirmed, OrderStatus::Pending]);
    }

    #[tokio::test]
    async fn clear_empties_the_store() {
        let (store, _) = seeded(1).await;
        store.clear().await;
        assert!(store.list_categories().await.unwrap().is_empty());
    }
}
