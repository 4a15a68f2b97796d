//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use common::{CategoryId, PageRequest, ProductId};
use domain::{
    CatalogService, Category, CategoryDraft, ChangeContext, DomainError, NewOrder, OrderLine,
    OrderQuery, OrderService, OrderStatus, Product, ProductDraft, ProductQuery, StatusChange,
    Store,
};
use serial_test::serial;
use sqlx::PgPool;
use store::PostgresStore;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_shop_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE order_status_history, order_items, orders, products, categories CASCADE",
    )
    .execute(&pool)
    .await
    .unwrap();

    PostgresStore::new(pool)
}

async fn seed_product(store: &PostgresStore, code: &str, stock: i32) -> Product {
    let category = store
        .insert_category(Category::from_draft(CategoryDraft::new(format!("Cat {code}"))))
        .await
        .unwrap();
    store
        .insert_product(Product::from_draft(
            ProductDraft::new(format!("Product {code}"), code, category.id, 1_999).with_stock(stock),
        ))
        .await
        .unwrap()
}

async fn stock(store: &PostgresStore, id: ProductId) -> i32 {
    store.get_product(id).await.unwrap().unwrap().stock_quantity
}

#[tokio::test]
#[serial]
async fn category_round_trip_and_soft_delete() {
    let store = get_test_store().await;
    let parent = store
        .insert_category(Category::from_draft(CategoryDraft::new("Garden")))
        .await
        .unwrap();
    let child = store
        .insert_category(Category::from_draft(
            CategoryDraft::new("Tools")
                .with_parent(parent.id)
                .with_description("Hand tools"),
        ))
        .await
        .unwrap();

    let loaded = store.get_category(child.id).await.unwrap().unwrap();
    assert_eq!(loaded.parent_id, Some(parent.id));
    assert_eq!(loaded.description.as_deref(), Some("Hand tools"));

    let deleted = store
        .soft_delete_categories(&[parent.id, child.id])
        .await
        .unwrap();
    assert_eq!(deleted, 2);
    assert!(store.get_category(child.id).await.unwrap().is_none());
    assert!(store.list_categories().await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn duplicate_product_code_maps_to_domain_error() {
    let store = get_test_store().await;
    let product = seed_product(&store, "DUP-1", 1).await;
    store.soft_delete_product(product.id).await.unwrap();

    let again = Product::from_draft(ProductDraft::new(
        "Other",
        "DUP-1",
        product.category_id,
        100,
    ));
    let err = store.insert_product(again).await.unwrap_err();
    assert!(matches!(err, DomainError::DuplicateProductCode(_)));
}

#[tokio::test]
#[serial]
async fn product_filters_run_in_sql() {
    let store = get_test_store().await;
    let a = seed_product(&store, "F-1", 0).await;
    let b = seed_product(&store, "F-2", 4).await;

    let mut discounted = b.clone();
    discounted.discount_percent = 50;
    store.update_product(discounted, false).await.unwrap();

    let in_stock = store
        .list_products(&ProductQuery::new().in_stock(true))
        .await
        .unwrap();
    assert_eq!(in_stock.count, 1);
    assert_eq!(in_stock.results[0].id, b.id);

    // 19.99 at 50% off rounds half up to 10.00
    let cheap = store
        .list_products(&ProductQuery::new().price_between(None, Some(1_000)))
        .await
        .unwrap();
    assert_eq!(cheap.count, 1);
    assert_eq!(cheap.results[0].id, b.id);

    let by_category = store
        .list_products(
            &ProductQuery::new()
                .category(a.category_id)
                .paged(PageRequest::new(10, 0)),
        )
        .await
        .unwrap();
    assert_eq!(by_category.count, 1);
    assert_eq!(by_category.results[0].code, "F-1");
}

#[tokio::test]
#[serial]
async fn order_then_cancel_restores_stock() {
    let store = Arc::new(get_test_store().await);
    let product = seed_product(&store, "ORD-1", 10).await;
    let orders = OrderService::new(store.clone());

    let order = orders
        .place_order(
            vec![OrderLine::new(product.id, 3)],
            ChangeContext::api(Some("alice".into()), Some("10.0.0.1".into())),
            None,
        )
        .await
        .unwrap();
    assert_eq!(stock(&store, product.id).await, 7);
    assert_eq!(order.items.len(), 1);
    assert_eq!(order.total_price.cents(), 3 * 1_999);

    let history = orders.history(order.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].new_status, OrderStatus::Pending);
    assert_eq!(history[0].changed_by.as_deref(), Some("alice"));

    orders
        .cancel_order(order.id, ChangeContext::system(), Some("customer request".into()))
        .await
        .unwrap();
    assert_eq!(stock(&store, product.id).await, 10);

    let history = orders.history(order.id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].new_status, OrderStatus::Cancelled);
    assert_eq!(history[0].old_status, Some(OrderStatus::Pending));
    assert_eq!(history[0].notes.as_deref(), Some("customer request"));
}

#[tokio::test]
#[serial]
async fn failed_order_rolls_back_every_line() {
    let store = get_test_store().await;
    let plenty = seed_product(&store, "RB-1", 50).await;
    let scarce = seed_product(&store, "RB-2", 1).await;

    let err = store
        .place_order(NewOrder::new(
            vec![OrderLine::new(plenty.id, 5), OrderLine::new(scarce.id, 2)],
            ChangeContext::system(),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InsufficientStock { .. }));

    assert_eq!(stock(&store, plenty.id).await, 50);
    assert_eq!(stock(&store, scarce.id).await, 1);
    let orders = store.list_orders(&OrderQuery::default()).await.unwrap();
    assert_eq!(orders.count, 0);
}

#[tokio::test]
#[serial]
async fn concurrent_orders_never_oversell() {
    let store = Arc::new(get_test_store().await);
    let product = seed_product(&store, "RACE-1", 5).await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .place_order(NewOrder::new(
                    vec![OrderLine::new(product.id, 1)],
                    ChangeContext::system(),
                ))
                .await
        }));
    }

    let mut placed = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            placed += 1;
        }
    }
    assert_eq!(placed, 5);
    assert_eq!(stock(&store, product.id).await, 0);
}

#[tokio::test]
#[serial]
async fn noop_and_invalid_transitions_write_nothing() {
    let store = get_test_store().await;
    let product = seed_product(&store, "TR-1", 3).await;
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
            StatusChange::new(OrderStatus::Pending, ChangeContext::system()),
        )
        .await
        .unwrap();
    let err = store
        .transition_order(
            order.id,
            StatusChange::new(OrderStatus::Shipped, ChangeContext::system()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidStatusTransition { .. }));

    assert_eq!(store.order_history(order.id).await.unwrap().len(), 1);
    assert_eq!(stock(&store, product.id).await, 2);
}

#[tokio::test]
#[serial]
async fn history_rows_cannot_be_changed() {
    let store = get_test_store().await;
    let product = seed_product(&store, "IMM-1", 3).await;
    let order = store
        .place_order(NewOrder::new(
            vec![OrderLine::new(product.id, 1)],
            ChangeContext::system(),
        ))
        .await
        .unwrap();

    let result = sqlx::query("UPDATE order_status_history SET notes = 'edited' WHERE order_id = $1")
        .bind(order.id.as_uuid())
        .execute(store.pool())
        .await;
    assert!(result.is_err());

    let result = sqlx::query("DELETE FROM order_status_history WHERE order_id = $1")
        .bind(order.id.as_uuid())
        .execute(store.pool())
        .await;
    assert!(result.is_err());

    // The order cannot take its history with it either.
    let result = sqlx::query("DELETE FROM orders WHERE id = $1")
        .bind(order.id.as_uuid())
        .execute(store.pool())
        .await;
    assert!(result.is_err());
    assert_eq!(store.order_history(order.id).await.unwrap().len(), 1);
}

#[tokio::test]
#[serial]
async fn product_edit_keeps_stock_taken_by_later_orders() {
    let store = get_test_store().await;
    let product = seed_product(&store, "EDIT-1", 10).await;

    // Read before the order lands, write after it.
    let mut stale = product.clone();
    store
        .place_order(NewOrder::new(
            vec![OrderLine::new(product.id, 3)],
            ChangeContext::system(),
        ))
        .await
        .unwrap();

    stale.name = "Renamed".to_string();
    let updated = store.update_product(stale.clone(), false).await.unwrap();
    assert_eq!(updated.name, "Renamed");
    assert_eq!(updated.stock_quantity, 7);
    assert_eq!(stock(&store, product.id).await, 7);

    stale.stock_quantity = 25;
    store.update_product(stale, true).await.unwrap();
    assert_eq!(stock(&store, product.id).await, 25);
}

#[tokio::test]
#[serial]
async fn orders_list_by_status() {
    let store = Arc::new(get_test_store().await);
    let product = seed_product(&store, "LS-1", 10).await;
    let orders = OrderService::new(store.clone());

    let first = orders
        .place_order(vec![OrderLine::new(product.id, 1)], ChangeContext::system(), None)
        .await
        .unwrap();
    orders
        .place_order(vec![OrderLine::new(product.id, 2)], ChangeContext::system(), None)
        .await
        .unwrap();
    orders
        .change_status(first.id, OrderStatus::Confirmed, ChangeContext::system(), None)
        .await
        .unwrap();

    let confirmed = store
        .list_orders(&OrderQuery {
            status: Some(OrderStatus::Confirmed),
            page: PageRequest::default(),
        })
        .await
        .unwrap();
    assert_eq!(confirmed.count, 1);
    assert_eq!(confirmed.results[0].id, first.id);
    assert_eq!(confirmed.results[0].items[0].quantity, 1);

    let all = store.list_orders(&OrderQuery::default()).await.unwrap();
    assert_eq!(all.count, 2);
}

#[tokio::test]
#[serial]
async fn catalog_service_over_postgres() {
    let store = Arc::new(get_test_store().await);
    let catalog = CatalogService::new(store.clone());

    let root = catalog
        .create_category(CategoryDraft::new("Music"))
        .await
        .unwrap();
    catalog
        .create_category(CategoryDraft::new("Vinyl").with_parent(root.id))
        .await
        .unwrap();

    let page = catalog
        .list_categories(Some(true), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.count, 1);
    assert_eq!(page.results[0].sub_categories.len(), 1);

    let missing = catalog.get_category(CategoryId::new()).await;
    assert!(matches!(missing, Err(DomainError::NotFound { .. })));
}
