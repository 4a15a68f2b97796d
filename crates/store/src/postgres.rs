use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use common::{CategoryId, Money, OrderId, Page, ProductId};
use domain::order::{ChangeSource, consolidate, ensure_available, plan_transition};
use domain::{
    Category, DomainError, NewOrder, Order, OrderItem, OrderQuery, OrderStatus, Product,
    ProductQuery, Result, StatusChange, StatusHistoryEntry, StockEffect, Store,
};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::units;

const CATEGORY_COLUMNS: &str =
    "id, name, description, parent_id, image_url, active, created_at, updated_at";

const PRODUCT_COLUMNS: &str = "id, name, code, description, category_id, base_price_cents, \
     discount_percent, stock_quantity, active, created_at, updated_at";

const ORDER_COLUMNS: &str =
    "id, order_code, status, total_price_cents, status_changed_at, created_at, updated_at";

/// Final price in cents, rounded half up. Matches `Money::discounted`.
const FINAL_PRICE_SQL: &str = "((base_price_cents * (100 - discount_percent) + 50) / 100)";

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_category(row: &PgRow) -> Result<Category> {
        Ok(Category {
            id: CategoryId::from_uuid(row.try_get::<Uuid, _>("id")?),
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            parent_id: row
                .try_get::<Option<Uuid>, _>("parent_id")?
                .map(CategoryId::from_uuid),
            image_url: row.try_get("image_url")?,
            active: row.try_get("active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_product(row: &PgRow) -> Result<Product> {
        let discount: i16 = row.try_get("discount_percent")?;
        Ok(Product {
            id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
            name: row.try_get("name")?,
            code: row.try_get("code")?,
            description: row.try_get("description")?,
            category_id: CategoryId::from_uuid(row.try_get::<Uuid, _>("category_id")?),
            base_price: Money::from_cents(row.try_get("base_price_cents")?),
            discount_percent: discount.clamp(0, 100) as u8,
            stock_quantity: row.try_get("stock_quantity")?,
            active: row.try_get("active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_item(row: &PgRow) -> Result<OrderItem> {
        let quantity: i32 = row.try_get("quantity")?;
        Ok(OrderItem {
            product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            product_name: row.try_get("product_name")?,
            product_code: row.try_get("product_code")?,
            quantity: u32::try_from(quantity).map_err(|_| decode_error("order item quantity", quantity))?,
            unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
        })
    }

    fn row_to_order(row: &PgRow, items: Vec<OrderItem>) -> Result<Order> {
        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_code: row.try_get("order_code")?,
            status: status_from_code(row.try_get("status")?)?,
            items,
            total_price: Money::from_cents(row.try_get("total_price_cents")?),
            status_changed_at: row.try_get("status_changed_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_history(row: &PgRow) -> Result<StatusHistoryEntry> {
        let source: String = row.try_get("change_source")?;
        Ok(StatusHistoryEntry {
            id: row.try_get::<Uuid, _>("id")?.into(),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            old_status: row
                .try_get::<Option<i16>, _>("old_status")?
                .map(status_from_code)
                .transpose()?,
            new_status: status_from_code(row.try_get("new_status")?)?,
            changed_by: row.try_get("changed_by")?,
            change_source: ChangeSource::parse(&source).unwrap_or_default(),
            ip_address: row.try_get("ip_address")?,
            notes: row.try_get("notes")?,
            created_at: row.try_get("created_at")?,
        })
    }

    /// Loads the items of several orders, grouped by order id.
    async fn items_for(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderItem>>> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, product_id, product_name, product_code, quantity, unit_price_cents
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY order_id, position
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in &rows {
            let order_id: Uuid = row.try_get("order_id")?;
            grouped
                .entry(order_id)
                .or_default()
                .push(Self::row_to_item(row)?);
        }
        Ok(grouped)
    }

    async fn insert_history(
        tx: &mut Transaction<'_, Postgres>,
        entry: &StatusHistoryEntry,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO order_status_history
                (id, order_id, old_status, new_status, changed_by, change_source, ip_address, notes, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.order_id.as_uuid())
        .bind(entry.old_status.map(|s| s.code()))
        .bind(entry.new_status.code())
        .bind(&entry.changed_by)
        .bind(entry.change_source.as_str())
        .bind(&entry.ip_address)
        .bind(&entry.notes)
        .bind(entry.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Adds `delta` to a product's stock. The CHECK constraint rejects
    /// anything that would go negative.
    async fn adjust_stock(
        tx: &mut Transaction<'_, Postgres>,
        product_id: ProductId,
        delta: i32,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE products SET stock_quantity = stock_quantity + $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(product_id.as_uuid())
        .bind(delta)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

fn decode_error(what: &str, value: impl std::fmt::Display) -> DomainError {
    DomainError::Database(sqlx::Error::Decode(
        format!("invalid {what}: {value}").into(),
    ))
}

fn status_from_code(code: i16) -> Result<OrderStatus> {
    OrderStatus::from_code(code).ok_or_else(|| decode_error("order status code", code))
}

fn product_write_error(e: sqlx::Error, code: &str) -> DomainError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.constraint() == Some("products_code_unique")
    {
        return DomainError::DuplicateProductCode(code.to_string());
    }
    DomainError::Database(e)
}

/// Appends the WHERE clause for `query`, numbering parameters from 1.
fn product_filter_sql(query: &ProductQuery) -> String {
    let mut sql = String::from(" WHERE NOT deleted");
    let mut param_count = 0;

    if query.category_id.is_some() {
        param_count += 1;
        sql.push_str(&format!(" AND category_id = ${param_count}"));
    }
    if query.min_price.is_some() {
        param_count += 1;
        sql.push_str(&format!(" AND {FINAL_PRICE_SQL} >= ${param_count}"));
    }
    if query.max_price.is_some() {
        param_count += 1;
        sql.push_str(&format!(" AND {FINAL_PRICE_SQL} <= ${param_count}"));
    }
    if let Some(in_stock) = query.in_stock {
        sql.push_str(if in_stock {
            " AND stock_quantity > 0"
        } else {
            " AND stock_quantity = 0"
        });
    }
    if query.active.is_some() {
        param_count += 1;
        sql.push_str(&format!(" AND active = ${param_count}"));
    }
    sql
}

fn bind_product_filters<'q>(
    mut q: Query<'q, Postgres, PgArguments>,
    query: &ProductQuery,
) -> Query<'q, Postgres, PgArguments> {
    if let Some(id) = query.category_id {
        q = q.bind(id.as_uuid());
    }
    if let Some(min) = query.min_price {
        q = q.bind(min);
    }
    if let Some(max) = query.max_price {
        q = q.bind(max);
    }
    if let Some(active) = query.active {
        q = q.bind(active);
    }
    q
}

fn filter_param_count(query: &ProductQuery) -> usize {
    [
        query.category_id.is_some(),
        query.min_price.is_some(),
        query.max_price.is_some(),
        query.active.is_some(),
    ]
    .into_iter()
    .filter(|set| *set)
    .count()
}

#[async_trait]
impl Store for PostgresStore {
    async fn insert_category(&self, category: Category) -> Result<Category> {
        sqlx::query(
            r#"
            INSERT INTO categories (id, name, description, parent_id, image_url, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(category.id.as_uuid())
        .bind(&category.name)
        .bind(&category.description)
        .bind(category.parent_id.map(|p| p.as_uuid()))
        .bind(&category.image_url)
        .bind(category.active)
        .bind(category.created_at)
        .bind(category.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(category)
    }

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>> {
        let row = sqlx::query(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = $1 AND NOT deleted"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_category).transpose()
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let rows = sqlx::query(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE NOT deleted"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_category).collect()
    }

    async fn update_category(&self, category: Category) -> Result<Category> {
        let result = sqlx::query(
            r#"
            UPDATE categories
            SET name = $2, description = $3, parent_id = $4, image_url = $5, active = $6, updated_at = $7
            WHERE id = $1 AND NOT deleted
            "#,
        )
        .bind(category.id.as_uuid())
        .bind(&category.name)
        .bind(&category.description)
        .bind(category.parent_id.map(|p| p.as_uuid()))
        .bind(&category.image_url)
        .bind(category.active)
        .bind(category.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found("Category", category.id));
        }
        Ok(category)
    }

    async fn soft_delete_categories(&self, ids: &[CategoryId]) -> Result<u64> {
        let ids: Vec<Uuid> = ids.iter().map(CategoryId::as_uuid).collect();
        let result = sqlx::query(
            "UPDATE categories SET deleted = TRUE, updated_at = NOW() WHERE id = ANY($1) AND NOT deleted",
        )
        .bind(&ids)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn insert_product(&self, product: Product) -> Result<Product> {
        sqlx::query(
            r#"
            INSERT INTO products
                (id, name, code, description, category_id, base_price_cents, discount_percent,
                 stock_quantity, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(&product.code)
        .bind(&product.description)
        .bind(product.category_id.as_uuid())
        .bind(product.base_price.cents())
        .bind(i16::from(product.discount_percent))
        .bind(product.stock_quantity)
        .bind(product.active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| product_write_error(e, &product.code))?;

        Ok(product)
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 AND NOT deleted"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_product).transpose()
    }

    async fn list_products(&self, query: &ProductQuery) -> Result<Page<Product>> {
        let filter = product_filter_sql(query);

        let count_sql = format!("SELECT COUNT(*) AS total FROM products{filter}");
        let count_row = bind_product_filters(sqlx::query(&count_sql), query)
            .fetch_one(&self.pool)
            .await?;
        let total: i64 = count_row.try_get("total")?;

        let next = filter_param_count(query);
        let page_sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products{filter} ORDER BY name ASC, id ASC LIMIT ${} OFFSET ${}",
            next + 1,
            next + 2
        );
        let rows = bind_product_filters(sqlx::query(&page_sql), query)
            .bind(i64::from(query.page.limit()))
            .bind(i64::from(query.page.offset()))
            .fetch_all(&self.pool)
            .await?;

        Ok(Page {
            count: u64::try_from(total).unwrap_or(0),
            limit: query.page.limit(),
            offset: query.page.offset(),
            results: rows
                .iter()
                .map(Self::row_to_product)
                .collect::<Result<_>>()?,
        })
    }

    async fn update_product(&self, product: Product, write_stock: bool) -> Result<Product> {
        // Single statement: the row lock orders it against concurrent placements.
        let row = sqlx::query(&format!(
            r#"
            UPDATE products
            SET name = $2, code = $3, description = $4, category_id = $5, base_price_cents = $6,
                discount_percent = $7,
                stock_quantity = CASE WHEN $11 THEN $8 ELSE stock_quantity END,
                active = $9, updated_at = $10
            WHERE id = $1 AND NOT deleted
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(&product.code)
        .bind(&product.description)
        .bind(product.category_id.as_uuid())
        .bind(product.base_price.cents())
        .bind(i16::from(product.discount_percent))
        .bind(product.stock_quantity)
        .bind(product.active)
        .bind(product.updated_at)
        .bind(write_stock)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| product_write_error(e, &product.code))?;

        match row {
            Some(row) => Self::row_to_product(&row),
            None => Err(DomainError::not_found("Product", product.id)),
        }
    }

    async fn soft_delete_product(&self, id: ProductId) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE products SET deleted = TRUE, updated_at = NOW() WHERE id = $1 AND NOT deleted",
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn place_order(&self, order: NewOrder) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        // Lock product rows in ascending id order.
        let mut items = Vec::new();
        for (product_id, quantity) in consolidate(&order.lines) {
            let row = sqlx::query(&format!(
                "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 AND NOT deleted FOR UPDATE"
            ))
            .bind(product_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DomainError::not_found("Product", product_id))?;
            let product = Self::row_to_product(&row)?;
            items.push(OrderItem::snapshot(&product, quantity)?);
        }

        for item in &items {
            Self::adjust_stock(&mut tx, item.product_id, -units(item.quantity)).await?;
        }

        let now = Utc::now();
        let placed = Order::placed(&order, items, now);

        sqlx::query(
            r#"
            INSERT INTO orders (id, order_code, status, total_price_cents, status_changed_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(placed.id.as_uuid())
        .bind(&placed.order_code)
        .bind(placed.status.code())
        .bind(placed.total_price.cents())
        .bind(placed.status_changed_at)
        .bind(placed.created_at)
        .bind(placed.updated_at)
        .execute(&mut *tx)
        .await?;

        for (position, item) in placed.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items
                    (order_id, position, product_id, product_name, product_code, quantity, unit_price_cents)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(placed.id.as_uuid())
            .bind(position as i32)
            .bind(item.product_id.as_uuid())
            .bind(&item.product_name)
            .bind(&item.product_code)
            .bind(units(item.quantity))
            .bind(item.unit_price.cents())
            .execute(&mut *tx)
            .await?;
        }

        let entry = StatusHistoryEntry::record(
            placed.id,
            None,
            OrderStatus::Pending,
            &order.context,
            order.notes.clone(),
            now,
        );
        Self::insert_history(&mut tx, &entry).await?;

        tx.commit().await?;
        tracing::debug!(order_id = %placed.id, items = placed.items.len(), "Order row committed");
        Ok(placed)
    }

    async fn transition_order(&self, id: OrderId, change: StatusChange) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let status: i16 = sqlx::query("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DomainError::not_found("Order", id))?
            .try_get("status")?;
        let current = status_from_code(status)?;

        if let Some(effect) = plan_transition(current, change.new_status)? {
            let rows = sqlx::query(
                "SELECT product_id, quantity FROM order_items WHERE order_id = $1 ORDER BY product_id",
            )
            .bind(id.as_uuid())
            .fetch_all(&mut *tx)
            .await?;
            let mut lines = Vec::with_capacity(rows.len());
            for row in &rows {
                let product_id = ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?);
                let quantity: i32 = row.try_get("quantity")?;
                lines.push((product_id, quantity));
            }

            match effect {
                StockEffect::Reserve => {
                    for &(product_id, quantity) in &lines {
                        let available: i32 = sqlx::query(
                            "SELECT stock_quantity FROM products WHERE id = $1 FOR UPDATE",
                        )
                        .bind(product_id.as_uuid())
                        .fetch_one(&mut *tx)
                        .await?
                        .try_get("stock_quantity")?;
                        let requested = u32::try_from(quantity)
                            .map_err(|_| decode_error("order item quantity", quantity))?;
                        ensure_available(product_id, requested, available)?;
                        Self::adjust_stock(&mut tx, product_id, -quantity).await?;
                    }
                }
                StockEffect::Release => {
                    for &(product_id, quantity) in &lines {
                        Self::adjust_stock(&mut tx, product_id, quantity).await?;
                    }
                }
                StockEffect::Keep => {}
            }

            let now = Utc::now();
            sqlx::query(
                "UPDATE orders SET status = $2, status_changed_at = $3, updated_at = $3 WHERE id = $1",
            )
            .bind(id.as_uuid())
            .bind(change.new_status.code())
            .bind(now)
            .execute(&mut *tx)
            .await?;

            let entry = StatusHistoryEntry::record(
                id,
                Some(current),
                change.new_status,
                &change.context,
                change.notes,
                now,
            );
            Self::insert_history(&mut tx, &entry).await?;
        }

        tx.commit().await?;
        self.get_order(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Order", id))
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let mut items = self.items_for(&[id.as_uuid()]).await?;
                let items = items.remove(&id.as_uuid()).unwrap_or_default();
                Ok(Some(Self::row_to_order(&row, items)?))
            }
            None => Ok(None),
        }
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<Page<Order>> {
        let status = query.status.map(|s| s.code());

        let total: i64 = sqlx::query(
            "SELECT COUNT(*) AS total FROM orders WHERE ($1::SMALLINT IS NULL OR status = $1)",
        )
        .bind(status)
        .fetch_one(&self.pool)
        .await?
        .try_get("total")?;

        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE ($1::SMALLINT IS NULL OR status = $1) \
             ORDER BY created_at DESC, id ASC LIMIT $2 OFFSET $3"
        ))
        .bind(status)
        .bind(i64::from(query.page.limit()))
        .bind(i64::from(query.page.offset()))
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<Uuid> = rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<std::result::Result<_, _>>()?;
        let mut items = self.items_for(&ids).await?;

        let mut results = Vec::with_capacity(rows.len());
        for (row, id) in rows.iter().zip(&ids) {
            results.push(Self::row_to_order(row, items.remove(id).unwrap_or_default())?);
        }

        Ok(Page {
            count: u64::try_from(total).unwrap_or(0),
            limit: query.page.limit(),
            offset: query.page.offset(),
            results,
        })
    }

    async fn order_history(&self, id: OrderId) -> Result<Vec<StatusHistoryEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, old_status, new_status, changed_by, change_source, ip_address, notes, created_at
            FROM order_status_history
            WHERE order_id = $1
            ORDER BY seq DESC
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_history).collect()
    }
}
