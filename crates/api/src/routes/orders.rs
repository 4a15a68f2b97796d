//! Order placement, status changes and history endpoints.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{HistoryId, OrderId, Page, PageRequest, ProductId};
use domain::{
    ChangeSource, Order, OrderDetails, OrderItem, OrderLine, OrderQuery, OrderStatus,
    StatusHistoryEntry, Store, ValidationErrors,
};
use serde::{Deserialize, Serialize};

use super::{AppState, parse_id};
use crate::context::RequestContext;
use crate::error::ApiError;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<OrderLineRequest>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OrderLineRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct OrderListParams {
    pub status: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: String,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    pub notes: Option<String>,
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: OrderId,
    pub order_code: String,
    pub status: OrderStatus,
    pub status_display: &'static str,
    pub items: Vec<OrderItemResponse>,
    pub total_price_cents: i64,
    pub status_changed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_history: Option<Vec<HistoryResponse>>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            order_code: order.order_code,
            status: order.status,
            status_display: order.status.display_name(),
            items: order.items.into_iter().map(OrderItemResponse::from).collect(),
            total_price_cents: order.total_price.cents(),
            status_changed_at: order.status_changed_at,
            created_at: order.created_at,
            updated_at: order.updated_at,
            status_history: None,
        }
    }
}

impl From<OrderDetails> for OrderResponse {
    fn from(details: OrderDetails) -> Self {
        let mut response = Self::from(details.order);
        response.status_history = Some(
            details
                .history
                .into_iter()
                .map(HistoryResponse::from)
                .collect(),
        );
        response
    }
}

#[derive(Debug, Serialize)]
pub struct OrderItemResponse {
    pub product_id: ProductId,
    pub product_name: String,
    pub product_code: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
}

impl From<OrderItem> for OrderItemResponse {
    fn from(item: OrderItem) -> Self {
        Self {
            line_total_cents: item.line_total().cents(),
            product_id: item.product_id,
            product_name: item.product_name,
            product_code: item.product_code,
            quantity: item.quantity,
            unit_price_cents: item.unit_price.cents(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub id: HistoryId,
    pub old_status: Option<OrderStatus>,
    pub old_status_display: Option<&'static str>,
    pub new_status: OrderStatus,
    pub new_status_display: &'static str,
    pub changed_by: Option<String>,
    pub change_source: ChangeSource,
    pub ip_address: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<StatusHistoryEntry> for HistoryResponse {
    fn from(entry: StatusHistoryEntry) -> Self {
        Self {
            id: entry.id,
            old_status: entry.old_status,
            old_status_display: entry.old_status.map(|s| s.display_name()),
            new_status: entry.new_status,
            new_status_display: entry.new_status.display_name(),
            changed_by: entry.changed_by,
            change_source: entry.change_source,
            ip_address: entry.ip_address,
            notes: entry.notes,
            created_at: entry.created_at,
        }
    }
}

// -- Handlers --

/// POST /api/orders: place an order, reserving stock for every line.
#[tracing::instrument(skip(state, ctx, body))]
pub async fn create<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequestContext(ctx): RequestContext,
    body: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let Json(req) = body?;
    let lines = req
        .items
        .iter()
        .map(|line| OrderLine::new(line.product_id, line.quantity))
        .collect();

    let order = state.orders.place_order(lines, ctx, req.notes).await?;
    let details = state.orders.get_order(order.id).await?;
    Ok((StatusCode::CREATED, Json(details.into())))
}

/// GET /api/orders: newest first, optionally filtered by status.
#[tracing::instrument(skip(state))]
pub async fn list<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    params: Result<Query<OrderListParams>, QueryRejection>,
) -> Result<Json<Page<OrderResponse>>, ApiError> {
    let Query(params) = params?;
    let status = params.status.as_deref().map(parse_status).transpose()?;
    let query = OrderQuery {
        status,
        page: PageRequest {
            limit: params.limit,
            offset: params.offset,
        },
    };
    let page = state.orders.list_orders(query).await?;
    Ok(Json(page.map(OrderResponse::from)))
}

/// GET /api/orders/{id}: the order with its status history.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let details = state.orders.get_order(parse_id(&id)?).await?;
    Ok(Json(details.into()))
}

/// PATCH /api/orders/{id}: move the order to a new status.
#[tracing::instrument(skip(state, ctx, body))]
pub async fn update_status<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequestContext(ctx): RequestContext,
    Path(id): Path<String>,
    body: Result<Json<StatusUpdateRequest>, JsonRejection>,
) -> Result<Json<OrderResponse>, ApiError> {
    let id: OrderId = parse_id(&id)?;
    let Json(req) = body?;
    let status = parse_status(&req.status)?;

    state
        .orders
        .change_status(id, status, ctx, req.notes)
        .await?;
    Ok(Json(state.orders.get_order(id).await?.into()))
}

/// POST /api/orders/{id}/cancel: cancel and return the stock.
///
/// The body is optional; when present it may carry `notes`.
#[tracing::instrument(skip(state, ctx, body))]
pub async fn cancel<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequestContext(ctx): RequestContext,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<OrderResponse>, ApiError> {
    let id: OrderId = parse_id(&id)?;
    let req = if body.iter().all(u8::is_ascii_whitespace) {
        CancelRequest::default()
    } else {
        serde_json::from_slice::<CancelRequest>(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {e}")))?
    };

    state.orders.cancel_order(id, ctx, req.notes).await?;
    Ok(Json(state.orders.get_order(id).await?.into()))
}

/// GET /api/orders/{id}/history: status changes, newest first.
#[tracing::instrument(skip(state))]
pub async fn history<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<HistoryResponse>>, ApiError> {
    let entries = state.orders.history(parse_id(&id)?).await?;
    Ok(Json(entries.into_iter().map(HistoryResponse::from).collect()))
}

fn parse_status(raw: &str) -> Result<OrderStatus, ApiError> {
    OrderStatus::parse(raw).ok_or_else(|| {
        ValidationErrors::single("status", format!("\"{raw}\" is not a valid choice.")).into()
    })
}
