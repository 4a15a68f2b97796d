//! Product endpoints: catalog listing with price and stock filters, and
//! product CRUD.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{CategoryId, Page, PageRequest, ProductId};
use domain::{CategorySummary, ProductDetails, ProductDraft, ProductPatch, ProductQuery, Store};
use serde::{Deserialize, Serialize};

use super::{AppState, parse_id};
use crate::error::ApiError;

// -- Request types --

#[derive(Debug, Default, Deserialize)]
pub struct ProductListParams {
    pub category: Option<CategoryId>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub in_stock: Option<bool>,
    pub active: Option<bool>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl From<ProductListParams> for ProductQuery {
    fn from(params: ProductListParams) -> Self {
        ProductQuery {
            category_id: params.category,
            min_price: params.min_price,
            max_price: params.max_price,
            in_stock: params.in_stock,
            active: params.active,
            page: PageRequest {
                limit: params.limit,
                offset: params.offset,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProductRequest {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub description: String,
    pub category: CategoryId,
    pub base_price_cents: i64,
    pub discount_percent: Option<i32>,
    pub stock_quantity: Option<i32>,
    pub active: Option<bool>,
}

impl From<ProductRequest> for ProductDraft {
    fn from(req: ProductRequest) -> Self {
        ProductDraft {
            name: req.name,
            code: req.code,
            description: req.description,
            category_id: req.category,
            base_price_cents: req.base_price_cents,
            discount_percent: req.discount_percent.unwrap_or(0),
            stock_quantity: req.stock_quantity,
            active: req.active.unwrap_or(true),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductPatchRequest {
    pub name: Option<String>,
    pub code: Option<String>,
    pub description: Option<String>,
    pub category: Option<CategoryId>,
    pub base_price_cents: Option<i64>,
    pub discount_percent: Option<i32>,
    pub stock_quantity: Option<i32>,
    pub active: Option<bool>,
}

impl From<ProductPatchRequest> for ProductPatch {
    fn from(req: ProductPatchRequest) -> Self {
        ProductPatch {
            name: req.name,
            code: req.code,
            description: req.description,
            category_id: req.category,
            base_price_cents: req.base_price_cents,
            discount_percent: req.discount_percent,
            stock_quantity: req.stock_quantity,
            active: req.active,
        }
    }
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct CategoryRef {
    pub id: CategoryId,
    pub name: String,
    pub parent_category: Option<CategoryId>,
}

impl From<CategorySummary> for CategoryRef {
    fn from(summary: CategorySummary) -> Self {
        Self {
            id: summary.id,
            name: summary.name,
            parent_category: summary.parent_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub id: ProductId,
    pub name: String,
    pub code: String,
    pub description: String,
    pub category: Option<CategoryRef>,
    pub base_price_cents: i64,
    pub discount_percent: u8,
    pub final_price_cents: i64,
    pub discount_amount_cents: i64,
    pub stock_quantity: i32,
    pub in_stock: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ProductDetails> for ProductResponse {
    fn from(details: ProductDetails) -> Self {
        let p = details.product;
        Self {
            id: p.id,
            final_price_cents: p.final_price().cents(),
            discount_amount_cents: p.discount_amount().cents(),
            in_stock: p.in_stock(),
            name: p.name,
            code: p.code,
            description: p.description,
            category: details.category.map(CategoryRef::from),
            base_price_cents: p.base_price.cents(),
            discount_percent: p.discount_percent,
            stock_quantity: p.stock_quantity,
            active: p.active,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

// -- Handlers --

/// GET /api/products
#[tracing::instrument(skip(state))]
pub async fn list<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    params: Result<Query<ProductListParams>, QueryRejection>,
) -> Result<Json<Page<ProductResponse>>, ApiError> {
    let Query(params) = params?;
    let page = state.catalog.list_products(params.into()).await?;
    Ok(Json(page.map(ProductResponse::from)))
}

/// GET /api/products/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ProductResponse>, ApiError> {
    let details = state.catalog.get_product(parse_id(&id)?).await?;
    Ok(Json(details.into()))
}

/// POST /api/products
#[tracing::instrument(skip(state, body))]
pub async fn create<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    body: Result<Json<ProductRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    let Json(req) = body?;
    let details = state.catalog.create_product(req.into()).await?;
    Ok((StatusCode::CREATED, Json(details.into())))
}

/// PUT /api/products/{id}
#[tracing::instrument(skip(state, body))]
pub async fn replace<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    body: Result<Json<ProductRequest>, JsonRejection>,
) -> Result<Json<ProductResponse>, ApiError> {
    let id = parse_id(&id)?;
    let Json(req) = body?;
    Ok(Json(state.catalog.update_product(id, req.into()).await?.into()))
}

/// PATCH /api/products/{id}
#[tracing::instrument(skip(state, body))]
pub async fn patch<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    body: Result<Json<ProductPatchRequest>, JsonRejection>,
) -> Result<Json<ProductResponse>, ApiError> {
    let id = parse_id(&id)?;
    let Json(req) = body?;
    Ok(Json(state.catalog.patch_product(id, req.into()).await?.into()))
}

/// DELETE /api/products/{id}
#[tracing::instrument(skip(state))]
pub async fn delete<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.catalog.delete_product(parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}
