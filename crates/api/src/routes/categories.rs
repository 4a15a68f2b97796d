//! Category tree endpoints. Writes require a bearer token.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{CategoryId, Page, PageRequest};
use domain::{Category, CategoryDraft, CategoryNode, CategoryPatch, Store};
use serde::{Deserialize, Serialize};

use super::{AppState, nullable, parse_id};
use crate::context::Authenticated;
use crate::error::ApiError;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct CategoryListParams {
    pub active: Option<bool>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CategoryRequest {
    pub name: String,
    pub description: Option<String>,
    pub parent_category: Option<CategoryId>,
    pub image_url: Option<String>,
    pub active: Option<bool>,
}

impl From<CategoryRequest> for CategoryDraft {
    fn from(req: CategoryRequest) -> Self {
        Self {
            name: req.name,
            description: req.description,
            parent_id: req.parent_category,
            image_url: req.image_url,
            active: req.active.unwrap_or(true),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CategoryPatchRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub parent_category: Option<Option<CategoryId>>,
    #[serde(default, deserialize_with = "nullable")]
    pub image_url: Option<Option<String>>,
    pub active: Option<bool>,
}

impl From<CategoryPatchRequest> for CategoryPatch {
    fn from(req: CategoryPatchRequest) -> Self {
        Self {
            name: req.name,
            description: req.description,
            parent_id: req.parent_category,
            image_url: req.image_url,
            active: req.active,
        }
    }
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct CategoryResponse {
    pub id: CategoryId,
    pub name: String,
    pub description: Option<String>,
    pub parent_category: Option<CategoryId>,
    pub image_url: Option<String>,
    pub active: bool,
    pub sub_categories: Vec<CategoryResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CategoryResponse {
    fn leaf(category: Category) -> Self {
        Self {
            id: category.id,
            name: category.name,
            description: category.description,
            parent_category: category.parent_id,
            image_url: category.image_url,
            active: category.active,
            sub_categories: Vec::new(),
            created_at: category.created_at,
            updated_at: category.updated_at,
        }
    }
}

impl From<CategoryNode> for CategoryResponse {
    fn from(node: CategoryNode) -> Self {
        let mut response = Self::leaf(node.category);
        response.sub_categories = node.sub_categories.into_iter().map(Self::from).collect();
        response
    }
}

// -- Handlers --

/// GET /api/categories: root categories with nested active subcategories.
#[tracing::instrument(skip(state))]
pub async fn list<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    params: Result<Query<CategoryListParams>, QueryRejection>,
) -> Result<Json<Page<CategoryResponse>>, ApiError> {
    let Query(params) = params?;
    let page = PageRequest {
        limit: params.limit,
        offset: params.offset,
    };
    let roots = state.catalog.list_categories(params.active, page).await?;
    Ok(Json(roots.map(CategoryResponse::from)))
}

/// GET /api/categories/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<CategoryResponse>, ApiError> {
    let node = state.catalog.get_category(parse_id(&id)?).await?;
    Ok(Json(node.into()))
}

/// POST /api/categories
#[tracing::instrument(skip(state, user, body))]
pub async fn create<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: Authenticated,
    body: Result<Json<CategoryRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CategoryResponse>), ApiError> {
    let Json(req) = body?;
    let category = state.catalog.create_category(req.into()).await?;
    tracing::info!(user = %user.0.sub, category_id = %category.id, "category created via api");
    Ok((StatusCode::CREATED, Json(CategoryResponse::leaf(category))))
}

/// PUT /api/categories/{id}
#[tracing::instrument(skip(state, _user, body))]
pub async fn replace<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _user: Authenticated,
    Path(id): Path<String>,
    body: Result<Json<CategoryRequest>, JsonRejection>,
) -> Result<Json<CategoryResponse>, ApiError> {
    let id = parse_id(&id)?;
    let Json(req) = body?;
    state.catalog.update_category(id, req.into()).await?;
    Ok(Json(state.catalog.get_category(id).await?.into()))
}

/// PATCH /api/categories/{id}
#[tracing::instrument(skip(state, _user, body))]
pub async fn patch<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _user: Authenticated,
    Path(id): Path<String>,
    body: Result<Json<CategoryPatchRequest>, JsonRejection>,
) -> Result<Json<CategoryResponse>, ApiError> {
    let id = parse_id(&id)?;
    let Json(req) = body?;
    state.catalog.patch_category(id, req.into()).await?;
    Ok(Json(state.catalog.get_category(id).await?.into()))
}

/// DELETE /api/categories/{id}: soft-deletes the category and its subtree.
#[tracing::instrument(skip(state, _user))]
pub async fn delete<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _user: Authenticated,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.catalog.delete_category(parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}
