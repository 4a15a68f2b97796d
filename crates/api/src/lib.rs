//! HTTP API server for the storefront.
//!
//! Provides REST endpoints for categories, products and orders, with
//! bearer-token authentication, structured logging (tracing) and
//! Prometheus metrics.

pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use domain::{CatalogService, OrderService, Store};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use auth::TokenService;
use routes::AppState;
use routes::{categories, orders, products};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let tokens = state.tokens.clone();

    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/api/auth/token/refresh", post(routes::auth::refresh::<S>))
        .route("/api/auth/token/verify", post(routes::auth::verify::<S>))
        .route(
            "/api/categories",
            get(categories::list::<S>).post(categories::create::<S>),
        )
        .route(
            "/api/categories/{id}",
            get(categories::get::<S>)
                .put(categories::replace::<S>)
                .patch(categories::patch::<S>)
                .delete(categories::delete::<S>),
        )
        .route(
            "/api/products",
            get(products::list::<S>).post(products::create::<S>),
        )
        .route(
            "/api/products/{id}",
            get(products::get::<S>)
                .put(products::replace::<S>)
                .patch(products::patch::<S>)
                .delete(products::delete::<S>),
        )
        .route(
            "/api/orders",
            get(orders::list::<S>).post(orders::create::<S>),
        )
        .route(
            "/api/orders/{id}",
            get(orders::get::<S>).patch(orders::update_status::<S>),
        )
        .route("/api/orders/{id}/cancel", post(orders::cancel::<S>))
        .route("/api/orders/{id}/history", get(orders::history::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(middleware::from_fn_with_state(tokens, auth::authenticate))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the catalog and order services over one shared store.
pub fn create_default_state<S: Store + 'static>(store: S, tokens: TokenService) -> Arc<AppState<S>> {
    let store = Arc::new(store);
    Arc::new(AppState {
        catalog: CatalogService::new(store.clone()),
        orders: OrderService::new(store),
        tokens,
    })
}
