//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use api::auth::TokenService;
use api::routes::AppState;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use store::InMemoryStore;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

const SIGNING_KEY: &str = "test-signing-key";

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            api::routes::metrics::install_recorder().expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup_with_state() -> (axum::Router, Arc<AppState<InMemoryStore>>) {
    let tokens = TokenService::new(SIGNING_KEY, 300);
    let state = api::create_default_state(InMemoryStore::new(), tokens);
    let app = api::create_app(state.clone(), get_metrics_handle());
    (app, state)
}

fn setup() -> axum::Router {
    setup_with_state().0
}

fn token(state: &AppState<InMemoryStore>) -> String {
    state.tokens.issue("admin").unwrap()
}

async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    send_with(app, method, uri, token, body, &[]).await
}

async fn send_with(
    app: &axum::Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
    headers: &[(&str, &str)],
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

/// Creates a category and a product with the given stock, returning the
/// product id.
async fn seed_product(app: &axum::Router, token: &str, code: &str, stock: i32) -> String {
    let (status, category) = send(
        app,
        "POST",
        "/api/categories",
        Some(token),
        Some(json!({ "name": format!("Category for {code}") })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, product) = send(
        app,
        "POST",
        "/api/products",
        None,
        Some(json!({
            "name": format!("Product {code}"),
            "code": code,
            "category": category["id"],
            "base_price_cents": 2500,
            "discount_percent": 20,
            "stock_quantity": stock,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{product}");
    product["id"].as_str().unwrap().to_string()
}

async fn stock_of(app: &axum::Router, product_id: &str) -> i64 {
    let (status, product) = send(app, "GET", &format!("/api/products/{product_id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    product["stock_quantity"].as_i64().unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = setup();
    let (status, json) = send(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_category_writes_require_token() {
    let (app, state) = setup_with_state();

    let (status, json) = send(
        &app,
        "POST",
        "/api/categories",
        None,
        Some(json!({ "name": "Shoes" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(json["error"].is_string());

    let (status, json) = send(
        &app,
        "POST",
        "/api/categories",
        Some(&token(&state)),
        Some(json!({ "name": "Shoes" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["name"], "Shoes");
    assert_eq!(json["active"], true);
    assert_eq!(json["sub_categories"], json!([]));
}

#[tokio::test]
async fn test_invalid_token_is_rejected_everywhere() {
    let app = setup();
    let forged = TokenService::new("some-other-key", 300).issue("admin").unwrap();

    let (status, _) = send(&app, "GET", "/api/products", Some(&forged), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_category_tree_nests_children() {
    let (app, state) = setup_with_state();
    let token = token(&state);

    let (_, root) = send(
        &app,
        "POST",
        "/api/categories",
        Some(&token),
        Some(json!({ "name": "Clothing" })),
    )
    .await;
    let (status, _) = send(
        &app,
        "POST",
        "/api/categories",
        Some(&token),
        Some(json!({ "name": "Jackets", "parent_category": root["id"] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, page) = send(&app, "GET", "/api/categories", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["count"], 1);
    assert_eq!(page["results"][0]["name"], "Clothing");
    assert_eq!(page["results"][0]["sub_categories"][0]["name"], "Jackets");

    let root_id = root["id"].as_str().unwrap();
    let (status, _) = send(
        &app,
        "PATCH",
        &format!("/api/categories/{root_id}"),
        Some(&token),
        Some(json!({ "parent_category": page["results"][0]["sub_categories"][0]["id"] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/api/categories/{root_id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, page) = send(&app, "GET", "/api/categories", None, None).await;
    assert_eq!(page["count"], 0);
}

#[tokio::test]
async fn test_product_response_carries_derived_prices() {
    let (app, state) = setup_with_state();
    let product_id = seed_product(&app, &token(&state), "DERIVED-1", 4).await;

    let (status, product) = send(&app, "GET", &format!("/api/products/{product_id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(product["base_price_cents"], 2500);
    assert_eq!(product["final_price_cents"], 2000);
    assert_eq!(product["discount_amount_cents"], 500);
    assert_eq!(product["in_stock"], true);
    assert!(product["category"]["name"].is_string());
}

#[tokio::test]
async fn test_product_validation_errors_list_fields() {
    let (app, state) = setup_with_state();
    seed_product(&app, &token(&state), "EXISTING", 1).await;

    let (_, categories) = send(&app, "GET", "/api/categories", None, None).await;
    let (status, json) = send(
        &app,
        "POST",
        "/api/products",
        None,
        Some(json!({
            "name": "",
            "code": "NEW-1",
            "category": categories["results"][0]["id"],
            "base_price_cents": 100,
            "discount_percent": 150,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["fields"]["name"].is_array());
    assert!(json["fields"]["discount_percent"].is_array());
}

#[tokio::test]
async fn test_order_then_cancel_restores_stock() {
    let (app, state) = setup_with_state();
    let product_id = seed_product(&app, &token(&state), "SCENARIO-1", 10).await;

    let (status, order) = send(
        &app,
        "POST",
        "/api/orders",
        None,
        Some(json!({ "items": [{ "product_id": product_id, "quantity": 3 }] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{order}");
    assert_eq!(order["status"], "pending");
    assert_eq!(order["status_display"], "Pending");
    assert_eq!(order["total_price_cents"], 6000);
    assert_eq!(order["items"][0]["line_total_cents"], 6000);
    assert!(order["order_code"].as_str().unwrap().starts_with("ORD-"));
    assert_eq!(order["status_history"].as_array().unwrap().len(), 1);
    assert_eq!(stock_of(&app, &product_id).await, 7);

    let order_id = order["id"].as_str().unwrap();
    let (status, cancelled) = send(
        &app,
        "POST",
        &format!("/api/orders/{order_id}/cancel"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");
    assert_eq!(stock_of(&app, &product_id).await, 10);

    let (status, history) = send(
        &app,
        "GET",
        &format!("/api/orders/{order_id}/history"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["old_status"], "pending");
    assert_eq!(history[0]["new_status"], "cancelled");
    assert_eq!(history[1]["old_status"], Value::Null);
    assert_eq!(history[1]["new_status"], "pending");
    assert_eq!(history[1]["change_source"], "api");
}

#[tokio::test]
async fn test_insufficient_stock_names_product() {
    let (app, state) = setup_with_state();
    let product_id = seed_product(&app, &token(&state), "SCARCE-1", 2).await;

    let (status, json) = send(
        &app,
        "POST",
        "/api/orders",
        None,
        Some(json!({ "items": [{ "product_id": product_id, "quantity": 5 }] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["product_id"], product_id.as_str());
    assert_eq!(stock_of(&app, &product_id).await, 2);
    assert_eq!(state.orders.store().order_count().await, 0);
}

#[tokio::test]
async fn test_status_update_records_caller() {
    let (app, state) = setup_with_state();
    let token = token(&state);
    let product_id = seed_product(&app, &token, "CALLER-1", 5).await;

    let (_, order) = send(
        &app,
        "POST",
        "/api/orders",
        None,
        Some(json!({ "items": [{ "product_id": product_id, "quantity": 1 }] })),
    )
    .await;
    let order_id = order["id"].as_str().unwrap();

    let (status, updated) = send_with(
        &app,
        "PATCH",
        &format!("/api/orders/{order_id}"),
        Some(&token),
        Some(json!({ "status": "confirmed", "notes": "paid" })),
        &[("x-forwarded-for", "203.0.113.7, 10.0.0.1")],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "confirmed");

    let latest = &updated["status_history"][0];
    assert_eq!(latest["new_status"], "confirmed");
    assert_eq!(latest["changed_by"], "admin");
    assert_eq!(latest["ip_address"], "203.0.113.7");
    assert_eq!(latest["notes"], "paid");
    assert_eq!(stock_of(&app, &product_id).await, 4);
}

#[tokio::test]
async fn test_invalid_transition_is_conflict() {
    let (app, state) = setup_with_state();
    let product_id = seed_product(&app, &token(&state), "CONFLICT-1", 5).await;

    let (_, order) = send(
        &app,
        "POST",
        "/api/orders",
        None,
        Some(json!({ "items": [{ "product_id": product_id, "quantity": 1 }] })),
    )
    .await;
    let order_id = order["id"].as_str().unwrap();

    let (status, _) = send(
        &app,
        "PATCH",
        &format!("/api/orders/{order_id}"),
        None,
        Some(json!({ "status": "delivered" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, json) = send(
        &app,
        "PATCH",
        &format!("/api/orders/{order_id}"),
        None,
        Some(json!({ "status": "lost" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["fields"]["status"].is_array());

    let (_, history) = send(
        &app,
        "GET",
        &format!("/api/orders/{order_id}/history"),
        None,
        None,
    )
    .await;
    assert_eq!(history.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_not_found_and_bad_ids() {
    let app = setup();
    let missing = uuid::Uuid::new_v4();

    let (status, _) = send(&app, "GET", &format!("/api/orders/{missing}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "GET", &format!("/api/products/{missing}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        "GET",
        &format!("/api/orders/{missing}/history"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "GET", "/api/orders/not-a-uuid", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        "/api/orders",
        None,
        Some(json!({ "items": [{ "product_id": missing, "quantity": 1 }] })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let app = setup();

    let request = Request::builder()
        .method("POST")
        .uri("/api/orders")
        .header("content-type", "application/json")
        .body(Body::from("{ not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_empty_order_is_rejected() {
    let app = setup();
    let (status, json) = send(&app, "POST", "/api/orders", None, Some(json!({ "items": [] }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["fields"]["items"].is_array());
}

#[tokio::test]
async fn test_order_list_is_paginated_and_filtered() {
    let (app, state) = setup_with_state();
    let product_id = seed_product(&app, &token(&state), "PAGED-1", 50).await;

    for _ in 0..3 {
        let (status, _) = send(
            &app,
            "POST",
            "/api/orders",
            None,
            Some(json!({ "items": [{ "product_id": product_id, "quantity": 1 }] })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, page) = send(&app, "GET", "/api/orders?limit=2", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["count"], 3);
    assert_eq!(page["limit"], 2);
    assert_eq!(page["offset"], 0);
    assert_eq!(page["results"].as_array().unwrap().len(), 2);

    let (_, page) = send(&app, "GET", "/api/orders?status=cancelled", None, None).await;
    assert_eq!(page["count"], 0);

    let (status, _) = send(&app, "GET", "/api/orders?status=bogus", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_product_filters() {
    let (app, state) = setup_with_state();
    let token = token(&state);
    seed_product(&app, &token, "FILTER-IN", 3).await;
    seed_product(&app, &token, "FILTER-OUT", 0).await;

    let (status, page) = send(&app, "GET", "/api/products?in_stock=true", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["count"], 1);
    assert_eq!(page["results"][0]["code"], "FILTER-IN");

    let (_, page) = send(&app, "GET", "/api/products?max_price=1999", None, None).await;
    assert_eq!(page["count"], 0);

    let (_, page) = send(&app, "GET", "/api/products?min_price=2000&max_price=2000", None, None).await;
    assert_eq!(page["count"], 2);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, state) = setup_with_state();
    let product_id = seed_product(&app, &token(&state), "METRICS-1", 5).await;
    send(
        &app,
        "POST",
        "/api/orders",
        None,
        Some(json!({ "items": [{ "product_id": product_id, "quantity": 1 }] })),
    )
    .await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("orders_placed_total"));
}

#[tokio::test]
async fn test_oversized_price_is_rejected() {
    let (app, state) = setup_with_state();
    seed_product(&app, &token(&state), "PRICED-1", 1).await;
    let (_, categories) = send(&app, "GET", "/api/categories", None, None).await;

    let (status, json) = send(
        &app,
        "POST",
        "/api/products",
        None,
        Some(json!({
            "name": "Gold bar",
            "code": "GOLD-1",
            "category": categories["results"][0]["id"],
            "base_price_cents": 200_000_000_000_000_000_i64,
            "discount_percent": 10,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["fields"]["base_price_cents"].is_array());

    let (status, products) = send(&app, "GET", "/api/products", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(products["count"], 1);
}

#[tokio::test]
async fn test_product_edits_keep_ordered_stock() {
    let (app, state) = setup_with_state();
    let product_id = seed_product(&app, &token(&state), "EDIT-1", 10).await;

    let (status, _) = send(
        &app,
        "POST",
        "/api/orders",
        None,
        Some(json!({ "items": [{ "product_id": product_id, "quantity": 3 }] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let uri = format!("/api/products/{product_id}");
    let (status, patched) = send(&app, "PATCH", &uri, None, Some(json!({ "name": "Renamed" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patched["name"], "Renamed");
    assert_eq!(patched["stock_quantity"], 7);

    let (status, replaced) = send(
        &app,
        "PUT",
        &uri,
        None,
        Some(json!({
            "name": "Replaced",
            "code": "EDIT-1",
            "category": patched["category"]["id"],
            "base_price_cents": 3000,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{replaced}");
    assert_eq!(replaced["stock_quantity"], 7);
    assert_eq!(stock_of(&app, &product_id).await, 7);
}

#[tokio::test]
async fn test_garbage_forwarded_for_is_not_recorded() {
    let (app, state) = setup_with_state();
    let product_id = seed_product(&app, &token(&state), "XFF-1", 5).await;
    let garbage = "a".repeat(60);

    let (status, order) = send_with(
        &app,
        "POST",
        "/api/orders",
        None,
        Some(json!({ "items": [{ "product_id": product_id, "quantity": 1 }] })),
        &[("x-forwarded-for", garbage.as_str())],
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{order}");
    assert_eq!(order["status_history"][0]["ip_address"], Value::Null);
}

#[tokio::test]
async fn test_refresh_rotates_tokens() {
    let (app, state) = setup_with_state();
    let pair = state.tokens.issue_pair("admin").unwrap();

    let (status, refreshed) = send(
        &app,
        "POST",
        "/api/auth/token/refresh",
        None,
        Some(json!({ "refresh": pair.refresh.as_str() })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let access = refreshed["access"].as_str().unwrap();
    assert!(refreshed["refresh"].is_string());

    let (status, _) = send(
        &app,
        "POST",
        "/api/categories",
        Some(access),
        Some(json!({ "name": "Refreshed" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // A consumed refresh token is revoked.
    let (status, _) = send(
        &app,
        "POST",
        "/api/auth/token/refresh",
        None,
        Some(json!({ "refresh": pair.refresh.as_str() })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Refresh tokens do not authenticate requests, access tokens do not refresh.
    let (status, _) = send(&app, "GET", "/api/orders", Some(&pair.refresh), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(
        &app,
        "POST",
        "/api/auth/token/refresh",
        None,
        Some(json!({ "refresh": pair.access.as_str() })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_verify_token() {
    let (app, state) = setup_with_state();
    let pair = state.tokens.issue_pair("admin").unwrap();

    for token in [&pair.access, &pair.refresh] {
        let (status, json) = send(
            &app,
            "POST",
            "/api/auth/token/verify",
            None,
            Some(json!({ "token": token })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, json!({}));
    }

    let forged = TokenService::new("some-other-key", 300).issue("admin").unwrap();
    let (status, json) = send(
        &app,
        "POST",
        "/api/auth/token/verify",
        None,
        Some(json!({ "token": forged })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(json["error"].is_string());

    let (status, _) = send(&app, "POST", "/api/auth/token/verify", None, Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
