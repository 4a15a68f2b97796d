//! Prometheus recorder setup and the metrics endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

const PLACEMENT_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0];

/// Installs the global Prometheus recorder and registers metric help text.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("order_placement_duration_seconds".to_string()),
            PLACEMENT_BUCKETS,
        )?
        .install_recorder()?;

    metrics::describe_counter!("orders_placed_total", "Orders committed with their stock");
    metrics::describe_counter!(
        "orders_rejected_total",
        "Order placements refused, labelled by reason"
    );
    metrics::describe_counter!(
        "order_status_changes_total",
        "Order status transitions, labelled by the new status"
    );
    metrics::describe_histogram!(
        "order_placement_duration_seconds",
        metrics::Unit::Seconds,
        "Time to validate and persist a new order"
    );

    Ok(handle)
}

/// GET /metrics: returns Prometheus-formatted metrics.
pub async fn get(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        handle.render(),
    )
}
