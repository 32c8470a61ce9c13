//! The ops surface: `/health` for liveness checks and `/metrics` for the
//! Prometheus scrape endpoint.

use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

#[derive(Clone)]
struct OpsState {
    prometheus: Arc<PrometheusHandle>,
}

pub fn router(prometheus: PrometheusHandle) -> Router {
    let state = OpsState { prometheus: Arc::new(prometheus) };
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn metrics(axum::extract::State(state): axum::extract::State<OpsState>) -> String {
    state.prometheus.render()
}
