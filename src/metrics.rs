//! Prometheus metrics for nanogate.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`,
//! defines metric name constants, provides the HTTP RED middleware, counts
//! upstream calls, and exposes the `/metrics` endpoint handler.

use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;
use tracing::warn;

use crate::errors::UpstreamError;

// -- Metric name constants ----------------------------------------------------

/// Total HTTP requests (counter). Labels: method, path, status.
pub const HTTP_REQUESTS_TOTAL: &str = "nanogate_http_requests_total";

/// HTTP request duration in seconds (histogram). Labels: method, path.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "nanogate_http_request_duration_seconds";

/// Total calls to upstream services (counter). Labels: service, operation, outcome.
pub const UPSTREAM_CALLS_TOTAL: &str = "nanogate_upstream_calls_total";

// -- Global recorder installation ---------------------------------------------

/// Singleton handle to the Prometheus recorder.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus metrics recorder. Idempotent -- safe to call
/// multiple times (e.g. in tests). Returns a reference to the global handle.
pub fn init_metrics() -> &'static PrometheusHandle {
    PROMETHEUS_HANDLE.get_or_init(|| {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        if let Err(e) = metrics::set_global_recorder(recorder) {
            warn!("Prometheus recorder not installed: {}", e);
        }
        handle
    })
}

/// Register metric descriptions with the global recorder. Call once after
/// `init_metrics()`.
pub fn describe_metrics() {
    describe_counter!(HTTP_REQUESTS_TOTAL, "Total HTTP requests");
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(
        UPSTREAM_CALLS_TOTAL,
        "Total calls to upstream storage and compute services"
    );
}

/// Count one upstream call by outcome.
pub fn record_upstream_call<T>(
    service: &'static str,
    operation: &'static str,
    result: &Result<T, UpstreamError>,
) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.outcome(),
    };
    counter!(
        UPSTREAM_CALLS_TOTAL,
        "service" => service,
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);
}

// -- Metrics middleware -------------------------------------------------------

/// Axum middleware that records HTTP RED metrics for every request.
///
/// Excludes `/metrics` from self-instrumentation.
pub async fn metrics_middleware(
    req: Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    if req.uri().path() == "/metrics" {
        return next.run(req).await;
    }

    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    let start = Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

// -- Path normalization -------------------------------------------------------

/// Normalize an actual request path to a route template for metric labels.
///
/// Dataset, page and function names are replaced by placeholders and the
/// trailing slash is dropped:
/// - `/datasets/` -> `/datasets`
/// - `/datasets/sales.csv` -> `/datasets/{id}`
/// - `/datasets/sales.csv/page/10` -> `/datasets/{id}/page/{page}`
/// - `/functions/adder/code/` -> `/functions/{id}/code`
fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    let segments: Vec<&str> = trimmed.split('/').collect();
    match segments.as_slice() {
        [""] => "/".to_string(),
        [collection @ ("datasets" | "pages" | "functions")] => format!("/{collection}"),
        [collection @ ("datasets" | "pages" | "functions"), _] => format!("/{collection}/{{id}}"),
        ["datasets", _, "page", _] => "/datasets/{id}/page/{page}".to_string(),
        ["functions", _, "code"] => "/functions/{id}/code".to_string(),
        ["health" | "metrics" | "openapi.json"] => format!("/{trimmed}"),
        _ => "/{other}".to_string(),
    }
}

// -- Metrics endpoint handler -------------------------------------------------

/// `GET /metrics` -- Render Prometheus exposition format text.
pub async fn metrics_handler() -> Response {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => {
            handle.run_upkeep();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4")],
                handle.render(),
            )
                .into_response()
        }
        None => (StatusCode::NOT_FOUND, "metrics are disabled").into_response(),
    }
}

// -- Tests --------------------------------------------------------------------
