//! Axum router construction and route mapping.
//!
//! The [`app`] function wires every endpoint to its handler and returns a
//! ready-to-serve [`axum::Router`].  Collection and resource paths are
//! served both with and without a trailing slash.

use axum::{
    extract::{DefaultBodyLimit, MatchedPath},
    http::{HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;
use utoipa::OpenApi;

use crate::errors::generate_request_id;
use crate::handlers::{datasets, functions, pages};
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::AppState;

// -- OpenAPI specification ----------------------------------------------------

/// OpenAPI documentation for the nanogate API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "nanogate API",
        version = "0.1.0",
        description = "Gateway for datasets, pages and functions"
    ),
    paths(
        health_check,
        datasets::create_dataset,
        datasets::create_empty_dataset,
        datasets::update_dataset,
        datasets::list_datasets,
        datasets::get_dataset,
        datasets::get_dataset_page,
        datasets::delete_dataset,
        functions::create_function,
        functions::list_functions,
        functions::invoke_function,
        functions::invoke_function_with_body,
        functions::delete_function,
        functions::get_function_code,
        pages::create_page,
        pages::list_pages,
        pages::get_page,
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Datasets", description = "CSV datasets"),
        (name = "Functions", description = "Deployed functions"),
        (name = "Pages", description = "YAML pages"),
    )
)]
pub struct ApiDoc;

/// Build the axum [`Router`] with all routes.
///
/// The returned router is ready to be passed to `axum::serve`.
pub fn app(state: Arc<AppState>) -> Router {
    let server = &state.config.server;
    let cors = cors_layer(&server.cors_origins);
    let body_limit = DefaultBodyLimit::max(server.max_upload_size);

    let mut router = Router::new()
        .route("/health", get(health_check))
        .route("/openapi.json", get(openapi_json))
        // Datasets
        .route(
            "/datasets",
            get(datasets::list_datasets)
                .post(datasets::create_dataset)
                .put(datasets::update_dataset),
        )
        .route(
            "/datasets/",
            get(datasets::list_datasets)
                .post(datasets::create_dataset)
                .put(datasets::update_dataset),
        )
        .route("/datasets/empty/:name", post(datasets::create_empty_dataset))
        .route("/datasets/empty/:name/", post(datasets::create_empty_dataset))
        .route(
            "/datasets/:id",
            get(datasets::get_dataset).delete(datasets::delete_dataset),
        )
        .route(
            "/datasets/:id/",
            get(datasets::get_dataset).delete(datasets::delete_dataset),
        )
        .route("/datasets/:id/page/:page", get(datasets::get_dataset_page))
        .route("/datasets/:id/page/:page/", get(datasets::get_dataset_page))
        // Functions
        .route(
            "/functions",
            get(functions::list_functions).post(functions::create_function),
        )
        .route(
            "/functions/",
            get(functions::list_functions).post(functions::create_function),
        )
        .route(
            "/functions/:id",
            get(functions::invoke_function)
                .post(functions::invoke_function_with_body)
                .delete(functions::delete_function),
        )
        .route(
            "/functions/:id/",
            get(functions::invoke_function)
                .post(functions::invoke_function_with_body)
                .delete(functions::delete_function),
        )
        .route("/functions/:id/code", get(functions::get_function_code))
        .route("/functions/:id/code/", get(functions::get_function_code))
        // Pages
        .route("/pages", get(pages::list_pages).post(pages::create_page))
        .route("/pages/", get(pages::list_pages).post(pages::create_page))
        .route("/pages/:id", get(pages::get_page))
        .route("/pages/:id/", get(pages::get_page));

    if state.config.observability.metrics {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        // Application state shared across all handlers.
        .with_state(state)
        // Layer ordering: inner layers run first, outer layers wrap them.
        .layer(middleware::from_fn(common_headers_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &Request<axum::body::Body>| {
                let method = req.method();
                let uri = req.uri();
                let matched_path = req
                    .extensions()
                    .get::<MatchedPath>()
                    .map(|matched_path| matched_path.as_str());
                tracing::debug_span!("request", %method, %uri, matched_path)
            }),
        )
        // metrics_middleware is outer (captures full request lifecycle).
        .layer(middleware::from_fn(metrics_middleware))
        .layer(cors)
        .layer(body_limit)
}

/// CORS for the configured origins.  Credentials are allowed, so methods
/// and headers mirror the request instead of using `*`.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

// -- Common headers middleware -----------------------------------------------

/// Middleware that adds common response headers to every response:
/// - `x-request-id`: 16-character uppercase hex string
/// - `Date`: RFC 7231 formatted timestamp
/// - `Server`: `nanogate`
async fn common_headers_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    if !headers.contains_key("x-request-id") {
        if let Ok(value) = HeaderValue::from_str(&generate_request_id()) {
            headers.insert("x-request-id", value);
        }
    }

    let date = httpdate::fmt_http_date(std::time::SystemTime::now());
    if let Ok(value) = HeaderValue::from_str(&date) {
        headers.insert("date", value);
    }
    headers.insert("server", HeaderValue::from_static("nanogate"));

    response
}

// -- Infrastructure endpoints ------------------------------------------------

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    operation_id = "HealthCheck",
    responses(
        (status = 200, description = "Health check OK")
    )
)]
pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        r#"{"status":"ok"}"#,
    )
}

/// `GET /openapi.json` -- the generated OpenAPI document.
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
