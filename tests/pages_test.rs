//! Integration tests for the page endpoints and infrastructure routes.

mod common;

use axum::http::StatusCode;
use common::create_test_app;

const HOME: &str = "title: Home\nwidgets:\n  - chart\n";

#[tokio::test]
async fn test_page_lifecycle() {
    let app = create_test_app();

    let resp = app.get("/pages/").await;
    assert_eq!(resp.json()["message"], "No pages available.");

    let resp = app.upload("POST", "/pages/", "home.yaml", HOME).await;
    assert_eq!(resp.status, StatusCode::CREATED);
    assert_eq!(resp.json()["message"], "Page <home.yaml> uploaded.");

    let resp = app.upload("POST", "/pages", "home.yaml", "title: Other\n").await;
    assert_eq!(resp.status, StatusCode::CONFLICT);

    let resp = app.get("/pages/home.yaml").await;
    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    assert_eq!(body["DatasetResponse"], HOME);
    assert_eq!(body["SystemResponse"]["Key"], "home.yaml");

    let resp = app.get("/pages/home.yaml/?raw_file=true").await;
    assert!(resp.headers["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/yaml"));
    assert_eq!(resp.text(), HOME);

    let resp = app.get("/pages/").await;
    let body = resp.json();
    assert_eq!(body[0]["id"], "home.yaml");
    assert_eq!(body[0]["size"], HOME.len());
}

#[tokio::test]
async fn test_missing_page() {
    let app = create_test_app();
    let resp = app.get("/pages/nope.yaml").await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    assert_eq!(resp.json()["message"], "Page <nope.yaml> not found.");
}

#[tokio::test]
async fn test_pages_and_datasets_are_separate() {
    let app = create_test_app();
    app.upload("POST", "/pages/", "shared.txt", "page").await;
    let resp = app.upload("POST", "/datasets/", "shared.txt", "dataset").await;
    assert_eq!(resp.status, StatusCode::CREATED);
    assert_eq!(app.get("/pages/shared.txt?raw_file=true").await.text(), "page");
}

#[tokio::test]
async fn test_health_and_common_headers() {
    let app = create_test_app();
    let resp = app.get("/health").await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["status"], "ok");

    let request_id = resp.headers["x-request-id"].to_str().unwrap();
    assert_eq!(request_id.len(), 16);
    assert!(request_id
        .chars()
        .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
    assert_eq!(resp.headers["server"], "nanogate");
    assert!(resp.headers.contains_key("date"));
}

#[tokio::test]
async fn test_openapi_document() {
    let app = create_test_app();
    let resp = app.get("/openapi.json").await;
    assert_eq!(resp.status, StatusCode::OK);
    let doc = resp.json();
    assert!(doc["paths"]["/datasets/{id}/page/{page}"].is_object());
    assert!(doc["paths"]["/functions/{id}/code/"].is_object());
    assert!(doc["paths"]["/pages/"].is_object());
}

#[tokio::test]
async fn test_cors_preflight_for_configured_origin() {
    let app = create_test_app();
    let req = axum::http::Request::builder()
        .method("OPTIONS")
        .uri("/datasets/")
        .header("origin", "http://localhost")
        .header("access-control-request-method", "POST")
        .body(axum::body::Body::empty())
        .unwrap();
    let resp = app.send(req).await;
    assert_eq!(
        resp.headers["access-control-allow-origin"],
        "http://localhost"
    );
    assert_eq!(resp.headers["access-control-allow-credentials"], "true");
}
