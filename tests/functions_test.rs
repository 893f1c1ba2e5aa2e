//! Integration tests for the function endpoints.

mod common;

use axum::{body::Body, http::Request, http::StatusCode};
use common::create_test_app;

const ADDER: &str = "def nano_function(event, context):\n    return event['a'] + event['b']\n";

#[tokio::test]
async fn test_list_empty_returns_message() {
    let app = create_test_app();
    let resp = app.get("/functions/").await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["message"], "No functions available.");
}

#[tokio::test]
async fn test_create_then_conflict() {
    let app = create_test_app();

    let resp = app.upload("POST", "/functions/", "adder.py", ADDER).await;
    assert_eq!(resp.status, StatusCode::CREATED);
    let body = resp.json();
    assert_eq!(body["SystemResponse"]["name"], "adder");
    assert_eq!(body["SystemResponse"]["handler"], "adder.nano_function");
    assert_eq!(body["SystemResponse"]["runtime"], "python3.9");
    assert_eq!(body["SystemResponse"]["memory_mb"], 512);
    assert_eq!(body["SystemResponse"]["timeout_secs"], 60);

    let resp = app.upload("POST", "/functions/", "adder.py", ADDER).await;
    assert_eq!(resp.status, StatusCode::CONFLICT);
    assert_eq!(resp.json()["message"], "Function <adder> already exists.");
}

#[tokio::test]
async fn test_create_invalid_name() {
    let app = create_test_app();
    let resp = app.upload("POST", "/functions/", "my adder.py", ADDER).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.json()["code"], "InvalidName");
}

#[tokio::test]
async fn test_list_names_and_detailed() {
    let app = create_test_app();
    app.upload("POST", "/functions/", "adder.py", ADDER).await;
    app.upload("POST", "/functions/", "echo.py", "def nano_function(e, c):\n    return e\n")
        .await;

    let resp = app.get("/functions").await;
    assert_eq!(resp.json(), serde_json::json!(["adder", "echo"]));

    let resp = app.get("/functions/?detailed=true").await;
    let body = resp.json();
    let functions = body.as_array().unwrap();
    assert_eq!(functions.len(), 2);
    assert_eq!(functions[1]["handler"], "echo.nano_function");
    assert!(functions[0]["code_size"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn test_invoke_default_payload() {
    let app = create_test_app();
    app.upload("POST", "/functions/", "adder.py", ADDER).await;

    let resp = app.get("/functions/adder").await;
    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    assert_eq!(body["SystemResponse"]["status_code"], 200);
    assert_eq!(body["FunctionResponse"]["function"], "adder");
    assert_eq!(body["FunctionResponse"]["event"], serde_json::json!({"a": 1, "b": 2}));
}

#[tokio::test]
async fn test_invoke_with_query_payload() {
    let app = create_test_app();
    app.upload("POST", "/functions/", "adder.py", ADDER).await;

    let resp = app
        .get("/functions/adder/?payload=%7B%22a%22%3A5%2C%22b%22%3A7%7D")
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(
        resp.json()["FunctionResponse"]["event"],
        serde_json::json!({"a": 5, "b": 7})
    );

    let resp = app.get("/functions/adder?payload=%7Bbroken").await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.json()["code"], "InvalidArgument");
}

#[tokio::test]
async fn test_invoke_with_body_payload() {
    let app = create_test_app();
    app.upload("POST", "/functions/", "adder.py", ADDER).await;

    let req = Request::builder()
        .method("POST")
        .uri("/functions/adder")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"a": 10, "b": 20}"#))
        .unwrap();
    let resp = app.send(req).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(
        resp.json()["FunctionResponse"]["event"],
        serde_json::json!({"a": 10, "b": 20})
    );

    let req = Request::builder()
        .method("POST")
        .uri("/functions/adder")
        .body(Body::empty())
        .unwrap();
    let resp = app.send(req).await;
    assert_eq!(
        resp.json()["FunctionResponse"]["event"],
        serde_json::json!({"a": 1, "b": 2})
    );
}

#[tokio::test]
async fn test_invoke_unknown_function() {
    let app = create_test_app();
    let resp = app.get("/functions/ghost").await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    let body = resp.json();
    assert_eq!(body["SystemResponse"]["message"], "Function <ghost> not found.");
    assert!(body["FunctionResponse"].is_null());
}

#[tokio::test]
async fn test_code_plain_and_colored() {
    let app = create_test_app();
    app.upload("POST", "/functions/", "adder.py", ADDER).await;

    let resp = app.get("/functions/adder/code/").await;
    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    assert_eq!(
        body["SystemResponse"]["message"],
        "Function code unzipped successfully"
    );
    assert_eq!(body["FunctionResponse"], ADDER);

    let resp = app.get("/functions/adder/code?color=true").await;
    let body = resp.json();
    let colored = body["FunctionResponse"].as_str().unwrap();
    assert!(colored.contains("\x1b["));
    assert_ne!(colored, ADDER);

    let resp = app.get("/functions/ghost/code/").await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    assert!(resp.json()["FunctionResponse"].is_null());
}

#[tokio::test]
async fn test_delete() {
    let app = create_test_app();
    app.upload("POST", "/functions/", "adder.py", ADDER).await;

    let resp = app.delete("/functions/adder").await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["message"], "Function <adder> deleted.");

    let resp = app.delete("/functions/adder").await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    assert_eq!(resp.json()["code"], "NotFound");

    let resp = app.get("/functions/adder").await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_shadowing_helper_module_rejected() {
    let app = create_test_app();
    let resp = app
        .upload("POST", "/functions/", "nano_helper.py", ADDER)
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    let body = resp.json();
    assert_eq!(body["code"], "InvalidName");
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("nano_helper.py"));

    // Nothing was registered.
    let resp = app.get("/functions/").await;
    assert_eq!(resp.json()["message"], "No functions available.");
}

#[tokio::test]
async fn test_created_function_sees_bucket_names() {
    let app = create_test_app();
    let resp = app.upload("POST", "/functions/", "adder.py", ADDER).await;
    let env = &resp.json()["SystemResponse"]["environment"];
    assert_eq!(env["NANOGATE_DATASET_BUCKET"], "nano-platform-api-datasets");
    assert_eq!(env["NANOGATE_PAGE_BUCKET"], "nano-platform-api-pages");

    let resp = app.get("/functions/?detailed=true").await;
    assert_eq!(
        resp.json()[0]["environment"]["NANOGATE_DATASET_BUCKET"],
        "nano-platform-api-datasets"
    );
}
