//! Shared helpers for router-level tests against the in-memory backends.

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, Request, StatusCode},
    Router,
};
use nanogate::{
    compute::memory::MemoryComputeService, config::Config, highlight::Highlighter,
    storage::backend::BlobStore, storage::memory::MemoryBlobStore, AppState,
};
use tempfile::TempDir;
use tower::ServiceExt;

pub const BOUNDARY: &str = "nanogate-test-boundary";

/// A router plus the temp dir holding its helper module.
pub struct TestApp {
    pub router: Router,
    _dir: TempDir,
}

pub fn create_test_app() -> TestApp {
    create_test_app_with_store(Arc::new(MemoryBlobStore::new()))
}

/// Like [`create_test_app`], with a custom blob store.
pub fn create_test_app_with_store(store: Arc<dyn BlobStore>) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let helper = dir.path().join("nano_helper.py");
    std::fs::write(&helper, "HELPER = True\n").unwrap();

    let mut config = Config::default();
    config.compute.helper_modules = vec![helper.to_string_lossy().into_owned()];

    let state = Arc::new(AppState {
        config,
        store,
        compute: Arc::new(MemoryComputeService::new()),
        highlighter: Highlighter::new().unwrap(),
    });

    TestApp {
        router: nanogate::server::app(state),
        _dir: dir,
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn text(&self) -> String {
        String::from_utf8(self.body.to_vec()).unwrap()
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn delete(&self, uri: &str) -> TestResponse {
        self.send(
            Request::builder()
                .method("DELETE")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn upload(
        &self,
        method: &str,
        uri: &str,
        file_name: &str,
        content: &str,
    ) -> TestResponse {
        self.send(multipart_request(method, uri, file_name, content))
            .await
    }
}

/// Build a multipart request with a single `file` part.
pub fn multipart_request(
    method: &str,
    uri: &str,
    file_name: &str,
    content: &str,
) -> Request<Body> {
    let body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
         Content-Type: application/octet-stream\r\n\
         \r\n\
         {content}\r\n\
         --{BOUNDARY}--\r\n"
    );
    Request::builder()
        .method(method)
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

/// CSV with header `id,value` and ids `1..=n`.
pub fn numbered_csv(n: u32) -> String {
    let mut csv = String::from("id,value\n");
    for id in 1..=n {
        csv.push_str(&format!("{id},v{id}\n"));
    }
    csv
}
