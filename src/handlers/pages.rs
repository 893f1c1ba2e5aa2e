//! Page handlers: YAML documents.

use std::sync::Arc;

use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use super::{create_blob, list_blobs, message, read_blob, read_upload, ListParams, ReadParams};
use crate::errors::GatewayError;
use crate::storage::backend::Namespace;
use crate::AppState;

const NS: Namespace = Namespace::Page;

const YAML: &str = "text/yaml; charset=utf-8";

/// Upload a new page.
#[utoipa::path(
    post,
    path = "/pages/",
    tag = "Pages",
    request_body(content_type = "multipart/form-data", content = inline(super::UploadForm)),
    responses(
        (status = 201, description = "Page uploaded"),
        (status = 400, description = "No file uploaded or invalid name"),
        (status = 409, description = "Page already exists")
    )
)]
pub async fn create_page(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, GatewayError> {
    let upload = read_upload(multipart).await?;
    let name = create_blob(&state, NS, upload).await?;
    Ok((StatusCode::CREATED, message(format!("Page <{name}> uploaded."))).into_response())
}

#[utoipa::path(
    get,
    path = "/pages/",
    tag = "Pages",
    params(ListParams),
    responses((status = 200, description = "Page listing or no-pages message"))
)]
pub async fn list_pages(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Response, GatewayError> {
    Ok(list_blobs(&state, NS, params.detailed).await?.into_response())
}

#[utoipa::path(
    get,
    path = "/pages/{id}",
    tag = "Pages",
    params(("id" = String, Path, description = "Page name"), ReadParams),
    responses(
        (status = 200, description = "Page content"),
        (status = 404, description = "Page not found")
    )
)]
pub async fn get_page(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<ReadParams>,
) -> Result<Response, GatewayError> {
    read_blob(&state, NS, &id, params.raw_file, YAML, "DatasetResponse").await
}
