//! Dataset handlers: CSV blobs with paginated row access.

use std::sync::Arc;

use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use utoipa::IntoParams;

use super::{
    create_blob, list_blobs, message, named_not_found, raw_body, read_blob, read_upload,
    validate_blob_name, ListParams, ReadParams,
};
use crate::errors::{GatewayError, UpstreamError};
use crate::pagination::RowWindow;
use crate::storage::backend::Namespace;
use crate::AppState;

const NS: Namespace = Namespace::Dataset;

const CSV: &str = "text/csv; charset=utf-8";

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageParams {
    /// Return the rows as `text/csv` instead of the JSON envelope.
    #[serde(default)]
    pub raw_file: bool,
    /// Window width; defaults to the configured page size.
    pub size: Option<u64>,
}

/// Upload a new dataset.
#[utoipa::path(
    post,
    path = "/datasets/",
    tag = "Datasets",
    request_body(content_type = "multipart/form-data", content = inline(super::UploadForm)),
    responses(
        (status = 201, description = "Dataset uploaded"),
        (status = 400, description = "No file uploaded or invalid name"),
        (status = 409, description = "Dataset already exists")
    )
)]
pub async fn create_dataset(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, GatewayError> {
    let upload = read_upload(multipart).await?;
    let name = create_blob(&state, NS, upload).await?;
    Ok((StatusCode::CREATED, message(format!("File <{name}> uploaded."))).into_response())
}

/// Create a zero-length dataset.
#[utoipa::path(
    post,
    path = "/datasets/empty/{name}",
    tag = "Datasets",
    params(("name" = String, Path, description = "Dataset name")),
    responses(
        (status = 201, description = "Empty dataset created"),
        (status = 409, description = "Dataset already exists")
    )
)]
pub async fn create_empty_dataset(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Response, GatewayError> {
    validate_blob_name(&name)?;

    let conflict = || GatewayError::Conflict {
        kind: NS.label(),
        name: name.clone(),
    };
    if state.store.exists(NS, &name).await? {
        return Err(conflict());
    }
    match state.store.put_empty(NS, &name).await {
        Ok(()) => {}
        Err(UpstreamError::AlreadyExists) => return Err(conflict()),
        Err(e) => return Err(e.into()),
    }

    info!("Empty dataset created: {}", name);
    let body = json!({
        "SystemResponse": { "Key": name, "ContentLength": 0 },
        "DatasetResponse": { "message": format!("Empty dataset <{name}> created.") },
    });
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

/// Overwrite an existing dataset.
#[utoipa::path(
    put,
    path = "/datasets/",
    tag = "Datasets",
    request_body(content_type = "multipart/form-data", content = inline(super::UploadForm)),
    responses(
        (status = 200, description = "Dataset updated"),
        (status = 404, description = "Dataset not found")
    )
)]
pub async fn update_dataset(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, GatewayError> {
    let upload = read_upload(multipart).await?;
    let name = upload.file_name;
    validate_blob_name(&name)?;

    // Not atomic: a delete landing between the check and the put is undone.
    if !state.store.exists(NS, &name).await? {
        return Err(GatewayError::NotFound {
            kind: NS.label(),
            name,
        });
    }
    state.store.put(NS, &name, upload.data).await?;

    info!("Dataset updated: {}", name);
    Ok(message(format!("File <{name}> updated.")).into_response())
}

/// List datasets.
#[utoipa::path(
    get,
    path = "/datasets/",
    tag = "Datasets",
    params(ListParams),
    responses((status = 200, description = "Dataset listing or no-datasets message"))
)]
pub async fn list_datasets(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Response, GatewayError> {
    Ok(list_blobs(&state, NS, params.detailed).await?.into_response())
}

/// Download a dataset.
#[utoipa::path(
    get,
    path = "/datasets/{id}",
    tag = "Datasets",
    params(("id" = String, Path, description = "Dataset name"), ReadParams),
    responses(
        (status = 200, description = "Dataset content"),
        (status = 404, description = "Dataset not found")
    )
)]
pub async fn get_dataset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<ReadParams>,
) -> Result<Response, GatewayError> {
    read_blob(&state, NS, &id, params.raw_file, CSV, "DatasetResponse").await
}

/// Read a window of rows.
///
/// Returns rows whose integer `id` lies strictly between `page` and
/// `page + size`.
#[utoipa::path(
    get,
    path = "/datasets/{id}/page/{page}",
    tag = "Datasets",
    params(
        ("id" = String, Path, description = "Dataset name"),
        ("page" = u64, Path, description = "Window start (exclusive)"),
        PageParams
    ),
    responses(
        (status = 200, description = "Rows in the window, as a JSON array or raw CSV"),
        (status = 400, description = "Invalid page index"),
        (status = 404, description = "Dataset not found")
    )
)]
pub async fn get_dataset_page(
    State(state): State<Arc<AppState>>,
    Path((id, page)): Path<(String, String)>,
    Query(params): Query<PageParams>,
) -> Result<Response, GatewayError> {
    validate_blob_name(&id)?;
    let index: u64 = page.parse().map_err(|_| GatewayError::InvalidArgument {
        message: format!("Invalid page index <{page}>: expected a non-negative integer."),
    })?;
    let pagination = &state.config.pagination;
    let size = params
        .size
        .unwrap_or(pagination.page_size)
        .min(pagination.max_page_size);
    let window = RowWindow::new(index, size);

    if !state.store.exists(NS, &id).await? {
        return Err(GatewayError::NotFound {
            kind: NS.label(),
            name: id,
        });
    }

    let rows = state
        .store
        .select_rows(NS, &id, window, &state.config.storage.id_column)
        .await
        .map_err(named_not_found(NS, &id))?;

    if params.raw_file {
        let mut content = rows.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        return Ok(raw_body(CSV, content));
    }
    let body = json!({
        "SystemResponse": {
            "Key": id,
            "Index": window.index,
            "Size": window.size,
            "Rows": rows.len(),
        },
        "DatasetResponse": rows,
    });
    Ok(Json(body).into_response())
}

/// Delete a dataset. Succeeds whether or not it exists.
#[utoipa::path(
    delete,
    path = "/datasets/{id}",
    tag = "Datasets",
    params(("id" = String, Path, description = "Dataset name")),
    responses((status = 204, description = "Dataset deleted or absent"))
)]
pub async fn delete_dataset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, GatewayError> {
    validate_blob_name(&id)?;
    state.store.delete(NS, &id).await?;
    info!("Dataset deleted: {}", id);
    Ok(StatusCode::NO_CONTENT)
}
