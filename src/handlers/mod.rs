//! HTTP handlers for datasets, pages and functions.
//!
//! Shared pieces live here: multipart upload extraction, name
//! validation, query parameter structs, response envelopes, and the blob
//! operations datasets and pages have in common.

pub mod datasets;
pub mod functions;
pub mod pages;

use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::errors::{GatewayError, UpstreamError};
use crate::storage::backend::{BlobInfo, Namespace, StoredBlob};
use crate::AppState;

// -- Uploads ------------------------------------------------------------------

/// Multipart field carrying the uploaded file.
const UPLOAD_FIELD: &str = "file";

/// A file received in a multipart form.
#[derive(Debug)]
pub struct Upload {
    /// File name as sent by the client.
    pub file_name: String,
    pub data: Bytes,
}

/// OpenAPI shape of the multipart upload form.
#[allow(dead_code)]
#[derive(ToSchema)]
pub(crate) struct UploadForm {
    #[schema(format = "binary")]
    file: String,
}

/// Pull the `file` part out of a multipart request.
///
/// A request that is not multipart, or has no `file` part with a file
/// name, is a [`GatewayError::MissingUpload`].
pub async fn read_upload(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Upload, GatewayError> {
    let Ok(mut multipart) = multipart else {
        return Err(GatewayError::MissingUpload);
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| GatewayError::InvalidArgument {
            message: e.body_text(),
        })?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let Some(file_name) = field.file_name().map(str::to_string) else {
            return Err(GatewayError::MissingUpload);
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| GatewayError::InvalidArgument {
                message: e.body_text(),
            })?;
        return Ok(Upload { file_name, data });
    }

    Err(GatewayError::MissingUpload)
}

// -- Name validation ----------------------------------------------------------

/// Dataset and page names.
#[derive(Debug, Validate)]
pub struct BlobNameInput {
    /// 1-1024 bytes, no control characters.
    #[garde(length(bytes, min = 1, max = 1024), pattern(r"^[^\x00-\x1f\x7f]+$"))]
    pub name: String,
}

/// Function names.
#[derive(Debug, Validate)]
pub struct FunctionNameInput {
    /// 1-64 characters of letters, digits, hyphens and underscores.
    #[garde(length(min = 1, max = 64), pattern(r"^[A-Za-z0-9_-]+$"))]
    pub name: String,
}

pub fn validate_blob_name(name: &str) -> Result<(), GatewayError> {
    let input = BlobNameInput {
        name: name.to_string(),
    };
    input.validate().map_err(|report| GatewayError::InvalidName {
        name: name.to_string(),
        reason: report.to_string(),
    })
}

pub fn validate_function_name(name: &str) -> Result<(), GatewayError> {
    let input = FunctionNameInput {
        name: name.to_string(),
    };
    input.validate().map_err(|report| GatewayError::InvalidName {
        name: name.to_string(),
        reason: report.to_string(),
    })
}

// -- Query parameters ---------------------------------------------------------

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    /// Return the full store metadata instead of the condensed view.
    #[serde(default)]
    pub detailed: bool,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReadParams {
    /// Return the raw content instead of the JSON envelope.
    #[serde(default)]
    pub raw_file: bool,
}

// -- Response shaping ---------------------------------------------------------

/// `{"message": text}`.
pub fn message(text: impl Into<String>) -> Json<Value> {
    Json(json!({ "message": text.into() }))
}

/// Condensed listing entry.
#[derive(Debug, Serialize)]
pub struct ListEntry {
    pub id: String,
    pub creation_date: DateTime<Utc>,
    pub size: u64,
}

impl From<BlobInfo> for ListEntry {
    fn from(info: BlobInfo) -> Self {
        Self {
            id: info.name,
            creation_date: info.modified_at,
            size: info.size,
        }
    }
}

/// Metadata half of a content envelope.
fn blob_metadata(name: &str, blob: &StoredBlob) -> Value {
    json!({
        "Key": name,
        "ContentLength": blob.data.len(),
        "ContentType": blob.content_type,
        "ETag": blob.etag,
        "LastModified": blob.last_modified,
    })
}

/// A plain-text body with the given media type.
pub fn raw_body(media_type: &'static str, body: impl Into<Bytes>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, media_type)],
        body.into(),
    )
        .into_response()
}

// -- Blob operations shared by datasets and pages -----------------------------

/// Map an upstream not-found on `name` to a named 404.
pub fn named_not_found(
    namespace: Namespace,
    name: &str,
) -> impl FnOnce(UpstreamError) -> GatewayError {
    let name = name.to_string();
    move |err| match err {
        UpstreamError::NotFound => GatewayError::NotFound {
            kind: namespace.label(),
            name,
        },
        other => GatewayError::Upstream(other),
    }
}

/// Create a blob from an upload; 409 if the name is taken.
pub async fn create_blob(
    state: &AppState,
    namespace: Namespace,
    upload: Upload,
) -> Result<String, GatewayError> {
    let name = upload.file_name;
    validate_blob_name(&name)?;

    let conflict = || GatewayError::Conflict {
        kind: namespace.label(),
        name: name.clone(),
    };

    if state.store.exists(namespace, &name).await? {
        return Err(conflict());
    }
    match state.store.put_new(namespace, &name, upload.data).await {
        Ok(()) => {}
        Err(UpstreamError::AlreadyExists) => return Err(conflict()),
        Err(e) => return Err(e.into()),
    }

    info!("{} created: {}", namespace.label(), name);
    Ok(name)
}

/// List a namespace, condensed or detailed.
pub async fn list_blobs(
    state: &AppState,
    namespace: Namespace,
    detailed: bool,
) -> Result<Json<Value>, GatewayError> {
    let listing = state.store.list(namespace).await?;
    if listing.is_empty() {
        return Ok(message(format!("No {namespace} available.")));
    }
    let body = if detailed {
        serde_json::to_value(listing)
    } else {
        serde_json::to_value(listing.into_iter().map(ListEntry::from).collect::<Vec<_>>())
    }
    .map_err(anyhow::Error::from)?;
    Ok(Json(body))
}

/// Read a blob, as a JSON envelope under `content_key` or raw.
pub async fn read_blob(
    state: &AppState,
    namespace: Namespace,
    name: &str,
    raw_file: bool,
    media_type: &'static str,
    content_key: &str,
) -> Result<Response, GatewayError> {
    validate_blob_name(name)?;
    let blob = state
        .store
        .get(namespace, name)
        .await
        .map_err(named_not_found(namespace, name))?;

    if raw_file {
        return Ok(raw_body(media_type, blob.data));
    }

    let content = String::from_utf8_lossy(&blob.data).into_owned();
    let mut envelope = serde_json::Map::new();
    envelope.insert("SystemResponse".to_string(), blob_metadata(name, &blob));
    envelope.insert(content_key.to_string(), Value::String(content));
    Ok(Json(Value::Object(envelope)).into_response())
}
