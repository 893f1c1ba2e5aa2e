//! Function handlers: package, register, invoke, delete and read back
//! source code.

use std::collections::HashMap;
use std::path::Path as FsPath;
use std::sync::Arc;

use anyhow::Context;
use axum::body::Bytes;
use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use utoipa::IntoParams;

use super::{message, read_upload, validate_function_name, ListParams, Upload};
use crate::archive::{build_archive, ArchiveMember};
use crate::compute::backend::{CreateOutcome, FunctionSpec};
use crate::config::{ComputeConfig, Config};
use crate::errors::GatewayError;
use crate::AppState;

const KIND: &str = "Function";

/// Environment variable carrying the dataset bucket to deployed helpers.
pub const DATASET_BUCKET_VAR: &str = "NANOGATE_DATASET_BUCKET";

/// Environment variable carrying the page bucket to deployed helpers.
pub const PAGE_BUCKET_VAR: &str = "NANOGATE_PAGE_BUCKET";

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct InvokeParams {
    /// JSON event passed to the function; the configured default if absent.
    pub payload: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CodeParams {
    /// Highlight the source with terminal color escapes.
    #[serde(default)]
    pub color: bool,
}

/// Split an uploaded file name into its stem.
fn file_stem(file_name: &str) -> &str {
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    }
}

/// Name of the source member inside a function archive.
fn source_member(name: &str, config: &ComputeConfig) -> String {
    format!("{name}.{}", config.source_extension)
}

/// Archive member name of each configured helper module.
fn helper_member_names(config: &ComputeConfig) -> impl Iterator<Item = &str> {
    config
        .helper_modules
        .iter()
        .filter_map(|helper| FsPath::new(helper).file_name().and_then(|n| n.to_str()))
}

/// Environment handed to every created function.
fn function_environment(config: &Config) -> HashMap<String, String> {
    HashMap::from([
        (DATASET_BUCKET_VAR.to_string(), config.storage.dataset_bucket()),
        (PAGE_BUCKET_VAR.to_string(), config.storage.page_bucket()),
    ])
}

/// Package the upload with the configured helper modules.
async fn package(upload: Upload, name: &str, config: &ComputeConfig) -> anyhow::Result<Bytes> {
    let mut members = vec![ArchiveMember::new(source_member(name, config), upload.data)];
    for helper in &config.helper_modules {
        let path = FsPath::new(helper);
        let member_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("helper module path {helper} has no file name"))?;
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading helper module {helper}"))?;
        members.push(ArchiveMember::new(member_name, data));
    }
    build_archive(&members)
}

fn not_found_envelope(name: &str) -> Response {
    let body = json!({
        "SystemResponse": { "message": format!("{KIND} <{name}> not found.") },
        "FunctionResponse": Value::Null,
    });
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}

/// Package and register a function.
///
/// The function is named after the upload's file stem; its handler is
/// `{name}.{entry_function}`.
#[utoipa::path(
    post,
    path = "/functions/",
    tag = "Functions",
    request_body(content_type = "multipart/form-data", content = inline(super::UploadForm)),
    responses(
        (status = 201, description = "Function registered"),
        (status = 400, description = "No file uploaded or invalid name"),
        (status = 409, description = "Function already exists")
    )
)]
pub async fn create_function(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, GatewayError> {
    let upload = read_upload(multipart).await?;
    let name = file_stem(&upload.file_name).to_string();
    validate_function_name(&name)?;

    let config = &state.config.compute;
    let member = source_member(&name, config);
    if helper_member_names(config).any(|helper| helper == member) {
        return Err(GatewayError::InvalidName {
            name,
            reason: format!("{member} is reserved for a bundled helper module"),
        });
    }

    let conflict = || GatewayError::Conflict {
        kind: KIND,
        name: name.clone(),
    };
    if state.compute.exists(&name).await? {
        return Err(conflict());
    }

    let archive = package(upload, &name, config).await?;
    let spec = FunctionSpec {
        name: name.clone(),
        archive,
        handler: format!("{name}.{}", config.entry_function),
        runtime: config.runtime.clone(),
        architecture: config.architecture.clone(),
        role: config.role_arn.clone(),
        description: format!("{name} function"),
        timeout_secs: config.timeout_secs,
        memory_mb: config.memory_mb,
        layers: config.layers.clone(),
        environment: function_environment(&state.config),
    };

    match state.compute.create(spec).await? {
        CreateOutcome::Created(info) => {
            info!("Function created: {}", name);
            let body = json!({
                "SystemResponse": info,
                "FunctionResponse": { "message": format!("{KIND} <{name}> created.") },
            });
            Ok((StatusCode::CREATED, Json(body)).into_response())
        }
        CreateOutcome::AlreadyExists => Err(conflict()),
    }
}

/// List functions, by name or with full configuration.
#[utoipa::path(
    get,
    path = "/functions/",
    tag = "Functions",
    params(ListParams),
    responses((status = 200, description = "Function listing or no-functions message"))
)]
pub async fn list_functions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Response, GatewayError> {
    let functions = state.compute.list().await?;
    if functions.is_empty() {
        return Ok(message("No functions available.").into_response());
    }
    if params.detailed {
        return Ok(Json(functions).into_response());
    }
    let names: Vec<String> = functions.into_iter().map(|f| f.name).collect();
    Ok(Json(names).into_response())
}

/// Invoke `name` and wrap the outcome.
async fn invoke(state: &AppState, name: &str, payload: Value) -> Result<Response, GatewayError> {
    validate_function_name(name)?;
    let Some(invocation) = state.compute.invoke(name, payload).await? else {
        return Ok(not_found_envelope(name));
    };
    let body = json!({
        "SystemResponse": invocation,
        "FunctionResponse": invocation.payload,
    });
    Ok(Json(body).into_response())
}

fn parse_payload(raw: &str) -> Result<Value, GatewayError> {
    serde_json::from_str(raw).map_err(|e| GatewayError::InvalidArgument {
        message: format!("payload is not valid JSON: {e}"),
    })
}

/// Invoke a function with a query-string payload.
#[utoipa::path(
    get,
    path = "/functions/{id}",
    tag = "Functions",
    params(("id" = String, Path, description = "Function name"), InvokeParams),
    responses(
        (status = 200, description = "Invocation result"),
        (status = 400, description = "Payload is not valid JSON"),
        (status = 404, description = "Function not found")
    )
)]
pub async fn invoke_function(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<InvokeParams>,
) -> Result<Response, GatewayError> {
    let payload = match params.payload.as_deref() {
        Some(raw) => parse_payload(raw)?,
        None => state.config.compute.default_payload.clone(),
    };
    invoke(&state, &id, payload).await
}

/// Invoke a function with the request body as payload.
#[utoipa::path(
    post,
    path = "/functions/{id}",
    tag = "Functions",
    params(("id" = String, Path, description = "Function name")),
    request_body(
        content = String,
        content_type = "application/json",
        description = "JSON event; empty for the default"
    ),
    responses(
        (status = 200, description = "Invocation result"),
        (status = 400, description = "Body is not valid JSON"),
        (status = 404, description = "Function not found")
    )
)]
pub async fn invoke_function_with_body(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let payload = if body.iter().all(u8::is_ascii_whitespace) {
        state.config.compute.default_payload.clone()
    } else {
        let text = std::str::from_utf8(&body).map_err(|_| GatewayError::InvalidArgument {
            message: "payload is not valid UTF-8".to_string(),
        })?;
        parse_payload(text)?
    };
    invoke(&state, &id, payload).await
}

#[utoipa::path(
    delete,
    path = "/functions/{id}",
    tag = "Functions",
    params(("id" = String, Path, description = "Function name")),
    responses(
        (status = 200, description = "Function deleted"),
        (status = 404, description = "Function not found")
    )
)]
pub async fn delete_function(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, GatewayError> {
    validate_function_name(&id)?;
    match state.compute.delete(&id).await? {
        Some(()) => {
            info!("Function deleted: {}", id);
            Ok(message(format!("{KIND} <{id}> deleted.")).into_response())
        }
        None => Err(GatewayError::NotFound { kind: KIND, name: id }),
    }
}

/// Read back a function's source, optionally highlighted.
#[utoipa::path(
    get,
    path = "/functions/{id}/code/",
    tag = "Functions",
    params(("id" = String, Path, description = "Function name"), CodeParams),
    responses(
        (status = 200, description = "Function source"),
        (status = 404, description = "Function not found")
    )
)]
pub async fn get_function_code(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<CodeParams>,
) -> Result<Response, GatewayError> {
    validate_function_name(&id)?;
    let config = &state.config.compute;
    let Some(source) = state
        .compute
        .fetch_source(&id, &source_member(&id, config))
        .await?
    else {
        return Ok(not_found_envelope(&id));
    };

    let source = if params.color {
        state.highlighter.highlight(&source, &config.source_extension)?
    } else {
        source
    };

    let body = json!({
        "SystemResponse": { "message": "Function code unzipped successfully" },
        "FunctionResponse": source,
    });
    Ok(Json(body).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("adder.py"), "adder");
        assert_eq!(file_stem("archive.tar.py"), "archive.tar");
        assert_eq!(file_stem("noext"), "noext");
        assert_eq!(file_stem(".hidden"), ".hidden");
    }

    #[test]
    fn test_source_member() {
        let config = ComputeConfig::default();
        assert_eq!(source_member("adder", &config), "adder.py");
    }

    #[test]
    fn test_helper_member_names() {
        let config = ComputeConfig {
            helper_modules: vec!["assets/nano_helper.py".to_string(), "util.py".to_string()],
            ..ComputeConfig::default()
        };
        let names: Vec<&str> = helper_member_names(&config).collect();
        assert_eq!(names, vec!["nano_helper.py", "util.py"]);
    }

    #[test]
    fn test_function_environment_follows_storage_config() {
        let mut config = Config::default();
        config.storage.bucket_prefix = "acme".to_string();
        config.storage.dataset_suffix = "-tables".to_string();
        let env = function_environment(&config);
        assert_eq!(env[DATASET_BUCKET_VAR], "acme-tables");
        assert_eq!(env[PAGE_BUCKET_VAR], "acme-pages");
    }

    #[test]
    fn test_parse_payload() {
        assert_eq!(parse_payload(r#"{"a": 5}"#).unwrap(), json!({"a": 5}));
        let err = parse_payload("{not json").unwrap_err();
        assert_eq!(err.code(), "InvalidArgument");
    }

    #[tokio::test]
    async fn test_package_missing_helper_fails() {
        let config = ComputeConfig {
            helper_modules: vec!["/nonexistent/helper.py".to_string()],
            ..ComputeConfig::default()
        };
        let upload = Upload {
            file_name: "adder.py".to_string(),
            data: Bytes::from_static(b"def nano_function(e, c): pass\n"),
        };
        assert!(package(upload, "adder", &config).await.is_err());
    }

    #[tokio::test]
    async fn test_package_bundles_helpers() {
        let dir = tempfile::tempdir().unwrap();
        let helper = dir.path().join("nano_helper.py");
        std::fs::write(&helper, "HELPER = 1\n").unwrap();
        let config = ComputeConfig {
            helper_modules: vec![helper.to_string_lossy().into_owned()],
            ..ComputeConfig::default()
        };
        let upload = Upload {
            file_name: "adder.py".to_string(),
            data: Bytes::from_static(b"def nano_function(e, c): pass\n"),
        };
        let archive = package(upload, "adder", &config).await.unwrap();
        assert_eq!(
            crate::archive::extract_text(&archive, "nano_helper.py")
                .unwrap()
                .as_deref(),
            Some("HELPER = 1\n")
        );
        assert!(crate::archive::extract_text(&archive, "adder.py")
            .unwrap()
            .is_some());
    }
}
