//! AWS Lambda gateway compute service.
//!
//! Functions are registered with the uploaded zip inline
//! (`CreateFunction` with `ZipFile`), invoked synchronously
//! (`RequestResponse`), and their code is read back through the
//! presigned download location returned by `GetFunction`.

use std::time::Duration;

use aws_config::timeout::TimeoutConfig;
use aws_sdk_lambda::operation::create_function::CreateFunctionOutput;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::{
    Architecture, Environment, FunctionCode, FunctionConfiguration, InvocationType, Runtime,
};
use aws_sdk_lambda::Client;
use bytes::Bytes;
use tracing::{debug, info};

use super::backend::{
    decode_payload, ComputeFuture, ComputeService, CreateOutcome, FunctionInfo, FunctionSpec,
    Invocation,
};
use crate::config::ComputeConfig;
use crate::errors::{classify_sdk_error, UpstreamError};
use crate::metrics::record_upstream_call;

/// Compute service that forwards operations to AWS Lambda.
pub struct LambdaComputeService {
    /// AWS Lambda SDK client.
    client: Client,
    /// Plain HTTP client for code downloads.
    http: reqwest::Client,
}

impl LambdaComputeService {
    /// Create a new Lambda compute service from the compute configuration.
    pub async fn new(config: &ComputeConfig) -> anyhow::Result<Self> {
        let timeouts = TimeoutConfig::builder()
            .operation_timeout(Duration::from_secs(config.operation_timeout_secs))
            .build();

        let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .timeout_config(timeouts);

        if !config.endpoint_url.is_empty() {
            config_loader = config_loader.endpoint_url(&config.endpoint_url);
        }

        let sdk_config = config_loader.load().await;
        let client = Client::new(&sdk_config);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.download_timeout_secs))
            .build()?;

        info!(
            "Lambda compute service initialized: region={} runtime={}",
            config.region, config.runtime
        );

        Ok(Self { client, http })
    }

    /// GET a presigned code location.
    async fn download(&self, url: &str) -> Result<Bytes, UpstreamError> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(classify_download_error)?;
        let resp = resp.error_for_status().map_err(classify_download_error)?;
        resp.bytes().await.map_err(classify_download_error)
    }
}

/// Classify a failed code download like an SDK call.
fn classify_download_error(err: reqwest::Error) -> UpstreamError {
    let detail = format!("code download: {err}");
    match err.status().map(|s| s.as_u16()) {
        Some(404) => UpstreamError::NotFound,
        Some(401 | 403) => UpstreamError::Permission(detail),
        Some(s) if s == 429 || s >= 500 => UpstreamError::Transient(detail),
        Some(_) => UpstreamError::Rejected(detail),
        None => UpstreamError::Transient(detail),
    }
}

fn info_from_configuration(cfg: &FunctionConfiguration) -> FunctionInfo {
    FunctionInfo {
        name: cfg.function_name().unwrap_or_default().to_string(),
        arn: cfg.function_arn().map(str::to_string),
        runtime: cfg.runtime().map(|r| r.as_str().to_string()),
        handler: cfg.handler().map(str::to_string),
        memory_mb: cfg.memory_size(),
        timeout_secs: cfg.timeout(),
        code_size: cfg.code_size(),
        last_modified: cfg.last_modified().map(str::to_string),
        environment: cfg
            .environment()
            .and_then(|e| e.variables())
            .cloned()
            .unwrap_or_default(),
    }
}

fn info_from_created(out: &CreateFunctionOutput) -> FunctionInfo {
    FunctionInfo {
        name: out.function_name().unwrap_or_default().to_string(),
        arn: out.function_arn().map(str::to_string),
        runtime: out.runtime().map(|r| r.as_str().to_string()),
        handler: out.handler().map(str::to_string),
        memory_mb: out.memory_size(),
        timeout_secs: out.timeout(),
        code_size: out.code_size(),
        last_modified: out.last_modified().map(str::to_string),
        environment: out
            .environment()
            .and_then(|e| e.variables())
            .cloned()
            .unwrap_or_default(),
    }
}

impl ComputeService for LambdaComputeService {
    fn list(&self) -> ComputeFuture<'_, Vec<FunctionInfo>> {
        Box::pin(async move {
            debug!("Lambda list_functions");
            let result: Result<Vec<FunctionInfo>, UpstreamError> = async {
                let mut functions = Vec::new();
                let mut marker: Option<String> = None;
                loop {
                    let resp = self
                        .client
                        .list_functions()
                        .set_marker(marker.take())
                        .send()
                        .await
                        .map_err(|e| classify_sdk_error("list_functions", e))?;

                    functions.extend(resp.functions().iter().map(info_from_configuration));

                    marker = resp.next_marker().map(str::to_string);
                    if marker.is_none() {
                        break;
                    }
                }
                Ok(functions)
            }
            .await;
            record_upstream_call("lambda", "list_functions", &result);
            result
        })
    }

    fn exists(&self, name: &str) -> ComputeFuture<'_, bool> {
        let name = name.to_string();
        Box::pin(async move {
            debug!("Lambda get_function_configuration: name={}", name);
            let result = match self
                .client
                .get_function_configuration()
                .function_name(&name)
                .send()
                .await
            {
                Ok(_) => Ok(true),
                Err(e) => match classify_sdk_error("get_function_configuration", e) {
                    UpstreamError::NotFound => Ok(false),
                    other => Err(other),
                },
            };
            record_upstream_call("lambda", "get_function_configuration", &result);
            result
        })
    }

    fn create(&self, spec: FunctionSpec) -> ComputeFuture<'_, CreateOutcome> {
        Box::pin(async move {
            debug!(
                "Lambda create_function: name={} handler={} archive={} bytes",
                spec.name,
                spec.handler,
                spec.archive.len()
            );

            let code = FunctionCode::builder()
                .zip_file(Blob::new(spec.archive.to_vec()))
                .build();

            let layers = (!spec.layers.is_empty()).then(|| spec.layers.clone());
            let environment = (!spec.environment.is_empty()).then(|| {
                Environment::builder()
                    .set_variables(Some(spec.environment.clone()))
                    .build()
            });

            let result = match self
                .client
                .create_function()
                .function_name(&spec.name)
                .runtime(Runtime::from(spec.runtime.as_str()))
                .role(&spec.role)
                .handler(&spec.handler)
                .code(code)
                .description(&spec.description)
                .timeout(spec.timeout_secs)
                .memory_size(spec.memory_mb)
                .publish(true)
                .architectures(Architecture::from(spec.architecture.as_str()))
                .set_layers(layers)
                .set_environment(environment)
                .send()
                .await
            {
                Ok(out) => Ok(CreateOutcome::Created(info_from_created(&out))),
                // Lost a race against another creator: same as the guard tripping.
                Err(e) => match classify_sdk_error("create_function", e) {
                    UpstreamError::AlreadyExists => Ok(CreateOutcome::AlreadyExists),
                    other => Err(other),
                },
            };
            record_upstream_call("lambda", "create_function", &result);
            result
        })
    }

    fn invoke(
        &self,
        name: &str,
        payload: serde_json::Value,
    ) -> ComputeFuture<'_, Option<Invocation>> {
        let name = name.to_string();
        Box::pin(async move {
            debug!("Lambda invoke: name={}", name);
            let body = serde_json::to_vec(&payload)
                .map_err(|e| UpstreamError::Rejected(format!("invoke payload: {e}")))?;

            let result = match self
                .client
                .invoke()
                .function_name(&name)
                .invocation_type(InvocationType::RequestResponse)
                .payload(Blob::new(body))
                .send()
                .await
            {
                Ok(resp) => Ok(Some(Invocation {
                    status_code: resp.status_code(),
                    executed_version: resp.executed_version().map(str::to_string),
                    function_error: resp.function_error().map(str::to_string),
                    payload: resp
                        .payload()
                        .map(|b| decode_payload(b.as_ref()))
                        .unwrap_or(serde_json::Value::Null),
                })),
                Err(e) => match classify_sdk_error("invoke", e) {
                    UpstreamError::NotFound => Ok(None),
                    other => Err(other),
                },
            };
            record_upstream_call("lambda", "invoke", &result);
            result
        })
    }

    fn delete(&self, name: &str) -> ComputeFuture<'_, Option<()>> {
        let name = name.to_string();
        Box::pin(async move {
            debug!("Lambda delete_function: name={}", name);
            let result = match self
                .client
                .delete_function()
                .function_name(&name)
                .send()
                .await
            {
                Ok(_) => Ok(Some(())),
                Err(e) => match classify_sdk_error("delete_function", e) {
                    UpstreamError::NotFound => Ok(None),
                    other => Err(other),
                },
            };
            record_upstream_call("lambda", "delete_function", &result);
            result
        })
    }

    fn fetch_code_archive(&self, name: &str) -> ComputeFuture<'_, Option<Bytes>> {
        let name = name.to_string();
        Box::pin(async move {
            debug!("Lambda get_function: name={}", name);
            let result: Result<Option<Bytes>, UpstreamError> = async {
                let resp = match self.client.get_function().function_name(&name).send().await {
                    Ok(resp) => resp,
                    Err(e) => {
                        return match classify_sdk_error("get_function", e) {
                            UpstreamError::NotFound => Ok(None),
                            other => Err(other),
                        }
                    }
                };

                let location = resp
                    .code()
                    .and_then(|c| c.location())
                    .ok_or_else(|| {
                        UpstreamError::Rejected(format!("function {name} has no code location"))
                    })?
                    .to_string();

                self.download(&location).await.map(Some)
            }
            .await;
            record_upstream_call("lambda", "get_function", &result);
            result
        })
    }
}
