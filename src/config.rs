//! Configuration loading and types for nanogate.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Each subsection governs a different part of the
//! gateway: networking, blob storage, function execution, pagination,
//! logging and metrics.

use serde::Deserialize;
use std::path::Path;
use tracing::warn;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Blob storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Function execution backend settings.
    #[serde(default)]
    pub compute: ComputeConfig,

    /// Dataset pagination settings.
    #[serde(default)]
    pub pagination: PaginationConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,

    /// Maximum accepted request body in bytes.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: usize,

    /// Origins allowed by the CORS layer.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout: default_shutdown_timeout(),
            max_upload_size: default_max_upload_size(),
            cors_origins: default_cors_origins(),
        }
    }
}

/// Blob storage configuration.
///
/// Datasets live in `{bucket_prefix}{dataset_suffix}`, pages in
/// `{bucket_prefix}{page_suffix}`.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Backend type: `aws` or `memory`.
    #[serde(default = "default_backend")]
    pub backend: String,

    /// AWS region.
    #[serde(default = "default_region")]
    pub region: String,

    /// Shared prefix of the backing bucket names.
    #[serde(default = "default_bucket_prefix")]
    pub bucket_prefix: String,

    /// Suffix of the dataset bucket.
    #[serde(default = "default_dataset_suffix")]
    pub dataset_suffix: String,

    /// Suffix of the page bucket.
    #[serde(default = "default_page_suffix")]
    pub page_suffix: String,

    /// Custom S3-compatible endpoint (e.g. MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: String,

    /// Force path-style URL addressing.
    #[serde(default)]
    pub use_path_style: bool,

    /// Explicit AWS access key (falls back to env/credential chain).
    #[serde(default)]
    pub access_key_id: String,

    /// Explicit AWS secret key (falls back to env/credential chain).
    #[serde(default)]
    pub secret_access_key: String,

    /// Per-operation timeout for storage calls, in seconds.
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_secs: u64,

    /// Name of the integer row identifier column used for pagination.
    #[serde(default = "default_id_column")]
    pub id_column: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            region: default_region(),
            bucket_prefix: default_bucket_prefix(),
            dataset_suffix: default_dataset_suffix(),
            page_suffix: default_page_suffix(),
            endpoint_url: String::new(),
            use_path_style: false,
            access_key_id: String::new(),
            secret_access_key: String::new(),
            operation_timeout_secs: default_operation_timeout(),
            id_column: default_id_column(),
        }
    }
}

impl StorageConfig {
    /// Backing bucket for datasets.
    pub fn dataset_bucket(&self) -> String {
        format!("{}{}", self.bucket_prefix, self.dataset_suffix)
    }

    /// Backing bucket for pages.
    pub fn page_bucket(&self) -> String {
        format!("{}{}", self.bucket_prefix, self.page_suffix)
    }
}

/// Function execution configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ComputeConfig {
    /// Backend type: `aws` or `memory`.
    #[serde(default = "default_backend")]
    pub backend: String,

    /// AWS region.
    #[serde(default = "default_region")]
    pub region: String,

    /// Custom Lambda-compatible endpoint.
    #[serde(default)]
    pub endpoint_url: String,

    /// Execution role assumed by created functions.
    #[serde(default = "default_role_arn")]
    pub role_arn: String,

    /// Runtime identifier, e.g. `python3.9`.
    #[serde(default = "default_runtime")]
    pub runtime: String,

    /// Instruction set architecture.
    #[serde(default = "default_architecture")]
    pub architecture: String,

    /// Function name inside the uploaded module; handler is `{module}.{entry_function}`.
    #[serde(default = "default_entry_function")]
    pub entry_function: String,

    /// Extension of uploaded source files, used to locate the source in archives.
    #[serde(default = "default_source_extension")]
    pub source_extension: String,

    /// Function timeout in seconds.
    #[serde(default = "default_function_timeout")]
    pub timeout_secs: i32,

    /// Function memory in MB.
    #[serde(default = "default_memory_mb")]
    pub memory_mb: i32,

    /// Layer ARNs attached to every function.
    #[serde(default = "default_layers")]
    pub layers: Vec<String>,

    /// Local files bundled into every function archive next to the upload.
    #[serde(default = "default_helper_modules")]
    pub helper_modules: Vec<String>,

    /// Payload used when an invocation does not supply one.
    #[serde(default = "default_payload")]
    pub default_payload: serde_json::Value,

    /// Per-operation timeout for compute calls, in seconds.
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_secs: u64,

    /// Timeout for downloading code archives, in seconds.
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            region: default_region(),
            endpoint_url: String::new(),
            role_arn: default_role_arn(),
            runtime: default_runtime(),
            architecture: default_architecture(),
            entry_function: default_entry_function(),
            source_extension: default_source_extension(),
            timeout_secs: default_function_timeout(),
            memory_mb: default_memory_mb(),
            layers: default_layers(),
            helper_modules: default_helper_modules(),
            default_payload: default_payload(),
            operation_timeout_secs: default_operation_timeout(),
            download_timeout_secs: default_download_timeout(),
        }
    }
}

/// Dataset pagination configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PaginationConfig {
    /// Rows per page when the request does not say.
    #[serde(default = "default_page_size")]
    pub page_size: u64,

    /// Upper bound on a requested page size.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and the `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { metrics: true }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_max_upload_size() -> usize {
    50 * 1024 * 1024
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost.tiangolo.com".to_string(),
        "https://localhost.tiangolo.com".to_string(),
        "http://localhost".to_string(),
    ]
}

fn default_backend() -> String {
    "aws".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_bucket_prefix() -> String {
    "nano-platform-api".to_string()
}

fn default_dataset_suffix() -> String {
    "-datasets".to_string()
}

fn default_page_suffix() -> String {
    "-pages".to_string()
}

fn default_operation_timeout() -> u64 {
    30
}

fn default_id_column() -> String {
    "id".to_string()
}

fn default_role_arn() -> String {
    "arn:aws:iam::123456789012:role/lambda-service-role".to_string()
}

fn default_runtime() -> String {
    "python3.9".to_string()
}

fn default_architecture() -> String {
    "x86_64".to_string()
}

fn default_entry_function() -> String {
    "nano_function".to_string()
}

fn default_source_extension() -> String {
    "py".to_string()
}

fn default_function_timeout() -> i32 {
    60
}

fn default_memory_mb() -> i32 {
    512
}

fn default_layers() -> Vec<String> {
    vec!["arn:aws:lambda:us-east-1:123456789012:layer:layer-name:1".to_string()]
}

fn default_helper_modules() -> Vec<String> {
    vec!["assets/nano_helper.py".to_string()]
}

fn default_payload() -> serde_json::Value {
    serde_json::json!({"a": 1, "b": 2})
}

fn default_download_timeout() -> u64 {
    60
}

fn default_page_size() -> u64 {
    20
}

fn default_max_page_size() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
///
/// A missing file yields the defaults.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        warn!("Config file {} not found, using defaults", path.display());
        return Ok(Config::default());
    }
    let contents = std::fs::read_to_string(path)?;
    let config: Config = serde_yaml::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Reject settings that would only fail later, per request.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.pagination.page_size == 0 {
            anyhow::bail!("pagination.page_size must be greater than zero");
        }
        if self.pagination.page_size > self.pagination.max_page_size {
            anyhow::bail!("pagination.page_size exceeds pagination.max_page_size");
        }
        let id_column = &self.storage.id_column;
        if id_column.is_empty() || id_column.contains('"') {
            anyhow::bail!("storage.id_column must be non-empty and must not contain quotes");
        }
        if self.storage.dataset_bucket() == self.storage.page_bucket() {
            anyhow::bail!("dataset and page namespaces must map to different buckets");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.storage.dataset_bucket(), "nano-platform-api-datasets");
        assert_eq!(config.storage.page_bucket(), "nano-platform-api-pages");
        assert_eq!(config.pagination.page_size, 20);
        assert_eq!(config.compute.default_payload, serde_json::json!({"a": 1, "b": 2}));
        assert_eq!(config.compute.timeout_secs, 60);
        assert_eq!(config.compute.memory_mb, 512);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "storage:\n  backend: memory\n  bucket_prefix: acme\n  dataset_suffix: -tables\npagination:\n  page_size: 50\n"
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.storage.backend, "memory");
        assert_eq!(config.storage.dataset_bucket(), "acme-tables");
        assert_eq!(config.storage.page_bucket(), "acme-pages");
        assert_eq!(config.pagination.page_size, 50);
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = load_config("/nonexistent/nanogate.yaml").unwrap();
        assert_eq!(config.storage.id_column, "id");
    }

    #[test]
    fn test_example_file_matches_defaults() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/nanogate.example.yaml");
        let config = load_config(path).unwrap();
        let defaults = Config::default();
        assert_eq!(config.server.cors_origins, defaults.server.cors_origins);
        assert_eq!(config.compute.helper_modules, defaults.compute.helper_modules);
        assert_eq!(config.compute.default_payload, defaults.compute.default_payload);
        assert_eq!(config.storage.page_bucket(), defaults.storage.page_bucket());
        assert_eq!(config.pagination.max_page_size, 1000);
    }

    #[test]
    fn test_validate_rejects_same_buckets() {
        let mut config = Config::default();
        config.storage.page_suffix = config.storage.dataset_suffix.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_quoted_id_column() {
        let mut config = Config::default();
        config.storage.id_column = "i\"d".to_string();
        assert!(config.validate().is_err());
    }
}
