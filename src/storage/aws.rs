//! AWS S3 gateway blob store.
//!
//! Each namespace maps to its own upstream bucket:
//!   Datasets: `{bucket_prefix}{dataset_suffix}`
//!   Pages:    `{bucket_prefix}{page_suffix}`
//!
//! Blob names are used as object keys unchanged.  Pagination is pushed
//! down to S3 Select so only the requested rows leave the bucket.
//!
//! Credentials are resolved via the standard AWS credential chain
//! (env vars, `~/.aws/credentials`, IAM role, etc.) unless explicit keys
//! are configured.

use std::time::Duration;

use aws_config::timeout::TimeoutConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    CompressionType, CsvInput, CsvOutput, ExpressionType, FileHeaderInfo, InputSerialization,
    OutputSerialization, SelectObjectContentEventStream,
};
use aws_sdk_s3::Client;
use aws_smithy_types::error::display::DisplayErrorContext;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::backend::{BlobInfo, BlobStore, Namespace, StoreFuture, StoredBlob};
use crate::config::StorageConfig;
use crate::errors::{classify_sdk_error, UpstreamError};
use crate::metrics::record_upstream_call;
use crate::pagination::{RecordAssembler, RowWindow};

/// Blob store that forwards operations to AWS S3.
pub struct S3BlobStore {
    /// AWS S3 SDK client.
    client: Client,
    /// Bucket backing [`Namespace::Dataset`].
    dataset_bucket: String,
    /// Bucket backing [`Namespace::Page`].
    page_bucket: String,
}

impl S3BlobStore {
    /// Create a new S3 blob store from the storage configuration.
    ///
    /// Every call made by the client is bounded by
    /// `operation_timeout_secs`.
    pub async fn new(config: &StorageConfig) -> anyhow::Result<Self> {
        let timeouts = TimeoutConfig::builder()
            .operation_timeout(Duration::from_secs(config.operation_timeout_secs))
            .build();

        let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .timeout_config(timeouts);

        if !config.endpoint_url.is_empty() {
            config_loader = config_loader.endpoint_url(&config.endpoint_url);
        }

        // If explicit credentials are provided, inject them as static credentials.
        if !config.access_key_id.is_empty() && !config.secret_access_key.is_empty() {
            let creds = aws_sdk_s3::config::Credentials::new(
                &config.access_key_id,
                &config.secret_access_key,
                None, // session_token
                None, // expiry
                "nanogate-config",
            );
            config_loader = config_loader.credentials_provider(creds);
        }

        let sdk_config = config_loader.load().await;

        let s3_config_builder =
            aws_sdk_s3::config::Builder::from(&sdk_config).force_path_style(config.use_path_style);

        let client = Client::from_conf(s3_config_builder.build());

        let store = Self {
            client,
            dataset_bucket: config.dataset_bucket(),
            page_bucket: config.page_bucket(),
        };

        info!(
            "S3 blob store initialized: datasets={} pages={}",
            store.dataset_bucket, store.page_bucket
        );

        Ok(store)
    }

    /// Map a namespace to its upstream bucket.
    fn bucket(&self, namespace: Namespace) -> &str {
        match namespace {
            Namespace::Dataset => &self.dataset_bucket,
            Namespace::Page => &self.page_bucket,
        }
    }

    async fn put_object(
        &self,
        operation: &'static str,
        namespace: Namespace,
        name: &str,
        data: Bytes,
        only_if_absent: bool,
    ) -> Result<(), UpstreamError> {
        let bucket = self.bucket(namespace);
        debug!(
            "S3 put_object: bucket={} key={} size={} if_absent={}",
            bucket,
            name,
            data.len(),
            only_if_absent
        );

        let mut req = self
            .client
            .put_object()
            .bucket(bucket)
            .key(name)
            .body(ByteStream::from(data));
        if only_if_absent {
            req = req.if_none_match("*");
        }

        let result = req
            .send()
            .await
            .map(|_| ())
            .map_err(|e| classify_sdk_error(operation, e));
        record_upstream_call("s3", operation, &result);
        result
    }
}

/// Convert an SDK timestamp to chrono.
fn to_chrono(dt: &aws_smithy_types::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
}

impl BlobStore for S3BlobStore {
    fn exists(&self, namespace: Namespace, name: &str) -> StoreFuture<'_, bool> {
        let name = name.to_string();
        Box::pin(async move {
            let bucket = self.bucket(namespace);
            debug!("S3 head_object: bucket={} key={}", bucket, name);

            let result = match self
                .client
                .head_object()
                .bucket(bucket)
                .key(&name)
                .send()
                .await
            {
                Ok(_) => Ok(true),
                Err(e) => match classify_sdk_error("head_object", e) {
                    UpstreamError::NotFound => Ok(false),
                    other => Err(other),
                },
            };
            record_upstream_call("s3", "head_object", &result);
            result
        })
    }

    fn put(&self, namespace: Namespace, name: &str, data: Bytes) -> StoreFuture<'_, ()> {
        let name = name.to_string();
        Box::pin(async move {
            self.put_object("put_object", namespace, &name, data, false)
                .await
        })
    }

    fn put_new(&self, namespace: Namespace, name: &str, data: Bytes) -> StoreFuture<'_, ()> {
        let name = name.to_string();
        Box::pin(async move {
            self.put_object("put_object_if_absent", namespace, &name, data, true)
                .await
        })
    }

    fn get(&self, namespace: Namespace, name: &str) -> StoreFuture<'_, StoredBlob> {
        let name = name.to_string();
        Box::pin(async move {
            let bucket = self.bucket(namespace);
            debug!("S3 get_object: bucket={} key={}", bucket, name);

            let result: Result<StoredBlob, UpstreamError> = async {
                let resp = self
                    .client
                    .get_object()
                    .bucket(bucket)
                    .key(&name)
                    .send()
                    .await
                    .map_err(|e| classify_sdk_error("get_object", e))?;

                let content_type = resp.content_type().map(str::to_string);
                let etag = resp.e_tag().map(str::to_string);
                let last_modified = resp.last_modified().and_then(to_chrono);

                let data = resp
                    .body
                    .collect()
                    .await
                    .map_err(|e| UpstreamError::Transient(format!("get_object body: {e}")))?
                    .into_bytes();

                Ok(StoredBlob {
                    data,
                    content_type,
                    etag,
                    last_modified,
                })
            }
            .await;
            record_upstream_call("s3", "get_object", &result);
            result
        })
    }

    fn list(&self, namespace: Namespace) -> StoreFuture<'_, Vec<BlobInfo>> {
        Box::pin(async move {
            let bucket = self.bucket(namespace);
            debug!("S3 list_objects_v2: bucket={}", bucket);

            let result: Result<Vec<BlobInfo>, UpstreamError> = async {
                let mut blobs = Vec::new();
                let mut continuation_token: Option<String> = None;
                loop {
                    let resp = self
                        .client
                        .list_objects_v2()
                        .bucket(bucket)
                        .set_continuation_token(continuation_token.take())
                        .send()
                        .await
                        .map_err(|e| classify_sdk_error("list_objects_v2", e))?;

                    for obj in resp.contents() {
                        let Some(key) = obj.key() else { continue };
                        blobs.push(BlobInfo {
                            name: key.to_string(),
                            modified_at: obj
                                .last_modified()
                                .and_then(to_chrono)
                                .unwrap_or_default(),
                            size: obj.size().unwrap_or(0).max(0) as u64,
                            etag: obj.e_tag().map(str::to_string),
                            storage_class: obj.storage_class().map(|c| c.as_str().to_string()),
                        });
                    }

                    if resp.is_truncated() == Some(true) {
                        continuation_token = resp.next_continuation_token().map(str::to_string);
                        if continuation_token.is_none() {
                            break;
                        }
                    } else {
                        break;
                    }
                }
                Ok(blobs)
            }
            .await;
            record_upstream_call("s3", "list_objects_v2", &result);
            result
        })
    }

    fn delete(&self, namespace: Namespace, name: &str) -> StoreFuture<'_, ()> {
        let name = name.to_string();
        Box::pin(async move {
            let bucket = self.bucket(namespace);
            debug!("S3 delete_object: bucket={} key={}", bucket, name);

            // S3 delete_object is idempotent -- no error for missing keys.
            let result = match self
                .client
                .delete_object()
                .bucket(bucket)
                .key(&name)
                .send()
                .await
            {
                Ok(_) => Ok(()),
                Err(e) => match classify_sdk_error("delete_object", e) {
                    UpstreamError::NotFound => Ok(()),
                    other => Err(other),
                },
            };
            record_upstream_call("s3", "delete_object", &result);
            result
        })
    }

    fn select_rows(
        &self,
        namespace: Namespace,
        name: &str,
        window: RowWindow,
        id_column: &str,
    ) -> StoreFuture<'_, Vec<String>> {
        let name = name.to_string();
        let expression = window.select_expression(id_column);
        Box::pin(async move {
            let bucket = self.bucket(namespace);
            debug!(
                "S3 select_object_content: bucket={} key={} expression={}",
                bucket, name, expression
            );

            let result: Result<Vec<String>, UpstreamError> = async {
                let input = InputSerialization::builder()
                    .csv(
                        CsvInput::builder()
                            .file_header_info(FileHeaderInfo::Use)
                            .build(),
                    )
                    .compression_type(CompressionType::None)
                    .build();
                let output = OutputSerialization::builder()
                    .csv(CsvOutput::builder().build())
                    .build();

                let mut resp = self
                    .client
                    .select_object_content()
                    .bucket(bucket)
                    .key(&name)
                    .expression(expression)
                    .expression_type(ExpressionType::Sql)
                    .input_serialization(input)
                    .output_serialization(output)
                    .send()
                    .await
                    .map_err(|e| classify_sdk_error("select_object_content", e))?;

                let mut assembler = RecordAssembler::new();
                while let Some(event) = resp.payload.recv().await.map_err(|e| {
                    UpstreamError::Transient(format!(
                        "select_object_content stream: {}",
                        DisplayErrorContext(&e)
                    ))
                })? {
                    if let SelectObjectContentEventStream::Records(records) = event {
                        if let Some(payload) = records.payload() {
                            assembler.push(payload.as_ref());
                        }
                    }
                }
                Ok(assembler.finish())
            }
            .await;
            record_upstream_call("s3", "select_object_content", &result);
            result
        })
    }
}

// -- Tests -------------------------------------------------------------------
