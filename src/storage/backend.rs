//! Abstract blob store trait.
//!
//! Every storage backend must implement [`BlobStore`].  Blobs are
//! addressed by a [`Namespace`] and a name; the backend decides which
//! physical collection a namespace maps to.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::errors::UpstreamError;
use crate::pagination::RowWindow;

/// Result type of every blob store operation.
pub type StoreResult<T> = Result<T, UpstreamError>;

/// Boxed future returned by [`BlobStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'a>>;

/// Logical grouping of blobs, each backed by its own collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Dataset,
    Page,
}

impl Namespace {
    /// Human-facing label used in messages.
    pub fn label(&self) -> &'static str {
        match self {
            Namespace::Dataset => "Dataset",
            Namespace::Page => "Page",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Namespace::Dataset => f.write_str("datasets"),
            Namespace::Page => f.write_str("pages"),
        }
    }
}

/// Listing entry for one blob, in the store's native detail.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BlobInfo {
    #[serde(rename = "Key")]
    pub name: String,
    #[serde(rename = "LastModified")]
    pub modified_at: DateTime<Utc>,
    pub size: u64,
    #[serde(rename = "ETag", skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
}

/// A fetched blob and its metadata.
#[derive(Debug, Clone)]
pub struct StoredBlob {
    /// Raw bytes of the blob.
    pub data: Bytes,
    /// Content type recorded by the store, if any.
    pub content_type: Option<String>,
    /// Entity tag recorded by the store, if any.
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Async blob storage contract.
pub trait BlobStore: Send + Sync + 'static {
    /// Check whether `name` exists.  Not-found is `Ok(false)`; any other
    /// failure is returned classified.
    fn exists(&self, namespace: Namespace, name: &str) -> StoreFuture<'_, bool>;

    /// Unconditionally write `data` to `name`, replacing any previous blob.
    fn put(&self, namespace: Namespace, name: &str, data: Bytes) -> StoreFuture<'_, ()>;

    /// Write `data` to `name` only if no blob exists there yet.
    ///
    /// Fails with [`UpstreamError::AlreadyExists`] otherwise.
    fn put_new(&self, namespace: Namespace, name: &str, data: Bytes) -> StoreFuture<'_, ()>;

    /// Create a zero-length blob at `name`, failing if it exists.
    fn put_empty(&self, namespace: Namespace, name: &str) -> StoreFuture<'_, ()> {
        self.put_new(namespace, name, Bytes::new())
    }

    /// Read the full blob at `name`.
    fn get(&self, namespace: Namespace, name: &str) -> StoreFuture<'_, StoredBlob>;

    /// List every blob in `namespace`.
    fn list(&self, namespace: Namespace) -> StoreFuture<'_, Vec<BlobInfo>>;

    /// Delete `name`; deleting an absent blob succeeds.
    fn delete(&self, namespace: Namespace, name: &str) -> StoreFuture<'_, ()>;

    /// Return the CSV data rows of `name` whose `id_column` falls in `window`.
    fn select_rows(
        &self,
        namespace: Namespace,
        name: &str,
        window: RowWindow,
        id_column: &str,
    ) -> StoreFuture<'_, Vec<String>>;
}
