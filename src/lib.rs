//! nanogate library: an HTTP gateway for datasets, pages and functions.
//!
//! Datasets (CSV) and pages (YAML) are stored as named blobs in an object
//! store; functions are packaged into zip archives and registered with a
//! function-execution service.  Both services sit behind traits with an
//! AWS gateway implementation and an in-memory one.

use std::sync::Arc;

pub mod archive;
pub mod compute;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod highlight;
pub mod metrics;
pub mod pagination;
pub mod server;
pub mod storage;

use crate::compute::backend::ComputeService;
use crate::config::Config;
use crate::highlight::Highlighter;
use crate::storage::backend::BlobStore;

/// Shared application state passed to all handlers via `axum::extract::State`.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Blob store for datasets and pages (S3 or in-memory).
    pub store: Arc<dyn BlobStore>,
    /// Function-execution service (Lambda or in-memory).
    pub compute: Arc<dyn ComputeService>,
    /// Syntax highlighter for function source.
    pub highlighter: Highlighter,
}
