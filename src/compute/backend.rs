//! Abstract compute service trait.
//!
//! Every compute backend must implement [`ComputeService`].  Functions
//! are addressed by name; their code travels as a zip archive.

use bytes::Bytes;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use crate::archive::extract_text;
use crate::errors::UpstreamError;

/// Result type of every compute operation.
pub type ComputeResult<T> = Result<T, UpstreamError>;

/// Boxed future returned by [`ComputeService`] methods.
pub type ComputeFuture<'a, T> = Pin<Box<dyn Future<Output = ComputeResult<T>> + Send + 'a>>;

/// Everything needed to register a new function.
#[derive(Debug, Clone)]
pub struct FunctionSpec {
    pub name: String,
    /// Zip archive holding the function source and helper modules.
    pub archive: Bytes,
    /// Entry point, `{module}.{function}`.
    pub handler: String,
    pub runtime: String,
    pub architecture: String,
    pub role: String,
    pub description: String,
    pub timeout_secs: i32,
    pub memory_mb: i32,
    pub layers: Vec<String>,
    /// Environment variables visible to the function.
    pub environment: HashMap<String, String>,
}

/// Configuration of a registered function.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<i32>,
    pub code_size: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub environment: HashMap<String, String>,
}

/// Outcome of [`ComputeService::create`].
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    Created(FunctionInfo),
    /// A function with that name was already registered; nothing changed.
    AlreadyExists,
}

/// Result of a synchronous invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Invocation {
    /// Status code reported by the service for the invoke call itself.
    pub status_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_version: Option<String>,
    /// Set when the function raised; `payload` then describes the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_error: Option<String>,
    /// Decoded response body; non-JSON output is kept as a string.
    #[serde(skip)]
    pub payload: serde_json::Value,
}

/// Decode an invocation response body.
pub fn decode_payload(raw: &[u8]) -> serde_json::Value {
    if raw.is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_slice(raw)
        .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(raw).into_owned()))
}

/// Async function execution contract.
pub trait ComputeService: Send + Sync + 'static {
    /// List every registered function.
    fn list(&self) -> ComputeFuture<'_, Vec<FunctionInfo>>;

    /// Check whether `name` is registered.
    fn exists(&self, name: &str) -> ComputeFuture<'_, bool>;

    /// Register a function unless one with the same name exists.
    fn create(&self, spec: FunctionSpec) -> ComputeFuture<'_, CreateOutcome>;

    /// Invoke `name` synchronously with `payload`.  `None` if absent.
    fn invoke(&self, name: &str, payload: serde_json::Value)
        -> ComputeFuture<'_, Option<Invocation>>;

    /// Delete `name`.  `None` if absent.
    fn delete(&self, name: &str) -> ComputeFuture<'_, Option<()>>;

    /// Download the packaged code archive of `name`.  `None` if absent.
    fn fetch_code_archive(&self, name: &str) -> ComputeFuture<'_, Option<Bytes>>;

    /// Fetch the archive of `name` and unpack the single member `member`.
    ///
    /// `None` if the function or the member does not exist.
    fn fetch_source(&self, name: &str, member: &str) -> ComputeFuture<'_, Option<String>> {
        let name = name.to_string();
        let member = member.to_string();
        Box::pin(async move {
            let Some(archive) = self.fetch_code_archive(&name).await? else {
                return Ok(None);
            };
            extract_text(&archive, &member)
                .map_err(|e| UpstreamError::Rejected(format!("code archive of {name}: {e:#}")))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_payload_json() {
        assert_eq!(decode_payload(br#"{"sum": 3}"#), serde_json::json!({"sum": 3}));
    }

    #[test]
    fn test_decode_payload_text_and_empty() {
        assert_eq!(
            decode_payload(b"plain text"),
            serde_json::Value::String("plain text".into())
        );
        assert_eq!(decode_payload(b""), serde_json::Value::Null);
    }
}
