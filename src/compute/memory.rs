//! In-memory compute service.
//!
//! Registered functions are kept with their archive.  Invocation does not
//! execute any code: it echoes the function name and the event back,
//! which is enough to exercise the HTTP surface locally and in tests.

use bytes::Bytes;
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;

use super::backend::{
    ComputeFuture, ComputeService, CreateOutcome, FunctionInfo, FunctionSpec, Invocation,
};

#[derive(Debug, Clone)]
struct Registered {
    info: FunctionInfo,
    archive: Bytes,
}

/// In-memory compute service.
#[derive(Default)]
pub struct MemoryComputeService {
    functions: tokio::sync::RwLock<HashMap<String, Registered>>,
}

impl MemoryComputeService {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ComputeService for MemoryComputeService {
    fn list(&self) -> ComputeFuture<'_, Vec<FunctionInfo>> {
        Box::pin(async move {
            let functions = self.functions.read().await;
            let mut listing: Vec<FunctionInfo> =
                functions.values().map(|r| r.info.clone()).collect();
            listing.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(listing)
        })
    }

    fn exists(&self, name: &str) -> ComputeFuture<'_, bool> {
        let name = name.to_string();
        Box::pin(async move { Ok(self.functions.read().await.contains_key(&name)) })
    }

    fn create(&self, spec: FunctionSpec) -> ComputeFuture<'_, CreateOutcome> {
        Box::pin(async move {
            let mut functions = self.functions.write().await;
            if functions.contains_key(&spec.name) {
                return Ok(CreateOutcome::AlreadyExists);
            }
            let info = FunctionInfo {
                name: spec.name.clone(),
                arn: Some(format!("arn:memory:function:{}", spec.name)),
                runtime: Some(spec.runtime),
                handler: Some(spec.handler),
                memory_mb: Some(spec.memory_mb),
                timeout_secs: Some(spec.timeout_secs),
                code_size: spec.archive.len() as i64,
                last_modified: Some(Utc::now().to_rfc3339()),
                environment: spec.environment,
            };
            functions.insert(
                spec.name,
                Registered {
                    info: info.clone(),
                    archive: spec.archive,
                },
            );
            Ok(CreateOutcome::Created(info))
        })
    }

    fn invoke(
        &self,
        name: &str,
        payload: serde_json::Value,
    ) -> ComputeFuture<'_, Option<Invocation>> {
        let name = name.to_string();
        Box::pin(async move {
            if !self.functions.read().await.contains_key(&name) {
                return Ok(None);
            }
            Ok(Some(Invocation {
                status_code: 200,
                executed_version: Some("1".to_string()),
                function_error: None,
                payload: json!({ "function": name, "event": payload }),
            }))
        })
    }

    fn delete(&self, name: &str) -> ComputeFuture<'_, Option<()>> {
        let name = name.to_string();
        Box::pin(async move { Ok(self.functions.write().await.remove(&name).map(|_| ())) })
    }

    fn fetch_code_archive(&self, name: &str) -> ComputeFuture<'_, Option<Bytes>> {
        let name = name.to_string();
        Box::pin(async move {
            Ok(self
                .functions
                .read()
                .await
                .get(&name)
                .map(|r| r.archive.clone()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{build_archive, ArchiveMember};

    fn spec(name: &str) -> FunctionSpec {
        let archive = build_archive(&[
            ArchiveMember::new(format!("{name}.py"), "def nano_function(e, c):\n    return e\n"),
            ArchiveMember::new("nano_helper.py", "HELPER = 1\n"),
        ])
        .unwrap();
        FunctionSpec {
            name: name.to_string(),
            archive,
            handler: format!("{name}.nano_function"),
            runtime: "python3.9".to_string(),
            architecture: "x86_64".to_string(),
            role: String::new(),
            description: String::new(),
            timeout_secs: 60,
            memory_mb: 512,
            layers: Vec::new(),
            environment: HashMap::from([(
                "NANOGATE_DATASET_BUCKET".to_string(),
                "acme-datasets".to_string(),
            )]),
        }
    }

    #[tokio::test]
    async fn test_create_then_conflict() {
        let compute = MemoryComputeService::new();
        let outcome = compute.create(spec("adder")).await.unwrap();
        let CreateOutcome::Created(info) = outcome else {
            panic!("expected Created");
        };
        assert_eq!(info.handler.as_deref(), Some("adder.nano_function"));
        assert!(info.code_size > 0);
        assert_eq!(info.environment["NANOGATE_DATASET_BUCKET"], "acme-datasets");

        assert_eq!(
            compute.create(spec("adder")).await.unwrap(),
            CreateOutcome::AlreadyExists
        );
        assert_eq!(compute.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invoke_echoes_event() {
        let compute = MemoryComputeService::new();
        compute.create(spec("adder")).await.unwrap();
        let inv = compute
            .invoke("adder", json!({"a": 1, "b": 2}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(inv.status_code, 200);
        assert_eq!(inv.payload["function"], "adder");
        assert_eq!(inv.payload["event"], json!({"a": 1, "b": 2}));
    }

    #[tokio::test]
    async fn test_unknown_function_is_absent() {
        let compute = MemoryComputeService::new();
        assert!(!compute.exists("ghost").await.unwrap());
        assert!(compute.invoke("ghost", json!({})).await.unwrap().is_none());
        assert!(compute.delete("ghost").await.unwrap().is_none());
        assert!(compute.fetch_code_archive("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fetch_source_from_archive() {
        let compute = MemoryComputeService::new();
        compute.create(spec("adder")).await.unwrap();
        let source = compute.fetch_source("adder", "adder.py").await.unwrap();
        assert!(source.unwrap().contains("nano_function"));
        assert!(compute
            .fetch_source("adder", "missing.py")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_delete_removes() {
        let compute = MemoryComputeService::new();
        compute.create(spec("adder")).await.unwrap();
        assert_eq!(compute.delete("adder").await.unwrap(), Some(()));
        assert!(compute.list().await.unwrap().is_empty());
    }
}
