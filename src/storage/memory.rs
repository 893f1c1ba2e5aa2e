//! In-memory blob store.
//!
//! Blobs are held in a `tokio::sync::RwLock<HashMap<...>>` keyed by
//! namespace and name.  Used for local runs without AWS credentials and
//! by the test suite; conditional creates are atomic under the write lock.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::backend::{BlobInfo, BlobStore, Namespace, StoreFuture, StoredBlob};
use crate::errors::UpstreamError;
use crate::pagination::{select_csv_rows, RowWindow};

#[derive(Debug, Clone)]
struct Entry {
    data: Bytes,
    etag: String,
    last_modified: DateTime<Utc>,
}

impl Entry {
    fn new(data: Bytes) -> Self {
        // Store-local tag: length plus a random suffix, unique per write.
        let tag: [u8; 8] = rand::random();
        Self {
            etag: format!("\"{}-{}\"", data.len(), hex::encode(tag)),
            data,
            last_modified: Utc::now(),
        }
    }
}

/// In-memory blob store.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: tokio::sync::RwLock<HashMap<(Namespace, String), Entry>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn exists(&self, namespace: Namespace, name: &str) -> StoreFuture<'_, bool> {
        let key = (namespace, name.to_string());
        Box::pin(async move { Ok(self.blobs.read().await.contains_key(&key)) })
    }

    fn put(&self, namespace: Namespace, name: &str, data: Bytes) -> StoreFuture<'_, ()> {
        let key = (namespace, name.to_string());
        Box::pin(async move {
            self.blobs.write().await.insert(key, Entry::new(data));
            Ok(())
        })
    }

    fn put_new(&self, namespace: Namespace, name: &str, data: Bytes) -> StoreFuture<'_, ()> {
        let key = (namespace, name.to_string());
        Box::pin(async move {
            let mut blobs = self.blobs.write().await;
            if blobs.contains_key(&key) {
                return Err(UpstreamError::AlreadyExists);
            }
            blobs.insert(key, Entry::new(data));
            Ok(())
        })
    }

    fn get(&self, namespace: Namespace, name: &str) -> StoreFuture<'_, StoredBlob> {
        let key = (namespace, name.to_string());
        Box::pin(async move {
            let blobs = self.blobs.read().await;
            let entry = blobs.get(&key).ok_or(UpstreamError::NotFound)?;
            Ok(StoredBlob {
                data: entry.data.clone(),
                content_type: None,
                etag: Some(entry.etag.clone()),
                last_modified: Some(entry.last_modified),
            })
        })
    }

    fn list(&self, namespace: Namespace) -> StoreFuture<'_, Vec<BlobInfo>> {
        Box::pin(async move {
            let blobs = self.blobs.read().await;
            let mut listing: Vec<BlobInfo> = blobs
                .iter()
                .filter(|((ns, _), _)| *ns == namespace)
                .map(|((_, name), entry)| BlobInfo {
                    name: name.clone(),
                    modified_at: entry.last_modified,
                    size: entry.data.len() as u64,
                    etag: Some(entry.etag.clone()),
                    storage_class: Some("STANDARD".to_string()),
                })
                .collect();
            // Match S3's lexicographic key order.
            listing.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(listing)
        })
    }

    fn delete(&self, namespace: Namespace, name: &str) -> StoreFuture<'_, ()> {
        let key = (namespace, name.to_string());
        Box::pin(async move {
            self.blobs.write().await.remove(&key);
            Ok(())
        })
    }

    fn select_rows(
        &self,
        namespace: Namespace,
        name: &str,
        window: RowWindow,
        id_column: &str,
    ) -> StoreFuture<'_, Vec<String>> {
        let key = (namespace, name.to_string());
        let id_column = id_column.to_string();
        Box::pin(async move {
            let data = {
                let blobs = self.blobs.read().await;
                blobs.get(&key).ok_or(UpstreamError::NotFound)?.data.clone()
            };
            let content = String::from_utf8_lossy(&data);
            Ok(select_csv_rows(&content, window, &id_column))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered_csv(n: i64) -> Bytes {
        let mut csv = String::from("id,value\n");
        for id in 1..=n {
            csv.push_str(&format!("{id},v{id}\n"));
        }
        Bytes::from(csv)
    }

    #[tokio::test]
    async fn test_exists_before_and_after_put() {
        let store = MemoryBlobStore::new();
        assert!(!store.exists(Namespace::Dataset, "a.csv").await.unwrap());
        store
            .put_new(Namespace::Dataset, "a.csv", Bytes::from("id\n1\n"))
            .await
            .unwrap();
        assert!(store.exists(Namespace::Dataset, "a.csv").await.unwrap());
        // Namespaces are independent.
        assert!(!store.exists(Namespace::Page, "a.csv").await.unwrap());
    }

    #[tokio::test]
    async fn test_put_and_get_roundtrip() {
        let store = MemoryBlobStore::new();
        let data = Bytes::from_static(b"\x00binary\xffpayload");
        store
            .put(Namespace::Page, "home.yaml", data.clone())
            .await
            .unwrap();
        let blob = store.get(Namespace::Page, "home.yaml").await.unwrap();
        assert_eq!(blob.data, data);
        assert!(blob.etag.is_some());
        assert!(blob.last_modified.is_some());
    }

    #[tokio::test]
    async fn test_put_new_refuses_overwrite() {
        let store = MemoryBlobStore::new();
        store
            .put_new(Namespace::Dataset, "a.csv", Bytes::from("first"))
            .await
            .unwrap();
        let err = store
            .put_new(Namespace::Dataset, "a.csv", Bytes::from("second"))
            .await
            .unwrap_err();
        assert_eq!(err, UpstreamError::AlreadyExists);
        let blob = store.get(Namespace::Dataset, "a.csv").await.unwrap();
        assert_eq!(blob.data, Bytes::from("first"));
    }

    #[tokio::test]
    async fn test_put_empty() {
        let store = MemoryBlobStore::new();
        store.put_empty(Namespace::Dataset, "empty.csv").await.unwrap();
        let blob = store.get(Namespace::Dataset, "empty.csv").await.unwrap();
        assert!(blob.data.is_empty());
        assert!(store.put_empty(Namespace::Dataset, "empty.csv").await.is_err());
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = MemoryBlobStore::new();
        let err = store.get(Namespace::Dataset, "nope").await.unwrap_err();
        assert_eq!(err, UpstreamError::NotFound);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryBlobStore::new();
        store.delete(Namespace::Dataset, "ghost.csv").await.unwrap();
        store
            .put(Namespace::Dataset, "a.csv", Bytes::from("x"))
            .await
            .unwrap();
        store.delete(Namespace::Dataset, "a.csv").await.unwrap();
        store.delete(Namespace::Dataset, "a.csv").await.unwrap();
        assert!(!store.exists(Namespace::Dataset, "a.csv").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_is_sorted_and_scoped() {
        let store = MemoryBlobStore::new();
        for name in ["b.csv", "a.csv", "c.csv"] {
            store
                .put(Namespace::Dataset, name, Bytes::from("12345"))
                .await
                .unwrap();
        }
        store
            .put(Namespace::Page, "p.yaml", Bytes::from("k: v"))
            .await
            .unwrap();

        let listing = store.list(Namespace::Dataset).await.unwrap();
        let names: Vec<_> = listing.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["a.csv", "b.csv", "c.csv"]);
        assert!(listing.iter().all(|b| b.size == 5));

        assert!(store.list(Namespace::Page).await.unwrap().len() == 1);
    }

    #[tokio::test]
    async fn test_select_rows_window() {
        let store = MemoryBlobStore::new();
        store
            .put(Namespace::Dataset, "a.csv", numbered_csv(50))
            .await
            .unwrap();

        let rows = store
            .select_rows(Namespace::Dataset, "a.csv", RowWindow::new(10, 20), "id")
            .await
            .unwrap();
        assert_eq!(rows.len(), 19);
        assert_eq!(rows.first().unwrap(), "11,v11");
        assert_eq!(rows.last().unwrap(), "29,v29");

        let rows = store
            .select_rows(Namespace::Dataset, "a.csv", RowWindow::new(1000, 20), "id")
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_select_rows_missing_blob() {
        let store = MemoryBlobStore::new();
        let err = store
            .select_rows(Namespace::Dataset, "nope.csv", RowWindow::new(0, 20), "id")
            .await
            .unwrap_err();
        assert_eq!(err, UpstreamError::NotFound);
    }
}
