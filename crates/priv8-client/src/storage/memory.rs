//! In-memory storage gateway for testing and offline runs

use super::StorageGateway;
use crate::{
    types::{BucketInfo, FileInfo},
    ClientError, Result,
};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::{mapref::entry::Entry, DashMap};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// An in-memory storage gateway
#[derive(Clone, Default)]
pub struct MemoryStorageGateway {
    buckets: Arc<DashMap<String, BTreeMap<String, Bytes>>>,
    create_calls: Arc<AtomicUsize>,
    reject_uploads: Arc<AtomicBool>,
}

impl MemoryStorageGateway {
    /// Create a new empty gateway
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of create-bucket requests received, successful or not
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Make every subsequent upload fail like a non-2xx gateway response
    pub fn set_reject_uploads(&self, reject: bool) {
        self.reject_uploads.store(reject, Ordering::SeqCst);
    }

    /// Check if a bucket exists
    pub fn has_bucket(&self, bucket: &str) -> bool {
        self.buckets.contains_key(bucket)
    }

    /// Store a raw body directly, bypassing upload checks
    pub fn insert_raw(&self, bucket: &str, name: &str, body: impl Into<Bytes>) {
        self.buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(name.to_string(), body.into());
    }
}

#[async_trait]
impl StorageGateway for MemoryStorageGateway {
    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        match self.buckets.entry(bucket.to_string()) {
            Entry::Occupied(_) => Err(ClientError::BucketAlreadyExists(bucket.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(BTreeMap::new());
                Ok(())
            }
        }
    }

    async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        let mut buckets: Vec<BucketInfo> = self
            .buckets
            .iter()
            .map(|entry| BucketInfo {
                name: entry.key().clone(),
                created_at: None,
            })
            .collect();
        buckets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(buckets)
    }

    async fn upload_file(&self, bucket: &str, name: &str, body: Bytes) -> Result<serde_json::Value> {
        if self.reject_uploads.load(Ordering::SeqCst) {
            return Err(ClientError::UploadFailed("500 Internal Server Error: rejected".to_string()));
        }
        let mut files = self
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| ClientError::UploadFailed(format!("404 Not Found: bucket {} does not exist", bucket)))?;
        let size = body.len();
        files.insert(name.to_string(), body);
        Ok(serde_json::json!({ "Name": name, "Size": size }))
    }

    async fn list_files(&self, bucket: &str) -> Result<Vec<FileInfo>> {
        let files = self.buckets.get(bucket).ok_or_else(|| ClientError::Storage {
            status: 404,
            message: format!("bucket {} does not exist", bucket),
        })?;
        Ok(files
            .iter()
            .map(|(name, body)| FileInfo {
                name: name.clone(),
                size: Some(body.len() as u64),
                root_cid: None,
                created_at: None,
            })
            .collect())
    }

    async fn download_file(&self, bucket: &str, name: &str) -> Result<Bytes> {
        self.buckets
            .get(bucket)
            .and_then(|files| files.get(name).cloned())
            .ok_or_else(|| ClientError::ObjectNotFound {
                bucket: bucket.to_string(),
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bucket_and_file_lifecycle() {
        let store = MemoryStorageGateway::new();
        store.create_bucket("b").await.unwrap();
        assert!(matches!(
            store.create_bucket("b").await,
            Err(ClientError::BucketAlreadyExists(_))
        ));

        store.upload_file("b", "f.json", Bytes::from_static(b"{}")).await.unwrap();
        assert_eq!(store.download_file("b", "f.json").await.unwrap(), Bytes::from_static(b"{}"));
        assert_eq!(store.list_files("b").await.unwrap().len(), 1);
        assert_eq!(store.list_buckets().await.unwrap()[0].name, "b");
    }

    #[tokio::test]
    async fn test_missing_object() {
        let store = MemoryStorageGateway::new();
        let err = store.download_file("nope", "x").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_upload_to_missing_bucket_fails() {
        let store = MemoryStorageGateway::new();
        let err = store.upload_file("nope", "x", Bytes::new()).await.unwrap_err();
        assert!(matches!(err, ClientError::UploadFailed(_)));
    }
}
