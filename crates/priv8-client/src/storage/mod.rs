//! Bucket/object storage gateway
//!
//! The gateway is an opaque external REST service. [`HttpStorageGateway`]
//! talks to it over HTTP; [`MemoryStorageGateway`] keeps everything in
//! process for tests and offline runs.

mod http;
mod memory;

pub use http::HttpStorageGateway;
pub use memory::MemoryStorageGateway;

use crate::{
    types::{BucketInfo, FileInfo},
    Result,
};
use async_trait::async_trait;
use bytes::Bytes;

/// Operations the orchestrator needs from the storage gateway
#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// Create a bucket
    ///
    /// Fails with [`crate::ClientError::BucketAlreadyExists`] if it exists.
    async fn create_bucket(&self, bucket: &str) -> Result<()>;

    /// List all buckets
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>>;

    /// Upload `body` as `name` into `bucket`, returning the gateway's
    /// description of the stored file
    async fn upload_file(&self, bucket: &str, name: &str, body: Bytes) -> Result<serde_json::Value>;

    /// List files in a bucket
    async fn list_files(&self, bucket: &str) -> Result<Vec<FileInfo>>;

    /// Download a file's raw body
    async fn download_file(&self, bucket: &str, name: &str) -> Result<Bytes>;
}
