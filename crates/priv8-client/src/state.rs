//! Client-side pointer to the most recent upload
//!
//! Not authoritative; the storage gateway's listing is. It only lets a later
//! run find what the previous one uploaded.

use crate::{types::ObjectRef, ClientError, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastUpload {
    pub bucket: String,
    pub last_uploaded_object_name: String,
    pub uploaded_at: DateTime<Utc>,
}

impl LastUpload {
    pub fn object(&self) -> ObjectRef {
        ObjectRef::new(self.bucket.clone(), self.last_uploaded_object_name.clone())
    }
}

/// Last-upload pointer, kept in memory and optionally mirrored to a JSON file
#[derive(Debug, Default)]
pub struct ClientState {
    path: Option<PathBuf>,
    cached: Mutex<Option<LastUpload>>,
}

impl ClientState {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn with_file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            cached: Mutex::new(None),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Remember `object` as the most recent upload
    ///
    /// The in-memory pointer is updated even when mirroring it to the file
    /// fails.
    pub async fn record_upload(&self, object: &ObjectRef) -> Result<()> {
        let record = LastUpload {
            bucket: object.bucket.clone(),
            last_uploaded_object_name: object.name.clone(),
            uploaded_at: Utc::now(),
        };
        *self.cached.lock() = Some(record.clone());

        if let Some(path) = &self.path {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            let body = serde_json::to_vec_pretty(&record).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            let tmp = path.with_extension("tmp");
            tokio::fs::write(&tmp, body).await?;
            tokio::fs::rename(&tmp, path).await?;
            debug!(path = %path.display(), object = %object, "recorded last upload");
        }
        Ok(())
    }

    /// The most recent upload, if any run has recorded one
    pub async fn last_upload(&self) -> Result<Option<LastUpload>> {
        let cached = self.cached.lock().clone();
        if cached.is_some() {
            return Ok(cached);
        }
        let Some(path) = &self.path else {
            return Ok(None);
        };

        let body = match tokio::fs::read(path).await {
            Ok(body) => body,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ClientError::Io(e)),
        };
        let record: LastUpload = serde_json::from_slice(&body)
            .map_err(|e| ClientError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))?;
        *self.cached.lock() = Some(record.clone());
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory() {
        let state = ClientState::in_memory();
        assert!(state.last_upload().await.unwrap().is_none());
        state.record_upload(&ObjectRef::new("b", "n.json")).await.unwrap();
        assert_eq!(state.last_upload().await.unwrap().unwrap().object(), ObjectRef::new("b", "n.json"));
    }

    #[tokio::test]
    async fn test_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        ClientState::with_file(&path)
            .record_upload(&ObjectRef::new("test123", "encrypted_1.json"))
            .await
            .unwrap();

        let reloaded = ClientState::with_file(&path);
        let last = reloaded.last_upload().await.unwrap().unwrap();
        assert_eq!(last.bucket, "test123");
        assert_eq!(last.last_uploaded_object_name, "encrypted_1.json");

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("lastUploadedObjectName"));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"{not json").unwrap();
        assert!(matches!(
            ClientState::with_file(&path).last_upload().await,
            Err(ClientError::Io(_))
        ));
    }
}
