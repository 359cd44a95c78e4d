//! HTTP storage gateway client

use super::StorageGateway;
use crate::{
    types::{ApiResponse, BucketInfo, FileInfo},
    ClientError, Config, Result,
};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, multipart, Client, Response, StatusCode};
use tracing::{debug, instrument};
use url::Url;

/// Storage gateway reached over HTTP
#[derive(Clone, Debug)]
pub struct HttpStorageGateway {
    endpoint: Url,
    http: Client,
}

impl HttpStorageGateway {
    /// Create a client for `config.storage_endpoint`
    pub fn new(config: &Config) -> Result<Self> {
        let endpoint = Url::parse(&config.storage_endpoint)
            .map_err(|e| ClientError::Config(format!("invalid storage endpoint: {}", e)))?;
        if endpoint.cannot_be_a_base() {
            return Err(ClientError::Config(format!(
                "storage endpoint cannot be a base URL: {}",
                endpoint
            )));
        }

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            config
                .user_agent
                .parse()
                .map_err(|_| ClientError::Config("invalid user agent".to_string()))?,
        );

        let http = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(ClientError::Http)?;

        Ok(Self { endpoint, http })
    }

    /// Create with endpoint URL and otherwise default configuration
    pub fn with_endpoint(endpoint: &str) -> Result<Self> {
        Self::new(&Config::new(endpoint))
    }

    // Segments are percent-encoded individually.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response> {
        request.send().await.map_err(ClientError::from_transport)
    }

    async fn read_error(response: Response) -> (StatusCode, String) {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        (status, text)
    }
}

#[async_trait]
impl StorageGateway for HttpStorageGateway {
    #[instrument(skip(self))]
    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        let url = self.url(&["buckets"]);
        debug!("Sending POST request to {}", url);
        let response = self
            .send(self.http.post(url).json(&serde_json::json!({ "bucketName": bucket })))
            .await?;

        if response.status().is_success() {
            return Ok(());
        }
        let (status, message) = Self::read_error(response).await;
        if status == StatusCode::CONFLICT || message.to_ascii_lowercase().contains("already exists") {
            return Err(ClientError::BucketAlreadyExists(bucket.to_string()));
        }
        Err(ClientError::Storage {
            status: status.as_u16(),
            message,
        })
    }

    #[instrument(skip(self))]
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        let url = self.url(&["buckets"]);
        debug!("Sending GET request to {}", url);
        let response = self.send(self.http.get(url)).await?;

        if !response.status().is_success() {
            let (status, message) = Self::read_error(response).await;
            return Err(ClientError::Storage {
                status: status.as_u16(),
                message,
            });
        }
        let body: ApiResponse<Option<Vec<BucketInfo>>> = response
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
        Ok(body.data.unwrap_or_default())
    }

    #[instrument(skip(self, body), fields(size = body.len()))]
    async fn upload_file(&self, bucket: &str, name: &str, body: Bytes) -> Result<serde_json::Value> {
        let url = self.url(&["buckets", bucket, "files"]);
        let part = multipart::Part::bytes(body.to_vec())
            .file_name(name.to_string())
            .mime_str("application/json")
            .map_err(ClientError::Http)?;
        let form = multipart::Form::new().part("file", part);

        debug!("Sending POST request to {}", url);
        let response = self.send(self.http.post(url).multipart(form)).await?;

        if !response.status().is_success() {
            let (status, message) = Self::read_error(response).await;
            return Err(ClientError::UploadFailed(format!("{}: {}", status, message)));
        }
        let body: ApiResponse<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
        Ok(body.data)
    }

    #[instrument(skip(self))]
    async fn list_files(&self, bucket: &str) -> Result<Vec<FileInfo>> {
        let url = self.url(&["buckets", bucket, "files"]);
        debug!("Sending GET request to {}", url);
        let response = self.send(self.http.get(url)).await?;

        if !response.status().is_success() {
            let (status, message) = Self::read_error(response).await;
            return Err(ClientError::Storage {
                status: status.as_u16(),
                message,
            });
        }
        let body: ApiResponse<Option<Vec<FileInfo>>> = response
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
        Ok(body.data.unwrap_or_default())
    }

    #[instrument(skip(self))]
    async fn download_file(&self, bucket: &str, name: &str) -> Result<Bytes> {
        let url = self.url(&["buckets", bucket, "files", name, "download"]);
        debug!("Sending GET request to {}", url);
        let response = self.send(self.http.get(url)).await?;

        match response.status() {
            status if status.is_success() => Ok(response.bytes().await?),
            StatusCode::NOT_FOUND => Err(ClientError::ObjectNotFound {
                bucket: bucket.to_string(),
                name: name.to_string(),
            }),
            _ => {
                let (status, message) = Self::read_error(response).await;
                Err(ClientError::Storage {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }
}
