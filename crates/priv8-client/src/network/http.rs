//! Key network relay reached over HTTP

use super::{
    DecryptRequest, DecryptResponse, EncryptRequest, EncryptResponse, KeyNetwork, NetworkInfo,
    NodeErrorBody, SessionSigsRequest, SessionSigsResponse,
};
use crate::{ClientError, Config, Result};
use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockhashResponse {
    blockhash: String,
}

/// JSON client for a key network relay
#[derive(Clone, Debug)]
pub struct HttpKeyNetwork {
    endpoint: Url,
    network: String,
    http: Client,
}

impl HttpKeyNetwork {
    /// Create a client for `config.network_endpoint`
    pub fn new(config: &Config) -> Result<Self> {
        let endpoint = Url::parse(&config.network_endpoint)
            .map_err(|e| ClientError::Config(format!("invalid network endpoint: {}", e)))?;
        if endpoint.cannot_be_a_base() {
            return Err(ClientError::Config(format!(
                "network endpoint cannot be a base URL: {}",
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
        headers.insert(
            "x-lit-network",
            config
                .network
                .parse()
                .map_err(|_| ClientError::Config("invalid network name".to_string()))?,
        );

        let http = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(ClientError::Http)?;

        Ok(Self {
            endpoint,
            network: config.network.clone(),
            http,
        })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("web").extend(segments);
        }
        url
    }

    async fn get<R: DeserializeOwned>(&self, segments: &[&str]) -> Result<R> {
        let url = self.url(segments);
        debug!("Sending GET request to {}", url);
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(ClientError::from_transport)?;
        Self::parse(response).await
    }

    async fn post<B: Serialize, R: DeserializeOwned>(&self, segments: &[&str], body: &B) -> Result<R> {
        let url = self.url(segments);
        debug!("Sending POST request to {}", url);
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(ClientError::from_transport)?;
        Self::parse(response).await
    }

    async fn parse<R: DeserializeOwned>(response: Response) -> Result<R> {
        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| ClientError::InvalidResponse(e.to_string()));
        }

        let text = response.text().await.unwrap_or_default();
        if let Ok(body) = serde_json::from_str::<NodeErrorBody>(&text) {
            return Err(body.into_client_error());
        }
        match status {
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
                Err(ClientError::NetworkUnreachable(format!("{}: {}", status, text)))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(ClientError::AuthenticationRejected(format!("{}: {}", status, text)))
            }
            _ => Err(ClientError::InvalidResponse(format!("{}: {}", status, text))),
        }
    }
}

#[async_trait]
impl KeyNetwork for HttpKeyNetwork {
    #[instrument(skip(self), fields(network = %self.network))]
    async fn connect(&self) -> Result<NetworkInfo> {
        self.post(&["handshake"], &serde_json::json!({ "network": self.network }))
            .await
    }

    #[instrument(skip(self))]
    async fn latest_blockhash(&self) -> Result<String> {
        let body: BlockhashResponse = self.get(&["blockhash"]).await?;
        if body.blockhash.is_empty() {
            return Err(ClientError::NetworkUnreachable("network returned an empty blockhash".to_string()));
        }
        Ok(body.blockhash)
    }

    #[instrument(skip(self, request), fields(conditions = request.access_control_conditions.len()))]
    async fn encrypt(&self, request: EncryptRequest) -> Result<EncryptResponse> {
        self.post(&["encrypt"], &request).await
    }

    #[instrument(skip(self, request), fields(chain = %request.chain, address = %request.auth_sig.address))]
    async fn session_sigs(&self, request: SessionSigsRequest) -> Result<SessionSigsResponse> {
        self.post(&["session"], &request).await
    }

    #[instrument(skip(self, request), fields(chain = %request.chain))]
    async fn decrypt(&self, request: DecryptRequest) -> Result<DecryptResponse> {
        self.post(&["decrypt"], &request).await
    }
}
