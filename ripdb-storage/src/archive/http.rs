//! HTTP transport for an IPFS pinning service plus a read gateway.
//!
//! Uploads go to `POST {api_base_url}/upload` with a bearer token and expect
//! `{"ok": true, "value": {"cid": "..."}}` back. Reads are plain
//! `GET {gateway_base_url}/{address}` requests.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use ripdb_core::{ArchiveConfig, ArchiveError, ConfigError, ContentAddress, TransientFailure};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use super::{BlobTransport, FetchFailure};

/// Response body of the upload endpoint.
#[derive(Debug, Deserialize)]
struct UploadResponse {
    ok: bool,
    #[serde(default)]
    value: Option<UploadValue>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct UploadValue {
    cid: String,
}

/// reqwest-backed [`BlobTransport`].
pub struct HttpBlobTransport {
    client: Client,
    api_base_url: String,
    api_token: SecretString,
    gateway_base_url: String,
    request_timeout: Duration,
}

impl HttpBlobTransport {
    /// Build a transport from archive settings.
    pub fn new(config: &ArchiveConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("ripdb/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "archive".to_string(),
                value: config.api_base_url.clone(),
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_token: SecretString::new(config.api_token.expose_secret().into()),
            gateway_base_url: config.gateway_base_url.trim_end_matches('/').to_string(),
            request_timeout: config.request_timeout,
        })
    }

    fn upload_url(&self) -> String {
        format!("{}/upload", self.api_base_url)
    }

    fn gateway_url(&self, address: &ContentAddress) -> String {
        format!("{}/{}", self.gateway_base_url, address)
    }
}

fn write_failed(reason: impl Into<String>) -> ArchiveError {
    ArchiveError::WriteFailed {
        reason: reason.into(),
    }
}

#[async_trait]
impl BlobTransport for HttpBlobTransport {
    async fn put_blob(&self, bytes: &[u8]) -> Result<ContentAddress, ArchiveError> {
        let response = self
            .client
            .post(self.upload_url())
            .bearer_auth(self.api_token.expose_secret())
            .header("Content-Type", "application/json")
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| write_failed(format!("upload request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(write_failed(format!("upload returned status {}", status)));
        }

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| write_failed(format!("invalid upload response: {}", e)))?;

        match body {
            UploadResponse {
                ok: true,
                value: Some(value),
                ..
            } => ContentAddress::parse(value.cid)
                .map_err(|e| write_failed(format!("upload returned an unusable address: {}", e))),
            UploadResponse { error, .. } => Err(write_failed(format!(
                "upload rejected: {}",
                error.map(|e| e.to_string()).unwrap_or_else(|| "no error detail".to_string())
            ))),
        }
    }

    async fn get_blob(&self, address: &ContentAddress) -> Result<Vec<u8>, FetchFailure> {
        let response = self
            .client
            .get(self.gateway_url(address))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransientFailure::Timeout(self.request_timeout)
                } else {
                    TransientFailure::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            return Err(FetchFailure::Unauthorized);
        }
        if !status.is_success() {
            return Err(TransientFailure::Status(status.as_u16()).into());
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| TransientFailure::Network(e.to_string()))?;
        Ok(body.to_vec())
    }
}

impl std::fmt::Debug for HttpBlobTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBlobTransport")
            .field("api_base_url", &self.api_base_url)
            .field("api_token", &"[REDACTED]")
            .field("gateway_base_url", &self.gateway_base_url)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}
