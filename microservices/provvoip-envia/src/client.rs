//! Transport to the Envia REST API

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;

/// Raw answer of the API
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

/// Sends request documents to the API
#[async_trait]
pub trait EnviaTransport: Send + Sync {
    async fn post(&self, url: &str, body: String) -> Result<ApiResponse>;
}

pub struct HttpTransport {
    http_client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self { http_client: reqwest::Client::new() }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EnviaTransport for HttpTransport {
    async fn post(&self, url: &str, body: String) -> Result<ApiResponse> {
        let response = self
            .http_client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/xml")
            .body(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(url, status, "Envia API answered");

        Ok(ApiResponse { status, body })
    }
}
