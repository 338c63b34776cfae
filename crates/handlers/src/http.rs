use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::HandlerError;
use crate::probes::HttpProbe;

/// [`HttpProbe`] backed by `reqwest`. Feature-gated behind `http`.
pub struct ReqwestHttpProbe {
    client: Client,
}

impl ReqwestHttpProbe {
    /// Build a probe whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, HandlerError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HandlerError::Configuration(e.to_string()))?;
        Ok(Self { client })
    }

    /// Use a preconfigured client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpProbe for ReqwestHttpProbe {
    async fn is_success(&self, url: &str) -> Result<bool, HandlerError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| HandlerError::Connection(format!("GET {url} failed: {e}")))?;
        Ok(response.status().is_success())
    }
}
