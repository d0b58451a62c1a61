//! reqwest-backed [`Transport`].

use std::time::Duration;

use async_trait::async_trait;
use libre_core::{BrokerConfig, Transport, TransportError};
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

const KEEPALIVE: Duration = Duration::from_secs(60);

/// Plain GET client: no cookies, no referrer, keep-alive connections.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Build a client. `timeout` bounds each whole request when set.
    pub fn new(timeout: Option<Duration>) -> Result<Self, TransportError> {
        let mut builder = Client::builder()
            .user_agent(concat!("libre-ultra/", env!("CARGO_PKG_VERSION")))
            .referer(false)
            .tcp_keepalive(KEEPALIVE);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| TransportError::ClientBuild {
            reason: e.to_string(),
        })?;
        Ok(Self { client })
    }

    pub fn from_config(config: &BrokerConfig) -> Result<Self, TransportError> {
        Self::new(config.request_timeout)
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_json(&self, url: &str) -> Result<Option<Value>, TransportError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TransportError::RequestFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            debug!(url = %url, status = status.as_u16(), "Non-success status");
            return Ok(None);
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(|e| TransportError::InvalidResponse {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Some(body))
    }
}
