//! HTTP JSON-RPC client for the upstream node

use crate::{
    BlockHeader, ChainClient, ClientError, RawBlock, WaitForLogsRequest, WaitForLogsResponse,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use jsonrpsee::{
    core::{client::ClientT, params::ArrayParams},
    http_client::{HeaderMap, HeaderValue, HttpClient, HttpClientBuilder},
    rpc_params,
};
use std::time::Duration;

/// Connection settings for [`HttpNodeClient`]
#[derive(Clone, Debug)]
pub struct HttpNodeClientConfig {
    /// Node RPC endpoint, e.g. `http://127.0.0.1:3889`
    pub url: String,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Upper bound for a single call, including `waitforlogs` long-polls
    pub request_timeout: Duration,
}

impl Default for HttpNodeClientConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:3889".to_string(),
            user: None,
            password: None,
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// [`ChainClient`] speaking JSON-RPC over HTTP with basic auth
pub struct HttpNodeClient {
    inner: HttpClient,
    url: String,
}

impl HttpNodeClient {
    pub fn new(config: &HttpNodeClientConfig) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        if let Some(user) = &config.user {
            let credentials = format!("{}:{}", user, config.password.as_deref().unwrap_or(""));
            let value = HeaderValue::from_str(&format!("Basic {}", BASE64.encode(credentials)))
                .map_err(|e| ClientError::Config(format!("Invalid credentials: {}", e)))?;
            headers.insert("authorization", value);
        }

        let inner = HttpClientBuilder::default()
            .set_headers(headers)
            .request_timeout(config.request_timeout)
            .build(&config.url)
            .map_err(|e| ClientError::Config(format!("Invalid node url {}: {}", config.url, e)))?;

        tracing::debug!("Node client configured for {}", config.url);

        Ok(Self {
            inner,
            url: config.url.clone(),
        })
    }

    /// Get the node URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ChainClient for HttpNodeClient {
    async fn get_block_count(&self) -> Result<u64, ClientError> {
        Ok(self.inner.request("getblockcount", rpc_params![]).await?)
    }

    async fn get_block_hash(&self, height: u64) -> Result<String, ClientError> {
        Ok(self.inner.request("getblockhash", rpc_params![height]).await?)
    }

    async fn get_block_header(&self, hash: &str) -> Result<BlockHeader, ClientError> {
        Ok(self.inner.request("getblockheader", rpc_params![hash, true]).await?)
    }

    async fn get_block(&self, hash: &str) -> Result<RawBlock, ClientError> {
        Ok(self.inner.request("getblock", rpc_params![hash, 1]).await?)
    }

    async fn wait_for_logs(
        &self,
        request: &WaitForLogsRequest,
    ) -> Result<WaitForLogsResponse, ClientError> {
        let mut params = ArrayParams::new();
        for param in request.to_params() {
            params.insert(param)?;
        }
        Ok(self.inner.request("waitforlogs", params).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_with_credentials() {
        let config = HttpNodeClientConfig {
            url: "http://127.0.0.1:3889".to_string(),
            user: Some("qtum".to_string()),
            password: Some("testpasswd".to_string()),
            ..Default::default()
        };

        let client = HttpNodeClient::new(&config).unwrap();
        assert_eq!(client.url(), "http://127.0.0.1:3889");
    }

    #[tokio::test]
    async fn test_rejects_invalid_url() {
        let config = HttpNodeClientConfig {
            url: "not a url".to_string(),
            ..Default::default()
        };

        assert!(matches!(
            HttpNodeClient::new(&config),
            Err(ClientError::Config(_))
        ));
    }
}
