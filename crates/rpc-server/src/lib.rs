//! RPC Server - Ethereum-style JSON-RPC and WebSocket front end
//!
//! Exposes the gateway core to clients:
//! - HTTP JSON-RPC: eth_blockNumber, eth_getBlockByNumber
//! - WebSocket: the same methods plus eth_subscribe, eth_unsubscribe

pub mod http_server;
pub mod methods;
pub mod ws_server;

#[cfg(test)]
mod tests;

pub use http_server::HttpRpcServer;
pub use methods::{RpcContext, RpcError};
pub use ws_server::WebSocketServer;

use notifier::NotifierConfig;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// RPC Server configuration
#[derive(Clone, Debug)]
pub struct RpcServerConfig {
    /// HTTP RPC bind address
    pub http_addr: String,
    /// WebSocket bind address
    pub ws_addr: String,
    /// Per-connection notifier settings
    pub notifier: NotifierConfig,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            http_addr: "127.0.0.1:23889".to_string(),
            ws_addr: "127.0.0.1:23890".to_string(),
            notifier: NotifierConfig::default(),
        }
    }
}

/// Combined RPC server (HTTP + WebSocket)
pub struct RpcServer {
    config: RpcServerConfig,
}

impl RpcServer {
    pub fn new(config: RpcServerConfig) -> Self {
        Self { config }
    }

    /// Get the HTTP address
    pub fn http_addr(&self) -> &str {
        &self.config.http_addr
    }

    /// Get the WebSocket address
    pub fn ws_addr(&self) -> &str {
        &self.config.ws_addr
    }

    /// Serve both endpoints until `token` is cancelled or one of them fails
    pub async fn run(self, context: Arc<RpcContext>, token: CancellationToken) -> anyhow::Result<()> {
        let http = HttpRpcServer::new(context.clone());
        let ws = WebSocketServer::new(context, self.config.notifier.clone());

        tokio::try_join!(
            http.run(&self.config.http_addr, token.clone()),
            ws.run(&self.config.ws_addr, token.clone()),
        )?;
        Ok(())
    }
}
