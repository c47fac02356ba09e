//! Gateway Configuration

use chain_sync::SyncConfig;
use clap::ValueEnum;
use node_client::HttpNodeClientConfig;
use notifier::{AgentConfig, LogPollConfig, NotifierConfig};
use rpc_server::RpcServerConfig;
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

/// Upstream chain the node is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Main,
    Test,
    Regtest,
}

impl Network {
    /// Confirmations requested from `waitforlogs`; `None` keeps the node default
    pub fn min_confirmations(&self) -> Option<u64> {
        match self {
            Network::Main => None,
            Network::Test | Network::Regtest => Some(0),
        }
    }
}

/// Log polling limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogPollSettings {
    pub calls_in_window: usize,
    pub window_ms: u64,
    pub min_call_spacing_ms: u64,
    pub max_backoff_ms: u64,
    pub max_failures: u32,
}

impl Default for LogPollSettings {
    fn default() -> Self {
        Self {
            calls_in_window: 5,
            window_ms: 10_000,
            min_call_spacing_ms: 100,
            max_backoff_ms: 15_000,
            max_failures: 10,
        }
    }
}

/// Gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Node RPC endpoint
    pub node_url: String,
    pub node_user: Option<String>,
    pub node_password: Option<String>,
    pub network: Network,
    /// HTTP RPC bind address
    pub http_addr: String,
    /// WebSocket bind address
    pub ws_addr: String,
    /// Blocks kept by the block syncer
    pub block_window: usize,
    pub sync_interval_ms: u64,
    pub new_heads_interval_ms: u64,
    pub request_timeout_ms: u64,
    /// Events buffered per websocket connection
    pub queue_capacity: usize,
    pub log_poll: LogPollSettings,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let rpc = RpcServerConfig::default();
        Self {
            node_url: HttpNodeClientConfig::default().url,
            node_user: None,
            node_password: None,
            network: Network::Main,
            http_addr: rpc.http_addr,
            ws_addr: rpc.ws_addr,
            block_window: chain_sync::DEFAULT_WINDOW_SIZE,
            sync_interval_ms: chain_sync::DEFAULT_IDLE_INTERVAL.as_millis() as u64,
            new_heads_interval_ms: 10_000,
            request_timeout_ms: 60_000,
            queue_capacity: NotifierConfig::default().queue_capacity,
            log_poll: LogPollSettings::default(),
        }
    }
}

impl GatewayConfig {
    /// Load a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn node_client_config(&self) -> HttpNodeClientConfig {
        HttpNodeClientConfig {
            url: self.node_url.clone(),
            user: self.node_user.clone(),
            password: self.node_password.clone(),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
        }
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            window_size: self.block_window,
            idle_interval: Duration::from_millis(self.sync_interval_ms),
        }
    }

    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            new_heads_interval: Duration::from_millis(self.new_heads_interval_ms),
            log_poll: LogPollConfig {
                calls_in_window: self.log_poll.calls_in_window,
                window: Duration::from_millis(self.log_poll.window_ms),
                min_call_spacing: Duration::from_millis(self.log_poll.min_call_spacing_ms),
                max_backoff: Duration::from_millis(self.log_poll.max_backoff_ms),
                max_failures: self.log_poll.max_failures,
                min_confirmations: self.network.min_confirmations(),
                ..Default::default()
            },
        }
    }

    pub fn rpc_server_config(&self) -> RpcServerConfig {
        RpcServerConfig {
            http_addr: self.http_addr.clone(),
            ws_addr: self.ws_addr.clone(),
            notifier: NotifierConfig {
                queue_capacity: self.queue_capacity,
            },
        }
    }
}
