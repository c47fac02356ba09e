//! UTXO-to-Ethereum RPC Gateway
//!
//! Main entry point. Follows the upstream node's head, serves Ethereum
//! JSON-RPC over HTTP and WebSocket, and turns the node's long-polled logs
//! into `eth_subscribe` pushes.

use anyhow::Result;
use chain_sync::BlockSyncer;
use clap::Parser;
use node_client::{ChainClient, HttpNodeClient};
use notifier::Agent;
use rpc_server::{RpcContext, RpcServer};
use std::{path::PathBuf, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;

use config::{GatewayConfig, Network};

/// Ethereum JSON-RPC gateway for a UTXO node
#[derive(Parser, Debug)]
#[command(name = "utxo-eth-gateway")]
#[command(about = "Ethereum-style JSON-RPC and subscriptions backed by a UTXO node", long_about = None)]
struct Args {
    /// JSON config file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Node RPC URL
    #[arg(long)]
    node_url: Option<String>,

    /// Node RPC user
    #[arg(long)]
    node_user: Option<String>,

    /// Node RPC password
    #[arg(long)]
    node_password: Option<String>,

    /// Upstream network
    #[arg(long, value_enum)]
    network: Option<Network>,

    /// HTTP RPC bind address
    #[arg(long)]
    http_addr: Option<String>,

    /// WebSocket bind address
    #[arg(long)]
    ws_addr: Option<String>,

    /// Number of recent blocks kept in memory
    #[arg(long)]
    block_window: Option<usize>,

    /// Delay between block sync iterations when at the head
    #[arg(long)]
    sync_interval_ms: Option<u64>,

    /// Head polling interval for newHeads subscriptions
    #[arg(long)]
    new_heads_interval_ms: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn apply(&self, config: &mut GatewayConfig) {
        if let Some(url) = &self.node_url {
            config.node_url = url.clone();
        }
        if let Some(user) = &self.node_user {
            config.node_user = Some(user.clone());
        }
        if let Some(password) = &self.node_password {
            config.node_password = Some(password.clone());
        }
        if let Some(network) = self.network {
            config.network = network;
        }
        if let Some(addr) = &self.http_addr {
            config.http_addr = addr.clone();
        }
        if let Some(addr) = &self.ws_addr {
            config.ws_addr = addr.clone();
        }
        if let Some(window) = self.block_window {
            config.block_window = window;
        }
        if let Some(interval) = self.sync_interval_ms {
            config.sync_interval_ms = interval;
        }
        if let Some(interval) = self.new_heads_interval_ms {
            config.new_heads_interval_ms = interval;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { "debug" } else { args.log_level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = match &args.config {
        Some(path) => GatewayConfig::load(path)?,
        None => GatewayConfig::default(),
    };
    args.apply(&mut config);

    run(config).await
}

async fn run(config: GatewayConfig) -> Result<()> {
    tracing::info!("Starting UTXO Ethereum gateway");
    tracing::info!("  Node: {} ({:?})", config.node_url, config.network);
    tracing::info!("  HTTP RPC: {}", config.http_addr);
    tracing::info!("  WebSocket: {}", config.ws_addr);
    tracing::info!("  Block window: {} blocks", config.block_window);

    let client: Arc<dyn ChainClient> = Arc::new(HttpNodeClient::new(&config.node_client_config())?);
    let token = CancellationToken::new();

    // Follow the upstream head
    let syncer = Arc::new(BlockSyncer::new(client.clone(), config.sync_config()));
    let sync_handle = syncer.start(token.clone());

    let agent = Agent::new(client.clone(), config.agent_config(), &token);

    let context = Arc::new(RpcContext {
        client,
        syncer,
        agent: agent.clone(),
    });

    // Start HTTP and WebSocket servers
    let server = RpcServer::new(config.rpc_server_config());
    let server_token = token.clone();
    let mut server_handle = tokio::spawn(async move {
        if let Err(e) = server.run(context, server_token).await {
            tracing::error!("RPC server error: {}", e);
        }
    });

    tracing::info!("Gateway running. Press Ctrl+C to stop.");

    // Wait for shutdown signal
    let server_exited = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            false
        }
        _ = &mut server_handle => true,
    };

    tracing::info!("Shutting down...");
    token.cancel();
    agent.stop();

    if let Some(handle) = sync_handle {
        let _ = handle.await;
    }
    if !server_exited {
        let _ = server_handle.await;
    }

    tracing::info!("Gateway stopped");

    Ok(())
}
