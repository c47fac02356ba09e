//! RPC Methods - JSON-RPC method handlers
//!
//! Block queries are answered from the sync window where possible;
//! subscriptions need the connection's [`Notifier`] and so only work
//! over websocket.

use chain_sync::{BlockLookup, BlockPoller, BlockSelector, BlockSyncer, CachedBlock, NodeBlockPoller};
use node_client::{ChainClient, ClientError};
use notifier::{
    types::{add_hex_prefix, hex_quantity},
    Agent, NewHead, Notifier, NotifierError, SubscriptionRequest,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Node error code for a height beyond the best block
const RPC_INVALID_PARAMETER: i32 = -8;

/// RPC context shared across handlers
pub struct RpcContext {
    pub client: Arc<dyn ChainClient>,
    pub syncer: Arc<BlockSyncer>,
    pub agent: Arc<Agent>,
}

// ============ Request/Response Types ============

/// Block object returned by `eth_getBlockByNumber`
#[derive(Debug, Serialize, Deserialize)]
pub struct EthBlock {
    #[serde(flatten)]
    pub header: NewHead,
    pub size: String,
    /// Transaction hashes in block order
    pub transactions: Vec<String>,
    pub uncles: Vec<String>,
}

impl EthBlock {
    pub fn from_cached(block: &CachedBlock) -> Self {
        Self {
            header: NewHead::from_node(&block.header, &block.block),
            size: hex_quantity(block.block.size),
            transactions: block.block.tx.iter().map(|tx| add_hex_prefix(tx)).collect(),
            uncles: Vec::new(),
        }
    }
}

// ============ RPC Handlers ============

/// Handle eth_blockNumber RPC method
pub async fn handle_block_number(ctx: &RpcContext) -> Result<String, RpcError> {
    let height = match ctx.syncer.latest_height() {
        Some(height) => height,
        None => ctx.client.get_block_count().await?,
    };
    Ok(hex_quantity(height))
}

/// Handle eth_getBlockByNumber RPC method
pub async fn handle_get_block_by_number(
    ctx: &RpcContext,
    selector: BlockSelector,
) -> Result<Option<EthBlock>, RpcError> {
    match ctx.syncer.get_block(&selector) {
        BlockLookup::Found(block) => return Ok(Some(EthBlock::from_cached(&block))),
        BlockLookup::KnownAbsent => return Ok(None),
        BlockLookup::Unknown => {}
    }

    tracing::debug!("Block {:?} not cached, asking the node", selector);
    let height = match selector {
        BlockSelector::Number(height) => height,
        BlockSelector::Earliest => 0,
        BlockSelector::Latest | BlockSelector::Pending => ctx.client.get_block_count().await?,
    };

    let poller = NodeBlockPoller::new(ctx.client.clone());
    match poller.pull(height).await {
        Ok(block) => Ok(Some(EthBlock::from_cached(&block))),
        Err(ClientError::Rpc { code, .. }) if code == RPC_INVALID_PARAMETER => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Handle eth_subscribe RPC method
pub fn handle_subscribe(
    ctx: &RpcContext,
    notifier: Option<&Arc<Notifier>>,
    params: Value,
) -> Result<String, RpcError> {
    let notifier = notifier.ok_or_else(|| {
        RpcError::NotSupported("eth_subscribe is only supported over websocket".to_string())
    })?;

    let request = SubscriptionRequest::from_params(params)?;
    notifier.response_required();
    Ok(ctx.agent.new_subscription(notifier, &request)?)
}

/// Handle eth_unsubscribe RPC method
pub fn handle_unsubscribe(notifier: Option<&Arc<Notifier>>, params: Value) -> Result<bool, RpcError> {
    let notifier = notifier.ok_or_else(|| {
        RpcError::NotSupported("eth_unsubscribe is only supported over websocket".to_string())
    })?;

    let params: Vec<Value> = serde_json::from_value(params).unwrap_or_default();
    if params.len() != 1 {
        return Err(RpcError::InvalidParams(format!(
            "expected 1 param, got {}",
            params.len()
        )));
    }
    let id = params[0]
        .as_str()
        .ok_or_else(|| RpcError::InvalidParams("Subscription id must be a string".to_string()))?;

    Ok(notifier.unsubscribe(id))
}

/// Dispatch to appropriate method handler
pub async fn dispatch_method(
    ctx: &RpcContext,
    method: &str,
    params: Value,
    notifier: Option<&Arc<Notifier>>,
) -> Result<Value, RpcError> {
    tracing::debug!("RPC method called: {}", method);
    match method {
        "eth_blockNumber" => Ok(json!(handle_block_number(ctx).await?)),

        "eth_getBlockByNumber" => {
            let params: Vec<Value> = serde_json::from_value(params).unwrap_or_default();
            let selector = params
                .first()
                .and_then(|v| v.as_str())
                .ok_or_else(|| RpcError::InvalidParams("Missing block number".to_string()))?
                .parse::<BlockSelector>()
                .map_err(|e| RpcError::InvalidParams(e.to_string()))?;

            let block = handle_get_block_by_number(ctx, selector).await?;
            serde_json::to_value(block).map_err(|e| RpcError::InternalError(e.to_string()))
        }

        "eth_subscribe" => Ok(json!(handle_subscribe(ctx, notifier, params)?)),

        "eth_unsubscribe" => Ok(json!(handle_unsubscribe(notifier, params)?)),

        _ => Err(RpcError::MethodNotFound(method.to_string())),
    }
}

// ============ Error Types ============

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("Invalid params: {0}")]
    InvalidParams(String),
    #[error("Internal error: {0}")]
    InternalError(String),
    #[error("Method not found: {0}")]
    MethodNotFound(String),
    #[error("{0}")]
    NotSupported(String),
}

impl RpcError {
    /// JSON-RPC error code
    pub fn code(&self) -> i32 {
        match self {
            RpcError::InvalidParams(_) => -32602,
            RpcError::MethodNotFound(_) | RpcError::NotSupported(_) => -32601,
            RpcError::InternalError(_) => -32603,
        }
    }
}

impl From<ClientError> for RpcError {
    fn from(error: ClientError) -> Self {
        RpcError::InternalError(error.to_string())
    }
}

impl From<NotifierError> for RpcError {
    fn from(error: NotifierError) -> Self {
        match error {
            NotifierError::UnknownSubscriptionType(_)
            | NotifierError::InvalidParams(_)
            | NotifierError::TooManyTopics(_) => RpcError::InvalidParams(error.to_string()),
            _ => RpcError::InternalError(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_sync::SyncConfig;
    use node_client::mock::MockChain;
    use notifier::AgentConfig;
    use tokio_util::sync::CancellationToken;

    async fn context(height: u64, synced: bool) -> (RpcContext, Arc<MockChain>) {
        let chain = Arc::new(MockChain::new(height));
        let syncer = Arc::new(BlockSyncer::new(chain.clone(), SyncConfig::default()));
        if synced {
            while syncer.step().await.unwrap() != chain_sync::SyncStep::Idle {}
        }
        let agent = Agent::new(chain.clone(), AgentConfig::default(), &CancellationToken::new());
        (
            RpcContext {
                client: chain.clone(),
                syncer,
                agent,
            },
            chain,
        )
    }

    #[tokio::test]
    async fn test_block_number_from_cache_and_node() {
        let (ctx, chain) = context(20, true).await;
        chain.extend(5);
        // Cache has not caught up yet
        assert_eq!(dispatch_method(&ctx, "eth_blockNumber", json!([]), None).await.unwrap(), json!("0x14"));

        let (ctx, _) = context(20, false).await;
        assert_eq!(dispatch_method(&ctx, "eth_blockNumber", json!([]), None).await.unwrap(), json!("0x14"));
    }

    #[tokio::test]
    async fn test_get_block_by_number() {
        let (ctx, chain) = context(20, true).await;

        let latest = dispatch_method(&ctx, "eth_getBlockByNumber", json!(["latest", false]), None)
            .await
            .unwrap();
        assert_eq!(latest["number"], "0x14");
        assert_eq!(latest["hash"], json!(format!("0x{}", chain.hash_at(20).unwrap())));
        assert_eq!(latest["transactions"].as_array().unwrap().len(), 1);

        // Above the cached head
        let absent = dispatch_method(&ctx, "eth_getBlockByNumber", json!(["0x15", false]), None)
            .await
            .unwrap();
        assert_eq!(absent, Value::Null);

        // Below the window: fetched from the node
        let old = dispatch_method(&ctx, "eth_getBlockByNumber", json!(["0x3", false]), None)
            .await
            .unwrap();
        assert_eq!(old["number"], "0x3");

        let earliest = dispatch_method(&ctx, "eth_getBlockByNumber", json!(["earliest"]), None)
            .await
            .unwrap();
        assert_eq!(earliest["number"], "0x0");
    }

    #[tokio::test]
    async fn test_get_block_beyond_node_head() {
        let (ctx, _) = context(20, false).await;

        let block = dispatch_method(&ctx, "eth_getBlockByNumber", json!(["0x100"]), None)
            .await
            .unwrap();
        assert_eq!(block, Value::Null);

        let err = dispatch_method(&ctx, "eth_getBlockByNumber", json!(["soon"]), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), -32602);
    }

    #[tokio::test]
    async fn test_subscriptions_need_websocket() {
        let (ctx, _) = context(20, false).await;

        let err = dispatch_method(&ctx, "eth_subscribe", json!(["newHeads"]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::NotSupported(_)));
        assert!(err.to_string().contains("websocket"));

        let err = dispatch_method(&ctx, "eth_unsubscribe", json!(["0x00"]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::NotSupported(_)));
    }

    #[tokio::test]
    async fn test_method_not_found() {
        let (ctx, _) = context(20, false).await;
        let err = dispatch_method(&ctx, "eth_mining", json!([]), None).await.unwrap_err();
        assert_eq!(err.code(), -32601);
    }
}
