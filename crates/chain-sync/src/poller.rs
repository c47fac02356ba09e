//! Block pulling from the upstream node

use crate::CachedBlock;
use async_trait::async_trait;
use node_client::{ChainClient, ClientError};
use std::sync::Arc;

/// Fetches a full block by height
#[async_trait]
pub trait BlockPoller: Send + Sync {
    async fn pull(&self, height: u64) -> Result<CachedBlock, ClientError>;
}

/// [`BlockPoller`] resolving height -> hash -> header + block on the node
pub struct NodeBlockPoller {
    client: Arc<dyn ChainClient>,
}

impl NodeBlockPoller {
    pub fn new(client: Arc<dyn ChainClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BlockPoller for NodeBlockPoller {
    async fn pull(&self, height: u64) -> Result<CachedBlock, ClientError> {
        let hash = self.client.get_block_hash(height).await?;
        let header = self.client.get_block_header(&hash).await?;
        let block = self.client.get_block(&hash).await?;
        Ok(CachedBlock::new(header, block))
    }
}
