//! Node Client - upstream UTXO node RPC seam
//!
//! Everything the gateway knows about the upstream node goes through the
//! [`ChainClient`] trait:
//! - Chain head queries: getblockcount, getblockhash
//! - Block payloads: getblockheader, getblock
//! - Long-polled logs: waitforlogs
//!
//! [`HttpNodeClient`] is the production implementation. Retries for busy
//! nodes are left to the transport; callers treat every error as transient.

pub mod error;
pub mod http;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod types;

pub use error::ClientError;
pub use http::{HttpNodeClient, HttpNodeClientConfig};
pub use types::{
    BlockHeader, BlockRef, NodeLog, RawBlock, ReceiptEntry, TopicFilter, WaitForLogsFilter,
    WaitForLogsRequest, WaitForLogsResponse,
};

use async_trait::async_trait;

/// Blocking (long-poll capable) calls consumed from the upstream node.
///
/// Implementations must be safe to share between the block syncer, the
/// subscription agent and every log worker.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Height of the node's best block.
    async fn get_block_count(&self) -> Result<u64, ClientError>;

    /// Hash of the best-chain block at `height`.
    async fn get_block_hash(&self, height: u64) -> Result<String, ClientError>;

    async fn get_block_header(&self, hash: &str) -> Result<BlockHeader, ClientError>;

    async fn get_block(&self, hash: &str) -> Result<RawBlock, ClientError>;

    /// Long-poll for logs matching the request filter.
    ///
    /// The call may block server-side until a matching log exists. Callers
    /// cancel it by dropping the returned future.
    async fn wait_for_logs(
        &self,
        request: &WaitForLogsRequest,
    ) -> Result<WaitForLogsResponse, ClientError>;
}
