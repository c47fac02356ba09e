//! Block Syncer - follows the upstream head
//!
//! Pulls one block per iteration until the window tail matches the node's
//! best block, then idles. Any inconsistency (parent hash mismatch, node
//! behind us, different hash at our head height) drops the whole window
//! and the next iteration starts over one block behind the node head.

use crate::{
    BlockLookup, BlockPoller, BlockSelector, CachedBlock, NodeBlockPoller, DEFAULT_IDLE_INTERVAL,
    DEFAULT_WINDOW_SIZE,
};
use node_client::{ChainClient, ClientError};
use parking_lot::RwLock;
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Block syncer configuration
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Maximum number of blocks kept (default: 256)
    pub window_size: usize,
    /// Sleep between iterations when idle or after an error (default: 5s)
    pub idle_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            idle_interval: DEFAULT_IDLE_INTERVAL,
        }
    }
}

/// Outcome of a single sync iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStep {
    /// A block was appended to the window
    Appended { height: u64 },
    /// The pulled block did not link to our head; window dropped
    Forked { height: u64 },
    /// The node is behind our head; window dropped
    Rewound { upstream: u64, local: u64 },
    /// Our head hash differs from the node's at the same height; window dropped
    HashMismatch { height: u64 },
    /// Window tail is the node's best block
    Idle,
}

#[derive(Default)]
struct SyncState {
    blocks: VecDeque<Arc<CachedBlock>>,
    synced: bool,
}

impl SyncState {
    fn clear(&mut self) {
        self.synced = false;
        self.blocks.clear();
    }
}

/// Block Syncer
///
/// Owns the block window. The sync loop is the only writer; lookups take
/// the read lock and never wait on the network.
pub struct BlockSyncer {
    client: Arc<dyn ChainClient>,
    poller: Arc<dyn BlockPoller>,
    state: RwLock<SyncState>,
    config: SyncConfig,
    running: AtomicBool,
}

impl BlockSyncer {
    /// Create a syncer pulling blocks straight from the node
    pub fn new(client: Arc<dyn ChainClient>, config: SyncConfig) -> Self {
        let poller = Arc::new(NodeBlockPoller::new(client.clone()));
        Self::with_poller(client, poller, config)
    }

    pub fn with_poller(
        client: Arc<dyn ChainClient>,
        poller: Arc<dyn BlockPoller>,
        config: SyncConfig,
    ) -> Self {
        Self {
            client,
            poller,
            state: RwLock::new(SyncState::default()),
            config,
            running: AtomicBool::new(false),
        }
    }

    /// Launch the background sync loop.
    ///
    /// Returns `None` if a loop is already running for this syncer.
    pub fn start(self: &Arc<Self>, token: CancellationToken) -> Option<JoinHandle<()>> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Block syncer already running");
            return None;
        }

        let syncer = self.clone();
        Some(tokio::spawn(async move { syncer.run(token).await }))
    }

    /// Check if the sync loop is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Whether the window currently holds a verified chain segment
    pub fn is_synced(&self) -> bool {
        self.state.read().synced
    }

    /// Number of cached blocks
    pub fn len(&self) -> usize {
        self.state.read().blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().blocks.is_empty()
    }

    async fn run(self: Arc<Self>, token: CancellationToken) {
        tracing::info!(
            "Block syncer started (window {} blocks, idle {}ms)",
            self.config.window_size,
            self.config.idle_interval.as_millis()
        );

        loop {
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                result = self.step() => result,
            };

            let idle = match result {
                Ok(SyncStep::Idle) => true,
                Ok(SyncStep::Appended { height }) => {
                    tracing::trace!("Synced block {}", height);
                    false
                }
                Ok(step) => {
                    tracing::info!("Block window dropped: {:?}", step);
                    false
                }
                Err(e) => {
                    tracing::warn!("Block sync failed, retrying: {}", e);
                    true
                }
            };

            if idle {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(self.config.idle_interval) => {}
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        tracing::info!("Block syncer stopped");
    }

    /// Run one sync iteration against the node
    pub async fn step(&self) -> Result<SyncStep, ClientError> {
        let upstream = self.client.get_block_count().await?;

        let (local, local_hash) = {
            let state = self.state.read();
            match state.blocks.back() {
                Some(block) => (Some(block.height), Some(block.hash.clone())),
                // Prime one block behind the node head
                None => (upstream.checked_sub(1), None),
            }
        };

        match local {
            Some(local) if local > upstream => {
                self.state.write().clear();
                Ok(SyncStep::Rewound { upstream, local })
            }
            Some(local) if local == upstream => {
                let upstream_hash = self.client.get_block_hash(local).await?;
                if Some(&upstream_hash) != local_hash.as_ref() {
                    tracing::debug!(
                        "Hash at height {} changed upstream ({} != {:?})",
                        local,
                        upstream_hash,
                        local_hash
                    );
                    self.state.write().clear();
                    return Ok(SyncStep::HashMismatch { height: local });
                }
                Ok(SyncStep::Idle)
            }
            _ => {
                let height = local.map_or(0, |l| l + 1);
                let block = self.poller.pull(height).await?;
                Ok(self.append(block, local_hash.as_deref()))
            }
        }
    }

    fn append(&self, block: CachedBlock, expected_parent: Option<&str>) -> SyncStep {
        let height = block.height;
        let mut state = self.state.write();

        // The window may have been replaced while the pull was in flight
        let current_head = state.blocks.back().map(|b| b.hash.as_str());
        if current_head != expected_parent {
            state.clear();
            return SyncStep::Forked { height };
        }

        let links = match expected_parent {
            None => true,
            Some(parent) => block.parent_hash.as_deref() == Some(parent),
        };
        if !links {
            tracing::debug!(
                "Block {} parent {:?} does not match local head {:?}",
                height,
                block.parent_hash,
                expected_parent
            );
            state.clear();
            return SyncStep::Forked { height };
        }

        state.blocks.push_back(Arc::new(block));
        state.synced = true;
        while state.blocks.len() > self.config.window_size {
            state.blocks.pop_front();
        }

        SyncStep::Appended { height }
    }

    /// Look a block up in the window without touching the node
    pub fn get_block(&self, selector: &BlockSelector) -> BlockLookup {
        let state = self.state.read();
        if !state.synced {
            return BlockLookup::Unknown;
        }

        match selector {
            BlockSelector::Latest => match state.blocks.back() {
                Some(block) => BlockLookup::Found(block.clone()),
                None => BlockLookup::Unknown,
            },
            BlockSelector::Earliest | BlockSelector::Pending => BlockLookup::Unknown,
            BlockSelector::Number(requested) => {
                for block in state.blocks.iter().rev() {
                    if *requested > block.height {
                        return BlockLookup::KnownAbsent;
                    }
                    if *requested == block.height {
                        return BlockLookup::Found(block.clone());
                    }
                }
                BlockLookup::Unknown
            }
        }
    }

    /// Height of the window tail, if synced
    pub fn latest_height(&self) -> Option<u64> {
        self.get_block(&BlockSelector::Latest)
            .block()
            .map(|block| block.height)
    }
}
