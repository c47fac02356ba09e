//! Chain Sync - local view of the upstream chain head
//!
//! Keeps a bounded, parent-linked window of the most recent blocks:
//! - Background loop pulling one block at a time from the node
//! - Fork detection via parent hash and hash-at-height checks
//! - Lock-protected point lookups that never touch the network

pub mod block;
pub mod poller;
pub mod syncer;


pub use block::{BlockLookup, BlockSelector, CachedBlock, SelectorError};
pub use poller::{BlockPoller, NodeBlockPoller};
pub use syncer::{BlockSyncer, SyncConfig, SyncStep};

use std::time::Duration;

/// Number of blocks kept in the window
pub const DEFAULT_WINDOW_SIZE: usize = 256;

/// Delay between sync iterations when the window is at the head
pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_secs(5);
