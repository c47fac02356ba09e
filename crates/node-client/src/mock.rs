//! In-memory chain for tests
//!
//! Hashes are derived from a branch number and a height, so a reorg
//! produces different hashes for the same heights.

use crate::{
    BlockHeader, ChainClient, ClientError, RawBlock, WaitForLogsRequest, WaitForLogsResponse,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{collections::VecDeque, time::Instant};

/// Base timestamp of the mock genesis block
const GENESIS_TIME: u64 = 1_600_000_000;

/// Block spacing of the mock chain in seconds
const BLOCK_SPACING: u64 = 128;

pub fn mock_hash(branch: u32, height: u64) -> String {
    format!("{:08x}{:056x}", branch, height)
}

#[derive(Default)]
struct MockState {
    branch: u32,
    hashes: Vec<String>,
    scripted_logs: VecDeque<Result<WaitForLogsResponse, ClientError>>,
    default_logs: Option<WaitForLogsResponse>,
    failures_remaining: usize,
    log_requests: Vec<WaitForLogsRequest>,
    log_request_times: Vec<Instant>,
}

impl MockState {
    fn take_failure(&mut self) -> Result<(), ClientError> {
        if self.failures_remaining > 0 {
            self.failures_remaining -= 1;
            return Err(ClientError::Transport("mock failure".to_string()));
        }
        Ok(())
    }

    fn position(&self, hash: &str) -> Result<u64, ClientError> {
        self.hashes
            .iter()
            .position(|h| h == hash)
            .map(|p| p as u64)
            .ok_or_else(|| ClientError::Rpc {
                code: -5,
                message: "Block not found".to_string(),
            })
    }

    fn parent_of(&self, height: u64) -> Option<String> {
        height
            .checked_sub(1)
            .and_then(|parent| self.hashes.get(parent as usize).cloned())
    }
}

/// Scriptable [`ChainClient`] backed by an in-memory chain
pub struct MockChain {
    state: Mutex<MockState>,
}

impl MockChain {
    /// Create a chain with blocks `0..=height` on branch 0
    pub fn new(height: u64) -> Self {
        let hashes = (0..=height).map(|h| mock_hash(0, h)).collect();
        Self {
            state: Mutex::new(MockState {
                hashes,
                ..Default::default()
            }),
        }
    }

    pub fn height(&self) -> u64 {
        self.state.lock().hashes.len() as u64 - 1
    }

    pub fn hash_at(&self, height: u64) -> Option<String> {
        self.state.lock().hashes.get(height as usize).cloned()
    }

    /// Append `count` blocks on the current branch
    pub fn extend(&self, count: u64) {
        let mut state = self.state.lock();
        let branch = state.branch;
        for _ in 0..count {
            let height = state.hashes.len() as u64;
            state.hashes.push(mock_hash(branch, height));
        }
    }

    /// Replace every block from `fork_height` upwards with a new branch
    /// ending at `new_tip`
    pub fn reorg(&self, fork_height: u64, new_tip: u64) {
        let mut state = self.state.lock();
        state.branch += 1;
        let branch = state.branch;
        state.hashes.truncate(fork_height as usize);
        for height in fork_height..=new_tip {
            state.hashes.push(mock_hash(branch, height));
        }
    }

    /// Drop every block above `height`
    pub fn truncate(&self, height: u64) {
        self.state.lock().hashes.truncate(height as usize + 1);
    }

    /// Make the next `count` calls fail with a transport error
    pub fn fail_next(&self, count: usize) {
        self.state.lock().failures_remaining = count;
    }

    /// Queue a single `waitforlogs` result
    pub fn push_logs(&self, result: Result<WaitForLogsResponse, ClientError>) {
        self.state.lock().scripted_logs.push_back(result);
    }

    /// Response returned whenever no scripted result is queued.
    ///
    /// Without one, `waitforlogs` blocks until the caller gives up.
    pub fn set_default_logs(&self, response: WaitForLogsResponse) {
        self.state.lock().default_logs = Some(response);
    }

    pub fn wait_for_logs_requests(&self) -> Vec<WaitForLogsRequest> {
        self.state.lock().log_requests.clone()
    }

    /// When each `waitforlogs` call arrived
    pub fn wait_for_logs_times(&self) -> Vec<Instant> {
        self.state.lock().log_request_times.clone()
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn get_block_count(&self) -> Result<u64, ClientError> {
        let mut state = self.state.lock();
        state.take_failure()?;
        Ok(state.hashes.len() as u64 - 1)
    }

    async fn get_block_hash(&self, height: u64) -> Result<String, ClientError> {
        let mut state = self.state.lock();
        state.take_failure()?;
        state
            .hashes
            .get(height as usize)
            .cloned()
            .ok_or_else(|| ClientError::Rpc {
                code: -8,
                message: "Block height out of range".to_string(),
            })
    }

    async fn get_block_header(&self, hash: &str) -> Result<BlockHeader, ClientError> {
        let mut state = self.state.lock();
        state.take_failure()?;
        let height = state.position(hash)?;
        Ok(BlockHeader {
            hash: hash.to_string(),
            height,
            version: 536870912,
            merkle_root: format!("{:064x}", height),
            time: GENESIS_TIME + height * BLOCK_SPACING,
            median_time: GENESIS_TIME + height * BLOCK_SPACING,
            bits: "207fffff".to_string(),
            difficulty: 4.656542373906925e-10,
            previous_block_hash: state.parent_of(height),
            ..Default::default()
        })
    }

    async fn get_block(&self, hash: &str) -> Result<RawBlock, ClientError> {
        let mut state = self.state.lock();
        state.take_failure()?;
        let height = state.position(hash)?;
        Ok(RawBlock {
            hash: hash.to_string(),
            height,
            size: 250,
            weight: 1000,
            time: GENESIS_TIME + height * BLOCK_SPACING,
            tx: vec![format!("{:064x}", height)],
            previous_block_hash: state.parent_of(height),
            next_block_hash: state.hashes.get(height as usize + 1).cloned(),
        })
    }

    async fn wait_for_logs(
        &self,
        request: &WaitForLogsRequest,
    ) -> Result<WaitForLogsResponse, ClientError> {
        let next = {
            let mut state = self.state.lock();
            state.log_requests.push(request.clone());
            state.log_request_times.push(Instant::now());
            state.take_failure()?;
            match state.scripted_logs.pop_front() {
                Some(result) => Some(result),
                None => state.default_logs.clone().map(Ok),
            }
        };

        match next {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }
}
