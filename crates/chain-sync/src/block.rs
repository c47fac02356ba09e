//! Cached blocks and lookup selectors

use node_client::{BlockHeader, RawBlock};
use std::{str::FromStr, sync::Arc};

/// A block held in the sync window
#[derive(Debug, Clone, PartialEq)]
pub struct CachedBlock {
    pub height: u64,
    pub hash: String,
    /// `None` for the genesis block
    pub parent_hash: Option<String>,
    pub header: BlockHeader,
    pub block: RawBlock,
}

impl CachedBlock {
    pub fn new(header: BlockHeader, block: RawBlock) -> Self {
        Self {
            height: header.height,
            hash: header.hash.clone(),
            parent_hash: header.previous_block_hash.clone(),
            header,
            block,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    #[error("Invalid block number: {0}")]
    InvalidNumber(String),
}

/// Block selector as accepted by `eth_getBlockByNumber`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockSelector {
    Latest,
    Earliest,
    Pending,
    Number(u64),
}

impl FromStr for BlockSelector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "latest" => Ok(BlockSelector::Latest),
            "earliest" => Ok(BlockSelector::Earliest),
            "pending" => Ok(BlockSelector::Pending),
            _ => {
                let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                    Some(hex) => u64::from_str_radix(hex, 16),
                    None => s.parse::<u64>(),
                };
                parsed
                    .map(BlockSelector::Number)
                    .map_err(|_| SelectorError::InvalidNumber(s.to_string()))
            }
        }
    }
}

/// Result of a cache lookup
#[derive(Debug, Clone, PartialEq)]
pub enum BlockLookup {
    Found(Arc<CachedBlock>),
    /// Height is above the cached head: the block does not exist yet
    KnownAbsent,
    /// Not answerable from the cache; ask the node directly
    Unknown,
}

impl BlockLookup {
    /// `true` when the cache gave a definitive answer
    pub fn found(&self) -> bool {
        !matches!(self, BlockLookup::Unknown)
    }

    pub fn block(&self) -> Option<&Arc<CachedBlock>> {
        match self {
            BlockLookup::Found(block) => Some(block),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_selectors() {
        assert_eq!("latest".parse::<BlockSelector>(), Ok(BlockSelector::Latest));
        assert_eq!("earliest".parse::<BlockSelector>(), Ok(BlockSelector::Earliest));
        assert_eq!("pending".parse::<BlockSelector>(), Ok(BlockSelector::Pending));
        assert_eq!("0xf8f".parse::<BlockSelector>(), Ok(BlockSelector::Number(3983)));
        assert_eq!("3983".parse::<BlockSelector>(), Ok(BlockSelector::Number(3983)));
        assert!("0xzz".parse::<BlockSelector>().is_err());
        assert!("newest".parse::<BlockSelector>().is_err());
    }

    #[test]
    fn test_lookup_found_flag() {
        assert!(BlockLookup::KnownAbsent.found());
        assert!(!BlockLookup::Unknown.found());
        assert!(BlockLookup::KnownAbsent.block().is_none());
    }
}
