//! Node-side wire types
//!
//! Field names follow the upstream node's JSON. Hashes are plain hex
//! without a `0x` prefix, exactly as the node returns them.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value};

/// Response of `getblockheader <hash> true`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    pub hash: String,
    pub height: u64,
    #[serde(default)]
    pub version: i64,
    #[serde(rename = "merkleroot", default)]
    pub merkle_root: String,
    #[serde(default)]
    pub time: u64,
    #[serde(rename = "mediantime", default)]
    pub median_time: u64,
    #[serde(default)]
    pub nonce: u64,
    #[serde(default)]
    pub bits: String,
    #[serde(default)]
    pub difficulty: f64,
    #[serde(default)]
    pub chainwork: String,
    #[serde(default)]
    pub hash_state_root: String,
    #[serde(rename = "hashUTXORoot", default)]
    pub hash_utxo_root: String,
    /// Absent for the genesis block
    #[serde(rename = "previousblockhash", default)]
    pub previous_block_hash: Option<String>,
}

/// Response of `getblock <hash> 1`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawBlock {
    pub hash: String,
    pub height: u64,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub weight: u64,
    #[serde(default)]
    pub time: u64,
    /// Transaction ids in block order
    #[serde(default)]
    pub tx: Vec<String>,
    #[serde(rename = "previousblockhash", default)]
    pub previous_block_hash: Option<String>,
    #[serde(rename = "nextblockhash", default)]
    pub next_block_hash: Option<String>,
}

/// Block bound for `waitforlogs`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRef {
    Number(u64),
    Latest,
}

impl Serialize for BlockRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            BlockRef::Number(n) => serializer.serialize_u64(*n),
            BlockRef::Latest => serializer.serialize_str("latest"),
        }
    }
}

/// One topic position of a log filter: an exact topic or a set of
/// alternatives. Wildcard positions are `None` in the enclosing list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TopicFilter {
    Exact(String),
    AnyOf(Vec<String>),
}

impl TopicFilter {
    pub fn matches(&self, topic: &str) -> bool {
        match self {
            TopicFilter::Exact(expected) => expected.eq_ignore_ascii_case(topic),
            TopicFilter::AnyOf(options) => options.iter().any(|o| o.eq_ignore_ascii_case(topic)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaitForLogsFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addresses: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topics: Option<Vec<Option<TopicFilter>>>,
}

/// Arguments of `waitforlogs`
#[derive(Debug, Clone, PartialEq)]
pub struct WaitForLogsRequest {
    /// `None` lets the node pick its default start
    pub from_block: Option<BlockRef>,
    /// `None` waits indefinitely into the future
    pub to_block: Option<BlockRef>,
    pub filter: WaitForLogsFilter,
    /// `None` keeps the node default (6)
    pub min_confirmations: Option<u64>,
}

impl WaitForLogsRequest {
    /// Positional parameters in the order the node expects them.
    pub fn to_params(&self) -> Vec<Value> {
        let mut params = vec![
            json!(self.from_block),
            json!(self.to_block),
            json!(self.filter),
        ];
        if let Some(min_confirmations) = self.min_confirmations {
            params.push(json!(min_confirmations));
        }
        params
    }
}

/// A log emitted by a contract execution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeLog {
    pub address: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
}

/// A transaction receipt returned by `waitforlogs`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptEntry {
    pub block_hash: String,
    pub block_number: u64,
    pub transaction_hash: String,
    pub transaction_index: u64,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub cumulative_gas_used: u64,
    #[serde(default)]
    pub gas_used: u64,
    #[serde(default)]
    pub contract_address: String,
    #[serde(default)]
    pub excepted: String,
    #[serde(default)]
    pub log: Vec<NodeLog>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitForLogsResponse {
    #[serde(default)]
    pub entries: Vec<ReceiptEntry>,
    #[serde(default)]
    pub count: u64,
    /// Cursor to resume from on the next call
    pub next_block: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_for_logs_params_order() {
        let request = WaitForLogsRequest {
            from_block: Some(BlockRef::Number(7)),
            to_block: Some(BlockRef::Latest),
            filter: WaitForLogsFilter {
                addresses: Some(vec!["abcd".to_string()]),
                topics: Some(vec![None, Some(TopicFilter::Exact("topic1".to_string()))]),
            },
            min_confirmations: Some(0),
        };

        let params = request.to_params();
        assert_eq!(params.len(), 4);
        assert_eq!(params[0], json!(7));
        assert_eq!(params[1], json!("latest"));
        assert_eq!(
            params[2],
            json!({"addresses": ["abcd"], "topics": [null, "topic1"]})
        );
        assert_eq!(params[3], json!(0));
    }

    #[test]
    fn test_default_confirmations_omitted() {
        let request = WaitForLogsRequest {
            from_block: None,
            to_block: None,
            filter: WaitForLogsFilter::default(),
            min_confirmations: None,
        };

        assert_eq!(request.to_params(), vec![Value::Null, Value::Null, json!({})]);
    }

    #[test]
    fn test_decode_wait_for_logs_response() {
        let raw = json!({
            "entries": [{
                "blockHash": "bba11e1b",
                "blockNumber": 3983,
                "transactionHash": "11e97fa5",
                "transactionIndex": 2,
                "from": "7926223070547d2d15b2ef5e7383e541c338ffe9",
                "to": "",
                "cumulativeGasUsed": 68158,
                "gasUsed": 68158,
                "contractAddress": "1286595f8683ae074bc026cf0e587177b36842e2",
                "excepted": "None",
                "log": [{"address": "1286595f", "topics": ["topic1"], "data": "00"}]
            }],
            "count": 1,
            "nextBlock": 3984
        });

        let response: WaitForLogsResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(response.next_block, 3984);
        assert_eq!(response.entries[0].block_number, 3983);
        assert_eq!(response.entries[0].log[0].topics, vec!["topic1".to_string()]);
    }

    #[test]
    fn test_genesis_header_has_no_parent() {
        let raw = json!({"hash": "00aa", "height": 0, "time": 1504695029});
        let header: BlockHeader = serde_json::from_value(raw).unwrap();
        assert!(header.previous_block_hash.is_none());
    }

    #[test]
    fn test_topic_filter_matching() {
        let exact = TopicFilter::Exact("AbCd".to_string());
        assert!(exact.matches("abcd"));
        assert!(!exact.matches("abce"));

        let any = TopicFilter::AnyOf(vec!["01".to_string(), "02".to_string()]);
        assert!(any.matches("02"));
        assert!(!any.matches("03"));
    }
}
