//! Ethereum-side subscription types

use crate::NotifierError;
use node_client::{BlockHeader, RawBlock, TopicFilter};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt, str::FromStr};

/// `"0x"` followed by 32 hex characters
pub type SubscriptionId = String;

const ZERO_HASH: &str = "0x0000000000000000000000000000000000000000000000000000000000000000";
const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";
/// Keccak of the RLP of an empty uncle list
const EMPTY_UNCLES_HASH: &str =
    "0x1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347";
const DEFAULT_GAS_LIMIT: &str = "0x5208";
const EMPTY_NONCE: &str = "0x0000000000000000";

pub fn add_hex_prefix(value: &str) -> String {
    if value.starts_with("0x") {
        value.to_string()
    } else {
        format!("0x{}", value)
    }
}

pub fn strip_hex_prefix(value: &str) -> &str {
    value.strip_prefix("0x").unwrap_or(value)
}

/// Hex quantity encoding (`0x0`, `0x1a`, ...)
pub fn hex_quantity(value: u64) -> String {
    format!("{:#x}", value)
}

/// Encode the node's floating point difficulty as a quantity.
///
/// The value is rounded up, so any positive difficulty (regtest reports
/// values far below 1) is `0x1` rather than `0x0`. Negative and NaN
/// inputs encode as `0x0`.
pub fn difficulty_quantity(difficulty: f64) -> String {
    if difficulty.is_nan() || difficulty <= 0.0 {
        return hex_quantity(0);
    }
    hex_quantity(difficulty.ceil() as u64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionKind {
    NewHeads,
    Logs,
    NewPendingTransactions,
    Syncing,
}

impl SubscriptionKind {
    pub const ALL: [SubscriptionKind; 4] = [
        SubscriptionKind::NewHeads,
        SubscriptionKind::Logs,
        SubscriptionKind::NewPendingTransactions,
        SubscriptionKind::Syncing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionKind::NewHeads => "newHeads",
            SubscriptionKind::Logs => "logs",
            SubscriptionKind::NewPendingTransactions => "newPendingTransactions",
            SubscriptionKind::Syncing => "syncing",
        }
    }
}

impl fmt::Display for SubscriptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionKind {
    type Err = NotifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "newheads" => Ok(SubscriptionKind::NewHeads),
            "logs" => Ok(SubscriptionKind::Logs),
            "newpendingtransactions" => Ok(SubscriptionKind::NewPendingTransactions),
            "syncing" => Ok(SubscriptionKind::Syncing),
            _ => Err(NotifierError::UnknownSubscriptionType(s.to_string())),
        }
    }
}

/// `address` of a logs subscription: one contract or several
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AddressParam {
    One(String),
    Many(Vec<String>),
}

/// Filter object of `eth_subscribe("logs", {...})`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSubscriptionParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<AddressParam>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topics: Option<Vec<Option<TopicFilter>>>,
}

impl LogSubscriptionParams {
    pub fn addresses(&self) -> Vec<String> {
        match &self.address {
            None => Vec::new(),
            Some(AddressParam::One(address)) => vec![address.clone()],
            Some(AddressParam::Many(addresses)) => addresses.clone(),
        }
    }
}

/// Parsed `eth_subscribe` parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    /// Subscription type exactly as the client sent it
    pub method: String,
    pub params: Option<LogSubscriptionParams>,
}

impl SubscriptionRequest {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: None,
        }
    }

    pub fn logs(params: LogSubscriptionParams) -> Self {
        Self {
            method: SubscriptionKind::Logs.as_str().to_string(),
            params: Some(params),
        }
    }

    /// Parse the positional `["<type>", {filter}?]` parameter list
    pub fn from_params(params: Value) -> Result<Self, NotifierError> {
        let params: Vec<Value> = serde_json::from_value(params)
            .map_err(|e| NotifierError::InvalidParams(e.to_string()))?;

        if params.is_empty() || params.len() > 2 {
            return Err(NotifierError::InvalidParams(format!(
                "expected 1 or 2 params, got {}",
                params.len()
            )));
        }

        let method = params[0]
            .as_str()
            .ok_or_else(|| NotifierError::InvalidParams("subscription type must be a string".into()))?
            .to_string();

        let params = match params.get(1) {
            None | Some(Value::Null) => None,
            Some(value) => Some(
                serde_json::from_value(value.clone())
                    .map_err(|e| NotifierError::InvalidParams(e.to_string()))?,
            ),
        };

        Ok(Self { method, params })
    }

    pub fn kind(&self) -> Result<SubscriptionKind, NotifierError> {
        self.method.parse()
    }
}

/// Log object pushed to `logs` subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EthLog {
    pub address: String,
    pub block_hash: String,
    pub block_number: String,
    pub data: String,
    pub log_index: String,
    pub topics: Vec<String>,
    pub transaction_hash: String,
    pub transaction_index: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed: Option<bool>,
}

/// Block header pushed to `newHeads` subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewHead {
    pub number: String,
    pub hash: String,
    pub parent_hash: String,
    pub timestamp: String,
    pub transactions_root: String,
    pub state_root: String,
    pub receipts_root: String,
    pub miner: String,
    pub nonce: String,
    pub difficulty: String,
    pub gas_limit: String,
    pub gas_used: String,
    pub extra_data: String,
    pub logs_bloom: String,
    pub sha3_uncles: String,
}

impl NewHead {
    /// Fields without a UTXO counterpart are filled with empty values
    pub fn from_node(header: &BlockHeader, block: &RawBlock) -> Self {
        let root_or_zero = |root: &str| {
            if root.is_empty() {
                ZERO_HASH.to_string()
            } else {
                add_hex_prefix(root)
            }
        };

        Self {
            number: hex_quantity(header.height),
            hash: add_hex_prefix(&header.hash),
            parent_hash: header
                .previous_block_hash
                .as_deref()
                .map(add_hex_prefix)
                .unwrap_or_else(|| ZERO_HASH.to_string()),
            timestamp: hex_quantity(block.time.max(header.time)),
            transactions_root: root_or_zero(&header.merkle_root),
            state_root: root_or_zero(&header.hash_state_root),
            receipts_root: root_or_zero(&header.merkle_root),
            miner: ZERO_ADDRESS.to_string(),
            nonce: EMPTY_NONCE.to_string(),
            difficulty: difficulty_quantity(header.difficulty),
            gas_limit: DEFAULT_GAS_LIMIT.to_string(),
            gas_used: hex_quantity(0),
            extra_data: "0x00".to_string(),
            logs_bloom: format!("0x{}", "0".repeat(512)),
            sha3_uncles: EMPTY_UNCLES_HASH.to_string(),
        }
    }
}

/// `params` of an `eth_subscription` notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionEvent {
    pub subscription: SubscriptionId,
    pub result: Value,
}

/// JSON-RPC notification envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    pub params: SubscriptionEvent,
}

impl JsonRpcNotification {
    pub fn subscription(event: SubscriptionEvent) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: "eth_subscription".to_string(),
            params: event,
        }
    }
}
