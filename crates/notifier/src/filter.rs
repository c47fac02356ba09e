//! Log filtering and conversion for `logs` subscriptions

use crate::{
    types::{add_hex_prefix, hex_quantity, strip_hex_prefix},
    EthLog, LogSubscriptionParams, NotifierError,
};
use node_client::{NodeLog, ReceiptEntry, TopicFilter, WaitForLogsFilter};

/// Logs carry at most four topics
pub const MAX_TOPICS: usize = 4;

/// Address and topic filter in node format (lowercase, no `0x`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilter {
    /// Empty matches any address
    pub addresses: Vec<String>,
    /// `None` positions are wildcards
    pub topics: Vec<Option<TopicFilter>>,
}

fn normalize(value: &str) -> String {
    strip_hex_prefix(value).to_ascii_lowercase()
}

fn translate_topic(topic: &TopicFilter) -> TopicFilter {
    match topic {
        TopicFilter::Exact(topic) => TopicFilter::Exact(strip_hex_prefix(topic).to_string()),
        TopicFilter::AnyOf(options) => TopicFilter::AnyOf(
            options
                .iter()
                .map(|o| strip_hex_prefix(o).to_string())
                .collect(),
        ),
    }
}

impl LogFilter {
    pub fn from_params(params: Option<&LogSubscriptionParams>) -> Result<Self, NotifierError> {
        let Some(params) = params else {
            return Ok(Self::default());
        };

        let topics = params.topics.clone().unwrap_or_default();
        if topics.len() > MAX_TOPICS {
            return Err(NotifierError::TooManyTopics(topics.len()));
        }

        Ok(Self {
            addresses: params.addresses().iter().map(|a| normalize(a)).collect(),
            topics: topics
                .iter()
                .map(|topic| topic.as_ref().map(translate_topic))
                .collect(),
        })
    }

    /// Filter passed to `waitforlogs`
    pub fn to_node_filter(&self) -> WaitForLogsFilter {
        WaitForLogsFilter {
            addresses: (!self.addresses.is_empty()).then(|| self.addresses.clone()),
            topics: (!self.topics.is_empty()).then(|| self.topics.clone()),
        }
    }

    pub fn matches(&self, log: &NodeLog) -> bool {
        if !self.addresses.is_empty() && !self.addresses.contains(&normalize(&log.address)) {
            return false;
        }

        self.topics.iter().enumerate().all(|(position, filter)| match filter {
            None => true,
            Some(filter) => log
                .topics
                .get(position)
                .is_some_and(|topic| filter.matches(strip_hex_prefix(topic))),
        })
    }
}

/// Convert the logs of one receipt that pass `filter`.
///
/// `logIndex` is the position among the matching logs of the receipt.
pub fn extract_eth_logs(entry: &ReceiptEntry, filter: &LogFilter) -> Vec<EthLog> {
    entry
        .log
        .iter()
        .filter(|log| filter.matches(log))
        .enumerate()
        .map(|(index, log)| EthLog {
            address: add_hex_prefix(&log.address),
            block_hash: add_hex_prefix(&entry.block_hash),
            block_number: hex_quantity(entry.block_number),
            data: add_hex_prefix(&log.data),
            log_index: hex_quantity(index as u64),
            topics: log.topics.iter().map(|t| add_hex_prefix(t)).collect(),
            transaction_hash: add_hex_prefix(&entry.transaction_hash),
            transaction_index: hex_quantity(entry.transaction_index),
            removed: None,
        })
        .collect()
}
