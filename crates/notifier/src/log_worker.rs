//! Log Poll Worker - long-polls the node for one `logs` subscription

use crate::{
    backoff::{failure_backoff, next_failures, pace},
    filter::extract_eth_logs,
    LogFilter, RollingWindowLimiter, SubscriptionEntry, SubscriptionEvent,
};
use node_client::{BlockRef, ChainClient, WaitForLogsRequest, WaitForLogsResponse};
use std::{
    collections::{HashSet, VecDeque},
    sync::Arc,
    time::Duration,
};
use tokio::{task::JoinHandle, time::Instant};

/// Log poll worker configuration
#[derive(Clone, Debug)]
pub struct LogPollConfig {
    /// Calls tracked by the rolling window (default: 5)
    pub calls_in_window: usize,
    /// A full window of calls faster than this counts as a failure (default: 10s)
    pub window: Duration,
    /// Minimum time between call starts (default: 100ms)
    pub min_call_spacing: Duration,
    pub min_backoff: Duration,
    /// Backoff ceiling (default: 15s)
    pub max_backoff: Duration,
    /// Failures needed to reach the ceiling (default: 10)
    pub max_failures: u32,
    /// `None` keeps the node default
    pub min_confirmations: Option<u64>,
    /// Delivered events remembered for duplicate suppression (default: 4096)
    pub dedup_capacity: usize,
}

impl Default for LogPollConfig {
    fn default() -> Self {
        Self {
            calls_in_window: 5,
            window: Duration::from_secs(10),
            min_call_spacing: Duration::from_millis(100),
            min_backoff: Duration::ZERO,
            max_backoff: Duration::from_secs(15),
            max_failures: 10,
            min_confirmations: None,
            dedup_capacity: 4096,
        }
    }
}

/// Bounded FIFO set of delivered event digests
struct SentDigests {
    seen: HashSet<[u8; 32]>,
    order: VecDeque<[u8; 32]>,
    capacity: usize,
}

impl SentDigests {
    fn new(capacity: usize) -> Self {
        Self {
            seen: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// `false` if the digest was already recorded
    fn insert(&mut self, digest: [u8; 32]) -> bool {
        if !self.seen.insert(digest) {
            return false;
        }
        self.order.push_back(digest);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        true
    }
}

/// Drives a single `logs` subscription until it is cancelled
pub struct LogPollWorker {
    client: Arc<dyn ChainClient>,
    entry: Arc<SubscriptionEntry>,
    config: LogPollConfig,
}

impl LogPollWorker {
    pub fn new(
        client: Arc<dyn ChainClient>,
        entry: Arc<SubscriptionEntry>,
        config: LogPollConfig,
    ) -> Self {
        Self {
            client,
            entry,
            config,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Poll until the subscription is cancelled.
    ///
    /// Returns immediately if another worker already drives the subscription.
    pub async fn run(self) {
        let subscription = self.entry.subscription.clone();
        if !subscription.try_start_worker() {
            tracing::debug!(subscription_id = %subscription.id(), "Log worker already running");
            return;
        }

        self.poll().await;

        subscription.finish_worker();
        tracing::debug!(subscription_id = %subscription.id(), "Log worker stopped");
    }

    async fn poll(&self) {
        let id = self.entry.id();
        let token = self.entry.subscription.token().clone();
        let filter = self.entry.log_filter.clone().unwrap_or_default();

        let mut request = WaitForLogsRequest {
            from_block: Some(BlockRef::Number(0)),
            to_block: Some(BlockRef::Latest),
            filter: filter.to_node_filter(),
            min_confirmations: self.config.min_confirmations,
        };
        let mut rolling = RollingWindowLimiter::new(self.config.calls_in_window.max(1));
        let mut sent = SentDigests::new(self.config.dedup_capacity);
        let mut failures: u32 = 0;

        loop {
            let started = Instant::now();
            rolling.push(started);

            let result = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                result = self.client.wait_for_logs(&request) => result,
            };
            let elapsed = started.elapsed();

            let succeeded = match result {
                Ok(response) => {
                    request.from_block = Some(BlockRef::Number(response.next_block));
                    self.deliver(&response, &filter, &mut sent).await;
                    true
                }
                Err(e) => {
                    tracing::debug!(subscription_id = %id, error = %e, "waitforlogs failed");
                    false
                }
            };
            failures = next_failures(
                failures,
                succeeded,
                rolling.oldest(),
                Instant::now(),
                self.config.window,
            );

            if token.is_cancelled() {
                tracing::debug!(subscription_id = %id, "Context closed, dropping subscription");
                break;
            }

            let backoff = pace(
                failure_backoff(
                    failures,
                    self.config.min_backoff,
                    self.config.max_backoff,
                    self.config.max_failures,
                ),
                elapsed,
                self.config.min_call_spacing,
            );
            if !backoff.is_zero() {
                tracing::trace!(subscription_id = %id, "Backing off for {}ms", backoff.as_millis());
            }

            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(backoff) => {}
            }
        }
    }

    async fn deliver(&self, response: &WaitForLogsResponse, filter: &LogFilter, sent: &mut SentDigests) {
        let token = self.entry.subscription.token();
        for receipt in &response.entries {
            for log in extract_eth_logs(receipt, filter) {
                let result = match serde_json::to_value(&log) {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::error!(subscription_id = %self.entry.id(), "Failed to encode log: {}", e);
                        continue;
                    }
                };
                let event = SubscriptionEvent {
                    subscription: self.entry.id().to_string(),
                    result,
                };

                let digest = match serde_json::to_vec(&event) {
                    Ok(bytes) => *blake3::hash(&bytes).as_bytes(),
                    Err(_) => continue,
                };
                if !sent.insert(digest) {
                    continue;
                }

                tracing::debug!(subscription_id = %self.entry.id(), "Notifying of logs");
                let result = tokio::select! {
                    biased;
                    _ = token.cancelled() => return,
                    result = self.entry.notifier.notify(event) => result,
                };
                if let Err(e) = result {
                    tracing::debug!(subscription_id = %self.entry.id(), "Dropping log event: {}", e);
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sent_digests_evict_oldest() {
        let mut sent = SentDigests::new(2);

        assert!(sent.insert([1; 32]));
        assert!(!sent.insert([1; 32]));
        assert!(sent.insert([2; 32]));
        assert!(sent.insert([3; 32]));

        // [1; 32] was evicted
        assert!(sent.insert([1; 32]));
        assert!(!sent.insert([3; 32]));
    }
}
