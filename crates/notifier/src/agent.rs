//! Subscription Agent
//!
//! Owns every subscription created through it, one registry per type:
//! - Validates the requested type before anything is created
//! - Starts a [`LogPollWorker`] per `logs` subscription
//! - Runs a single supervising loop that pushes new heads while any
//!   `newHeads` subscription exists
//!
//! Registry-wide operations lock newHeads, logs, newPendingTransactions
//! and syncing in that order.

use crate::{
    registry::SubscriptionEntry, LogFilter, LogPollConfig, LogPollWorker, NewHead, Notifier,
    NotifierError, SubscriptionId, SubscriptionKind, SubscriptionRegistry, SubscriptionRequest,
};
use node_client::{ChainClient, ClientError};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Agent configuration
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// How often the head is checked for `newHeads` subscribers (default: 10s)
    pub new_heads_interval: Duration,
    pub log_poll: LogPollConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            new_heads_interval: Duration::from_secs(10),
            log_poll: LogPollConfig::default(),
        }
    }
}

/// Subscription Agent
pub struct Agent {
    client: Arc<dyn ChainClient>,
    config: AgentConfig,
    token: CancellationToken,
    new_heads: SubscriptionRegistry,
    logs: SubscriptionRegistry,
    new_pending_transactions: SubscriptionRegistry,
    syncing: SubscriptionRegistry,
    running: AtomicBool,
    stopped: Notify,
}

impl Agent {
    pub fn new(client: Arc<dyn ChainClient>, config: AgentConfig, parent: &CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            client,
            config,
            token: parent.child_token(),
            new_heads: SubscriptionRegistry::new(),
            logs: SubscriptionRegistry::new(),
            new_pending_transactions: SubscriptionRegistry::new(),
            syncing: SubscriptionRegistry::new(),
            running: AtomicBool::new(false),
            stopped: Notify::new(),
        })
    }

    pub fn registry(&self, kind: SubscriptionKind) -> &SubscriptionRegistry {
        match kind {
            SubscriptionKind::NewHeads => &self.new_heads,
            SubscriptionKind::Logs => &self.logs,
            SubscriptionKind::NewPendingTransactions => &self.new_pending_transactions,
            SubscriptionKind::Syncing => &self.syncing,
        }
    }

    /// Create a subscription on `notifier` and start feeding it
    pub fn new_subscription(
        self: &Arc<Self>,
        notifier: &Arc<Notifier>,
        request: &SubscriptionRequest,
    ) -> Result<SubscriptionId, NotifierError> {
        let kind = request.kind()?;
        let log_filter = match kind {
            SubscriptionKind::Logs => Some(LogFilter::from_params(request.params.as_ref())?),
            _ => None,
        };

        let agent = Arc::downgrade(self);
        let subscription = notifier.subscribe(Arc::new(move |id: &str| {
            if let Some(agent) = agent.upgrade() {
                agent.unsubscribe(id);
            }
        }))?;
        let id = subscription.id().to_string();

        let entry = Arc::new(SubscriptionEntry {
            subscription,
            notifier: notifier.clone(),
            kind,
            log_filter,
        });
        self.registry(kind).insert(entry.clone());

        // The unsubscribe callback may have run before the insert
        if entry.subscription.is_cancelled() {
            self.unsubscribe(&id);
            return Err(NotifierError::ConnectionClosed);
        }
        tracing::info!(subscription_id = %id, "New {} subscription", kind);

        if kind == SubscriptionKind::Logs {
            LogPollWorker::new(self.client.clone(), entry, self.config.log_poll.clone()).spawn();
        }

        self.ensure_supervisor();
        Ok(id)
    }

    /// Drop `id` from whichever registry holds it and cancel it
    pub fn unsubscribe(&self, id: &str) {
        for kind in SubscriptionKind::ALL {
            if let Some(entry) = self.registry(kind).remove(id) {
                tracing::debug!(subscription_id = %id, "Removed {} subscription", kind);
                entry.subscription.token().cancel();
            }
        }
    }

    /// Cancel every registered subscription
    pub fn stop(&self) {
        let drained = {
            let mut new_heads = self.new_heads.write();
            let mut logs = self.logs.write();
            let mut new_pending_transactions = self.new_pending_transactions.write();
            let mut syncing = self.syncing.write();

            let mut drained = new_heads.drain();
            drained.extend(logs.drain());
            drained.extend(new_pending_transactions.drain());
            drained.extend(syncing.drain());
            for entry in &drained {
                entry.subscription.token().cancel();
            }
            drained
        };

        self.stopped.notify_waiters();
        tracing::info!("Agent stopped {} subscriptions", drained.len());

        for entry in drained {
            entry.subscription.unsubscribe();
        }
    }

    /// Total subscriptions across all registries
    pub fn subscription_count(&self) -> usize {
        let new_heads = self.new_heads.read();
        let logs = self.logs.read();
        let new_pending_transactions = self.new_pending_transactions.read();
        let syncing = self.syncing.read();

        new_heads.count() + logs.count() + new_pending_transactions.count() + syncing.count()
    }

    /// Whether the supervising loop is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn ensure_supervisor(self: &Arc<Self>) {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let agent = self.clone();
        tokio::spawn(async move { agent.supervise().await });
    }

    fn should_supervise(&self) -> bool {
        !self.token.is_cancelled() && self.new_heads.count() > 0
    }

    async fn supervise(self: Arc<Self>) {
        tracing::debug!("Agent started subscription processing");
        let mut last_height = None;

        loop {
            if !self.should_supervise() {
                self.running.store(false, Ordering::SeqCst);
                // A subscription may have arrived after the check above
                if self.should_supervise()
                    && self
                        .running
                        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                        .is_ok()
                {
                    continue;
                }
                break;
            }

            let result = tokio::select! {
                biased;
                _ = self.token.cancelled() => continue,
                result = self.poll_new_head(&mut last_height) => result,
            };
            if let Err(e) = result {
                tracing::warn!(error = %e, "Failed to poll for new heads");
            }

            tokio::select! {
                biased;
                _ = self.token.cancelled() => {}
                _ = self.stopped.notified() => {}
                _ = tokio::time::sleep(self.config.new_heads_interval) => {}
            }
        }

        tracing::debug!("Agent exited subscription processing");
    }

    async fn poll_new_head(&self, last_height: &mut Option<u64>) -> Result<(), ClientError> {
        let height = self.client.get_block_count().await?;

        match *last_height {
            // The current head is not pushed to a freshly connected client
            None => {
                tracing::debug!(height, "Recorded head height");
                *last_height = Some(height);
            }
            Some(last) if height > last => {
                tracing::debug!(height, "New head detected");
                let hash = self.client.get_block_hash(height).await?;
                let header = self.client.get_block_header(&hash).await?;
                let block = self.client.get_block(&hash).await?;

                let head = serde_json::to_value(NewHead::from_node(&header, &block))?;
                *last_height = Some(height);
                self.new_heads.send_all(&head);
            }
            Some(_) => tracing::trace!(height, "Same head"),
        }

        Ok(())
    }
}
