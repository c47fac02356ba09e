//! Notifier - per-connection event delivery
//!
//! A single task drains the queue and writes to the connection in enqueue
//! order. While a response is pending the task holds the next event back,
//! so a client always sees a subscription id before any event carrying it.

use crate::{
    generate_subscription_id, subscription::UnsubscribeCallback, JsonRpcNotification,
    NotifierError, Subscription, SubscriptionEvent, SubscriptionId,
};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Write side of a client connection
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send(&self, payload: String) -> anyhow::Result<()>;
}

/// Notifier configuration
#[derive(Clone, Debug)]
pub struct NotifierConfig {
    /// Events buffered before producers are made to wait
    pub queue_capacity: usize,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self { queue_capacity: 256 }
    }
}

enum Outbound {
    Event(Value),
    Flush(oneshot::Sender<()>),
}

/// Per-connection delivery pipeline
pub struct Notifier {
    token: CancellationToken,
    sink: Arc<dyn EventSink>,
    on_close: Box<dyn Fn() + Send + Sync>,
    queue: mpsc::Sender<Outbound>,
    receiver: Mutex<Option<mpsc::Receiver<Outbound>>>,
    /// Armed while a response is owed to the client
    response_pending: Mutex<Option<CancellationToken>>,
    flushed: CancellationToken,
    subscriptions: DashMap<SubscriptionId, Arc<Subscription>>,
}

impl Notifier {
    /// Create a notifier bound to a connection.
    ///
    /// `on_close` runs once when the delivery loop exits, whatever the reason.
    pub fn new(
        connection: &CancellationToken,
        sink: Arc<dyn EventSink>,
        on_close: impl Fn() + Send + Sync + 'static,
        config: NotifierConfig,
    ) -> Arc<Self> {
        let (queue, receiver) = mpsc::channel(config.queue_capacity.max(1));
        Arc::new(Self {
            token: connection.child_token(),
            sink,
            on_close: Box::new(on_close),
            queue,
            receiver: Mutex::new(Some(receiver)),
            // The first event waits for the first response
            response_pending: Mutex::new(Some(CancellationToken::new())),
            flushed: CancellationToken::new(),
            subscriptions: DashMap::new(),
        })
    }

    /// Cancelled when the connection goes away
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Hold events back until [`Notifier::response_sent`]
    pub fn response_required(&self) {
        let mut pending = self.response_pending.lock();
        if pending.is_none() {
            *pending = Some(CancellationToken::new());
        }
    }

    /// Release events held back by [`Notifier::response_required`]
    pub fn response_sent(&self) {
        if let Some(gate) = self.response_pending.lock().take() {
            gate.cancel();
        }
    }

    /// Queue an event, waiting while the queue is full
    pub async fn send<T: Serialize>(&self, event: &T) -> Result<(), NotifierError> {
        let value = serde_json::to_value(event).map_err(|e| NotifierError::Send(e.to_string()))?;
        self.enqueue(Outbound::Event(value)).await
    }

    /// Queue an `eth_subscription` notification
    pub async fn notify(&self, event: SubscriptionEvent) -> Result<(), NotifierError> {
        self.send(&JsonRpcNotification::subscription(event)).await
    }

    async fn enqueue(&self, outbound: Outbound) -> Result<(), NotifierError> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(NotifierError::ConnectionClosed),
            result = self.queue.send(outbound) => result.map_err(|_| NotifierError::ConnectionClosed),
        }
    }

    /// Wait until every event queued before this call has been written,
    /// or the delivery loop has exited
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.enqueue(Outbound::Flush(tx)).await.is_err() {
            return;
        }
        let _ = rx.await;
    }

    /// Cancelled by the first completed flush or when the loop exits
    pub fn flushed(&self) -> &CancellationToken {
        &self.flushed
    }

    /// Create a subscription owned by this connection
    pub fn subscribe(
        self: &Arc<Self>,
        on_unsubscribe: UnsubscribeCallback,
    ) -> Result<Arc<Subscription>, NotifierError> {
        if self.is_closed() {
            return Err(NotifierError::ConnectionClosed);
        }

        let id = generate_subscription_id()?;
        let notifier = Arc::downgrade(self);
        let callback: UnsubscribeCallback = Arc::new(move |id: &str| {
            if let Some(notifier) = notifier.upgrade() {
                notifier.subscriptions.remove(id);
            }
            on_unsubscribe(id);
        });

        let subscription = Arc::new(Subscription::new(id.clone(), self.token.child_token(), callback));
        self.subscriptions.insert(id.clone(), subscription.clone());

        // Teardown may have taken its snapshot before the insert
        if self.is_closed() {
            self.subscriptions.remove(&id);
            subscription.unsubscribe();
            return Err(NotifierError::ConnectionClosed);
        }
        Ok(subscription)
    }

    /// Remove and cancel a subscription. Returns `false` if it is unknown.
    pub fn unsubscribe(&self, id: &str) -> bool {
        match self.subscriptions.remove(id) {
            Some((_, subscription)) => {
                subscription.unsubscribe();
                true
            }
            None => false,
        }
    }

    pub fn subscription(&self, id: &str) -> Option<Arc<Subscription>> {
        self.subscriptions.get(id).map(|s| s.value().clone())
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Run the delivery loop until the connection closes or a write fails.
    ///
    /// Only the first call runs; later calls return immediately.
    pub async fn run(self: Arc<Self>) {
        let Some(mut receiver) = self.receiver.lock().take() else {
            tracing::warn!("Notifier loop already started");
            return;
        };

        tracing::debug!("Entering notifier loop");

        loop {
            let outbound = tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                outbound = receiver.recv() => match outbound {
                    Some(outbound) => outbound,
                    None => break,
                },
            };

            let gate = self.response_pending.lock().clone();
            if let Some(gate) = gate {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => break,
                    _ = gate.cancelled() => {}
                }
            }

            match outbound {
                Outbound::Flush(done) => {
                    self.flushed.cancel();
                    let _ = done.send(());
                }
                Outbound::Event(event) => {
                    let payload = event.to_string();
                    tracing::trace!("Notifying {}", payload);
                    if let Err(e) = self.sink.send(payload).await {
                        tracing::debug!("Error writing to connection, closing it: {}", e);
                        break;
                    }
                }
            }
        }

        self.shutdown(receiver);
        tracing::debug!("Notifier loop exited");
    }

    fn shutdown(&self, mut receiver: mpsc::Receiver<Outbound>) {
        (self.on_close)();
        self.token.cancel();

        // Dropping queued flush barriers releases their waiters
        receiver.close();
        while receiver.try_recv().is_ok() {}
        self.flushed.cancel();

        let ids: Vec<SubscriptionId> = self.subscriptions.iter().map(|s| s.key().clone()).collect();
        for id in ids {
            if let Some((_, subscription)) = self.subscriptions.remove(&id) {
                subscription.unsubscribe();
            }
        }
    }
}
