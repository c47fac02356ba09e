//! Per-type subscription registry

use crate::{LogFilter, Notifier, Subscription, SubscriptionEvent, SubscriptionId, SubscriptionKind};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde_json::Value;
use std::{collections::HashMap, sync::Arc};

/// A subscription together with what the agent needs to feed it
pub struct SubscriptionEntry {
    pub subscription: Arc<Subscription>,
    pub notifier: Arc<Notifier>,
    pub kind: SubscriptionKind,
    /// Set for `logs` subscriptions
    pub log_filter: Option<LogFilter>,
}

impl SubscriptionEntry {
    pub fn id(&self) -> &str {
        self.subscription.id()
    }

    /// Queue `result` for this subscription's connection
    pub async fn send(&self, result: Value) {
        let event = SubscriptionEvent {
            subscription: self.id().to_string(),
            result,
        };
        if let Err(e) = self.notifier.notify(event).await {
            tracing::debug!(subscription_id = %self.id(), "Dropping event: {}", e);
        }
    }
}

#[derive(Default)]
pub struct RegistryState {
    count: usize,
    entries: HashMap<SubscriptionId, Arc<SubscriptionEntry>>,
}

impl RegistryState {
    pub fn count(&self) -> usize {
        self.count
    }

    /// Remove every entry, returning them
    pub fn drain(&mut self) -> Vec<Arc<SubscriptionEntry>> {
        self.count = 0;
        self.entries.drain().map(|(_, entry)| entry).collect()
    }
}

/// Subscriptions of a single type
#[derive(Default)]
pub struct SubscriptionRegistry {
    state: RwLock<RegistryState>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry. A duplicate id replaces the old entry without
    /// being counted twice.
    pub fn insert(&self, entry: Arc<SubscriptionEntry>) {
        let mut state = self.state.write();
        let id = entry.id().to_string();
        if state.entries.insert(id, entry).is_none() {
            state.count += 1;
        }
    }

    pub fn remove(&self, id: &str) -> Option<Arc<SubscriptionEntry>> {
        if !self.state.read().entries.contains_key(id) {
            return None;
        }

        let mut state = self.state.write();
        let removed = state.entries.remove(id);
        if removed.is_some() {
            state.count -= 1;
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<Arc<SubscriptionEntry>> {
        self.state.read().entries.get(id).cloned()
    }

    pub fn count(&self) -> usize {
        self.state.read().count
    }

    pub fn snapshot(&self) -> Vec<Arc<SubscriptionEntry>> {
        self.state.read().entries.values().cloned().collect()
    }

    /// Queue `result` for every subscription.
    ///
    /// Each send runs on its own task so one full client queue does not
    /// hold up the others.
    pub fn send_all(&self, result: &Value) {
        for entry in self.snapshot() {
            let result = result.clone();
            tokio::spawn(async move { entry.send(result).await });
        }
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write()
    }
}
