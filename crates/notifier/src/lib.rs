//! Notifier - Ethereum-style subscriptions for a UTXO node
//!
//! Turns the node's long-poll log interface into push notifications:
//! - Per-connection delivery pipeline with ack ordering ([`Notifier`])
//! - Subscription bookkeeping and newHeads fan-out ([`Agent`])
//! - One long-polling worker per `logs` subscription ([`LogPollWorker`])
//! - Adaptive backoff driven by a rolling call window

pub mod agent;
pub mod backoff;
pub mod error;
pub mod filter;
pub mod log_worker;
#[allow(clippy::module_inception)]
pub mod notifier;
pub mod registry;
pub mod rolling;
pub mod subscription;
pub mod types;

#[cfg(test)]
mod tests;

pub use agent::{Agent, AgentConfig};
pub use error::NotifierError;
pub use filter::LogFilter;
pub use log_worker::{LogPollConfig, LogPollWorker};
pub use notifier::{EventSink, Notifier, NotifierConfig};
pub use registry::{SubscriptionEntry, SubscriptionRegistry};
pub use rolling::RollingWindowLimiter;
pub use subscription::{generate_subscription_id, Subscription, UnsubscribeCallback, WorkerState};
pub use types::{
    AddressParam, EthLog, JsonRpcNotification, LogSubscriptionParams, NewHead, SubscriptionEvent,
    SubscriptionId, SubscriptionKind, SubscriptionRequest,
};
