//! Subscription handle and worker state machine

use crate::{NotifierError, SubscriptionId};
use rand::RngCore;
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU8, Ordering},
        Arc,
    },
};
use tokio_util::sync::CancellationToken;

/// Called once with the subscription id when a subscription goes away
pub type UnsubscribeCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Generate a `0x`-prefixed id from 16 random bytes
pub fn generate_subscription_id() -> Result<SubscriptionId, NotifierError> {
    let mut bytes = [0u8; 16];
    rand::thread_rng()
        .try_fill_bytes(&mut bytes)
        .map_err(|e| NotifierError::IdGeneration(e.to_string()))?;
    Ok(format!("0x{}", hex::encode(bytes)))
}

/// Lifecycle of the worker driving a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Idle = 0,
    Running = 1,
    Cancelling = 2,
    Stopped = 3,
}

impl From<u8> for WorkerState {
    fn from(value: u8) -> Self {
        match value {
            0 => WorkerState::Idle,
            1 => WorkerState::Running,
            2 => WorkerState::Cancelling,
            _ => WorkerState::Stopped,
        }
    }
}

/// A client subscription owned by one connection
pub struct Subscription {
    id: SubscriptionId,
    token: CancellationToken,
    unsubscribed: AtomicBool,
    on_unsubscribe: UnsubscribeCallback,
    state: AtomicU8,
}

impl Subscription {
    pub fn new(id: SubscriptionId, token: CancellationToken, on_unsubscribe: UnsubscribeCallback) -> Self {
        Self {
            id,
            token,
            unsubscribed: AtomicBool::new(false),
            on_unsubscribe,
            state: AtomicU8::new(WorkerState::Idle as u8),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Cancelled when the subscription or its connection goes away
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn state(&self) -> WorkerState {
        self.state.load(Ordering::SeqCst).into()
    }

    /// Tear the subscription down. Only the first call has any effect.
    pub fn unsubscribe(&self) {
        if self.unsubscribed.swap(true, Ordering::SeqCst) {
            return;
        }

        let _ = self
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |state| {
                match WorkerState::from(state) {
                    WorkerState::Running => Some(WorkerState::Cancelling as u8),
                    WorkerState::Idle => Some(WorkerState::Stopped as u8),
                    _ => None,
                }
            });

        tracing::debug!(subscription_id = %self.id, "Unsubscribing");
        self.token.cancel();
        (self.on_unsubscribe)(&self.id);
    }

    /// Claim the subscription for a worker.
    ///
    /// Returns `false` if another worker holds it or it was torn down.
    pub fn try_start_worker(&self) -> bool {
        self.state
            .compare_exchange(
                WorkerState::Idle as u8,
                WorkerState::Running as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Release the claim taken by [`Subscription::try_start_worker`]
    pub fn finish_worker(&self) {
        let next = if self.token.is_cancelled() || self.unsubscribed.load(Ordering::SeqCst) {
            WorkerState::Stopped
        } else {
            WorkerState::Idle
        };
        let _ = self
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |state| {
                match WorkerState::from(state) {
                    WorkerState::Running | WorkerState::Cancelling => Some(next as u8),
                    _ => None,
                }
            });
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_subscription() -> (Subscription, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let subscription = Subscription::new(
            generate_subscription_id().unwrap(),
            CancellationToken::new(),
            Arc::new(move |_: &str| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        (subscription, calls)
    }

    #[test]
    fn test_subscription_id_shape() {
        for _ in 0..100 {
            let id = generate_subscription_id().unwrap();
            assert_eq!(id.len(), 34);
            assert!(id.starts_with("0x"));
            assert!(id[2..].chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn test_unsubscribe_fires_once() {
        let (subscription, calls) = counting_subscription();

        subscription.unsubscribe();
        subscription.unsubscribe();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(subscription.is_cancelled());
        assert_eq!(subscription.state(), WorkerState::Stopped);
    }

    #[test]
    fn test_single_worker() {
        let (subscription, _) = counting_subscription();

        assert!(subscription.try_start_worker());
        assert!(!subscription.try_start_worker());

        subscription.finish_worker();
        assert_eq!(subscription.state(), WorkerState::Idle);
        assert!(subscription.try_start_worker());
    }

    #[test]
    fn test_unsubscribe_while_running() {
        let (subscription, _) = counting_subscription();
        assert!(subscription.try_start_worker());

        subscription.unsubscribe();
        assert_eq!(subscription.state(), WorkerState::Cancelling);

        subscription.finish_worker();
        assert_eq!(subscription.state(), WorkerState::Stopped);
        assert!(!subscription.try_start_worker());
    }

    #[test]
    fn test_token_cancelled_before_callback() {
        let token = CancellationToken::new();
        let observed = Arc::new(AtomicBool::new(false));
        let seen = observed.clone();
        let watched = token.clone();
        let subscription = Subscription::new(
            "0x01".to_string(),
            token,
            Arc::new(move |_: &str| seen.store(watched.is_cancelled(), Ordering::SeqCst)),
        );

        subscription.unsubscribe();
        assert!(observed.load(Ordering::SeqCst));
    }
}
