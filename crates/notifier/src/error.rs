//! Notifier errors

/// Errors surfaced to the RPC layer by subscription calls
#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    #[error("Unknown subscription type: {0}")]
    UnknownSubscriptionType(String),
    #[error("Invalid params: {0}")]
    InvalidParams(String),
    #[error("Too many topics: {0} (max 4)")]
    TooManyTopics(usize),
    #[error("Failed to generate subscription id: {0}")]
    IdGeneration(String),
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Send failed: {0}")]
    Send(String),
}
