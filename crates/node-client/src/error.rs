//! Node client errors

/// Errors returned by a [`crate::ChainClient`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Node RPC error {code}: {message}")]
    Rpc { code: i32, message: String },
    #[error("Failed to decode node response: {0}")]
    Decode(String),
    #[error("Invalid client configuration: {0}")]
    Config(String),
}

impl From<jsonrpsee::core::ClientError> for ClientError {
    fn from(error: jsonrpsee::core::ClientError) -> Self {
        match error {
            jsonrpsee::core::ClientError::Call(object) => ClientError::Rpc {
                code: object.code(),
                message: object.message().to_string(),
            },
            jsonrpsee::core::ClientError::ParseError(e) => ClientError::Decode(e.to_string()),
            other => ClientError::Transport(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(error: serde_json::Error) -> Self {
        ClientError::Decode(error.to_string())
    }
}
