//! Error types for the environment abstraction.

use thiserror::Error;

/// Errors raised by the environment layer (transport and context).
#[derive(Debug, Error)]
pub enum EnvError {
    /// Publish failed (buffer full, router gone, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Target peer is unreachable (simulated partition)
    #[error("Peer unreachable: {0}")]
    PeerUnreachable(String),

    /// Envelope payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Envelope arrived on a channel this session does not subscribe to
    #[error("Unexpected channel: {0}")]
    UnknownChannel(String),

    /// Operation timed out
    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl EnvError {
    /// Creates a network error.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::NetworkError(msg.into())
    }

    /// Creates an unreachable error.
    pub fn unreachable(peer: impl std::fmt::Display) -> Self {
        Self::PeerUnreachable(peer.to_string())
    }

    /// Creates a serialization error.
    pub fn serialization(err: impl std::fmt::Display) -> Self {
        Self::SerializationError(err.to_string())
    }
}
