//! Error types for the RPC layer

use meshpub_transport::TransportError;
use thiserror::Error;

/// Result type for RPC operations
pub type NetworkResult<T> = Result<T, NetworkError>;

/// RPC-layer errors
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Underlying transport failure
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The request was not answered within its timeout
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The response channel closed before a response arrived
    #[error("response channel closed: {0}")]
    ChannelClosed(String),

    /// Payload could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),
}
