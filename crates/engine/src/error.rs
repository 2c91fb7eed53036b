//! Error types for the federation engine

use meshpub_network::NetworkError;
use meshpub_transport::TransportError;
use thiserror::Error;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Federation engine errors
///
/// Subscription outcomes are never errors; they surface as status and
/// commentary on the records. This enum covers lifecycle failures only.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Underlying transport failure
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// RPC-layer failure
    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
