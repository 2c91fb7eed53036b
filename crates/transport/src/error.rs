//! Error types for group transport operations

use thiserror::Error;

/// Transport-related errors
#[derive(Clone, Debug, Error)]
pub enum TransportError {
    /// The recipient address is not present in the current membership view
    #[error("unknown recipient: {0}")]
    UnknownRecipient(String),

    /// Delivery to the recipient failed
    #[error("delivery failed: {0}")]
    DeliveryFailed(String),

    /// The transport has been shut down
    #[error("transport stopped")]
    Stopped,

    /// Generic error
    #[error("{0}")]
    Other(String),
}
