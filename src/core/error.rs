//! Error handling - Hierarchical, zero-cost errors

use thiserror::Error;

use crate::core::types::Symbol;

pub type Result<T> = std::result::Result<T, Error>;

/// paperfill error hierarchy.
///
/// Everything engine-internal is recoverable: in-memory state stays
/// authoritative and keeps operating even when the remote store is down.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration errors
    #[error("Config: {0}")]
    Config(String),

    /// Rejected order parameters (non-positive quantity/price, missing
    /// limit price). Never enters the order store.
    #[error("Validation: {0}")]
    Validation(String),

    /// Balance validator refused the fill; the order is cancelled.
    #[error("Insufficient balance for order {order_id}")]
    InsufficientBalance { order_id: String },

    /// Market order submitted before any price tick arrived.
    #[error("No market price seen yet for {0}")]
    NoMarketPrice(Symbol),

    /// No open position for the symbol.
    #[error("No open position for {0}")]
    PositionNotFound(Symbol),

    /// Remote store rejected a persistence call.
    #[error("Persistence: {0}")]
    Persistence(String),

    /// Network/IO errors
    #[error("Network: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}
