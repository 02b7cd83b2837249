//! Error taxonomy for the order manager.

use thiserror::Error;

/// Errors raised by the order manager core.
///
/// Every variant maps onto one row of the error taxonomy: transient chain
/// errors are retried by the trigger loop, validation errors drop the
/// offending operation and flag a side for divergence, authentication
/// errors are fatal, reconciliation ambiguity triggers a fail-safe
/// regenerate, and persistence failures are queued for retry.
#[derive(Error, Debug, Clone)]
pub enum OrderManagerError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("grid slot not found: {0}")]
    SlotNotFound(String),

    #[error("chain order not found: {0}")]
    OrderNotFound(String),

    #[error("price {price} out of configured range [{lower}, {upper}]")]
    PriceOutOfRange { price: f64, lower: f64, upper: f64 },

    #[error("transient chain error: {0}")]
    Transient(String),

    #[error("validation error on side {side:?}: {reason}")]
    Validation { side: crate::model::Side, reason: String },

    #[error("authentication error: {0}")]
    Authentication(String),

    #[error("reconciliation ambiguity: {0}")]
    ReconciliationAmbiguity(String),

    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("insufficient funds on side {side:?}: required {required}, available {available}")]
    InsufficientFunds {
        side: crate::model::Side,
        required: f64,
        available: f64,
    },
}

impl From<std::io::Error> for OrderManagerError {
    fn from(err: std::io::Error) -> Self {
        OrderManagerError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for OrderManagerError {
    fn from(err: serde_json::Error) -> Self {
        OrderManagerError::Persistence(err.to_string())
    }
}

/// Result alias threaded through the order manager.
pub type EngineResult<T> = std::result::Result<T, OrderManagerError>;
