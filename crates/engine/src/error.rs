//! Engine error types.

use common::{PaymentId, TransactionId};
use domain::DomainError;
use store::StoreError;
use thiserror::Error;

/// Errors that can occur while reconciling payments and dispatching orders.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Input failed a business rule before any work was done.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The gateway has no payment under this id.
    #[error("Payment not found at gateway: {0}")]
    PaymentNotFound(PaymentId),

    /// The transaction does not exist in the store.
    #[error("Transaction not found: {0}")]
    TransactionNotFound(TransactionId),

    /// A payment was checked before any transaction was recorded for it.
    #[error("No transaction recorded for payment {0}")]
    NoTransactionForPayment(PaymentId),

    /// Another worker holds the transaction's processing lock.
    #[error("Transaction {transaction_id} is locked by another worker")]
    LockContention { transaction_id: TransactionId },

    /// The payment gateway or fulfillment provider misbehaved.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Domain error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Transient failures that another attempt may clear.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Provider(_) | EngineError::LockContention { .. } => true,
            EngineError::Store(error) => {
                !matches!(error, StoreError::TransactionNotFound(_))
            }
            _ => false,
        }
    }
}

/// Convenience type alias for engine results.
pub type Result<T> = std::result::Result<T, EngineError>;
