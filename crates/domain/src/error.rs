//! Domain error types.

use store::StoreError;
use thiserror::Error;

/// Errors that can occur during checkout and domain validation.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Unknown service identifier.
    #[error("Unknown service: {service_id}")]
    ServiceNotFound { service_id: String },

    /// Quantity must be positive.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: i64 },

    /// Amount must be positive.
    #[error("Invalid amount: {amount} cents (must be greater than 0)")]
    InvalidAmount { amount: i64 },

    /// A content-scoped service needs at least one selected content item.
    #[error("No content items supplied for service {service_id}")]
    NoContentItems { service_id: String },

    /// Quantity cannot be split across zero items.
    #[error("Cannot distribute {total} units across zero items")]
    EmptyDistribution { total: u32 },

    /// An error occurred in the persistent store.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    /// Returns true for policy violations that must never be retried.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            DomainError::InvalidQuantity { .. }
                | DomainError::InvalidAmount { .. }
                | DomainError::NoContentItems { .. }
                | DomainError::EmptyDistribution { .. }
        )
    }
}
