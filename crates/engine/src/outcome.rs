//! Result payloads reported by checks, dispatch passes and sweeps.

use common::{PaymentId, TransactionId};
use serde::{Deserialize, Serialize};
use store::TransactionStatus;

/// Outcome of one dispatch pass over a transaction.
///
/// A pass never panics its caller: infrastructure failures fold into
/// `needs_retry`, business rejections into a terminal failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessOutcome {
    pub success: bool,
    pub needs_retry: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcessOutcome {
    /// All line items accounted for and the order flag set.
    pub fn success() -> Self {
        Self {
            success: true,
            needs_retry: false,
            error: None,
        }
    }

    /// Terminal failure. Retrying would reproduce the same result.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            needs_retry: false,
            error: Some(error.into()),
        }
    }

    /// Transient failure worth another attempt.
    pub fn retryable(error: impl Into<String>) -> Self {
        Self {
            success: false,
            needs_retry: true,
            error: Some(error.into()),
        }
    }
}

/// Outcome of reconciling one payment against the gateway.
#[derive(Debug, Clone, Serialize)]
pub struct CheckOutcome {
    pub payment_id: PaymentId,
    /// Raw status string as the gateway reported it.
    pub gateway_status: String,
    pub mapped_status: TransactionStatus,
    /// Whether the mapped status differs from what was stored.
    pub changed: bool,
    /// Primary transaction for this payment (oldest first, then by id).
    pub transaction_id: TransactionId,
    /// Present when the check triggered a dispatch pass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatch: Option<ProcessOutcome>,
}

/// Counters reported by a maintenance sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub scanned: usize,
    pub succeeded: usize,
    pub retried: usize,
    pub failed: usize,
    pub skipped: usize,
}
