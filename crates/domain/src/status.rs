//! Gateway status vocabulary mapping.

use store::TransactionStatus;

/// Maps a raw gateway status string onto the internal three-state vocabulary.
///
/// The table is total: every input yields one of `pending`, `approved` or
/// `rejected`. Anything unrecognized maps to `pending`, so an unknown
/// vocabulary word can never trigger order dispatch.
pub fn map_gateway_status(gateway_status: &str) -> TransactionStatus {
    match gateway_status.trim().to_ascii_lowercase().as_str() {
        "approved" | "completed" => TransactionStatus::Approved,
        "rejected" | "cancelled" | "refunded" | "charged_back" => TransactionStatus::Rejected,
        "pending" | "in_process" | "in_mediation" => TransactionStatus::Pending,
        _ => TransactionStatus::Pending,
    }
}
