use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{PaymentId, TransactionId, WorkerId};

use crate::{
    LineItemRecord, LogEntry, LogLevel, OrderRecord, ProcessingLock, Result, StatusHistoryEntry,
    StoreError, TransactionRecord, TransactionStatus,
};

/// Snapshot of the processing lock table for operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct LockCounts {
    pub total: u64,
    pub active: u64,
    pub expired: u64,
}

/// Core trait for reconciliation persistence.
///
/// Covers the five record families the engine coordinates on:
/// transactions, line items, processing locks, the append-only audit
/// log, and dispatched orders. All implementations must be thread-safe
/// (Send + Sync); the lock and order-created operations must be atomic,
/// since they are what the at-most-once guarantees rest on.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Inserts a new transaction row.
    async fn insert_transaction(&self, transaction: TransactionRecord) -> Result<()>;

    /// Retrieves a transaction by id.
    async fn get_transaction(&self, id: TransactionId) -> Result<Option<TransactionRecord>>;

    /// Retrieves every transaction referencing a payment id.
    ///
    /// A payment may be shared by several transactions (retried
    /// checkout). Results are ordered oldest `created_at` first with id
    /// as the final tie-break, so callers see a deterministic order no
    /// matter what the backend returns.
    async fn get_transactions_for_payment(
        &self,
        payment_id: &PaymentId,
    ) -> Result<Vec<TransactionRecord>>;

    /// Writes a newly observed payment status into every transaction
    /// sharing `payment_id`, appending `history` to each transaction's
    /// metadata status history.
    ///
    /// Returns the number of transactions updated (0 when the payment
    /// id is unknown locally).
    async fn update_payment_status(
        &self,
        payment_id: &PaymentId,
        status: TransactionStatus,
        gateway_status: &str,
        history: StatusHistoryEntry,
    ) -> Result<u64>;

    /// Atomically flips `order_created` from false to true.
    ///
    /// Returns true only for the single caller that performed the
    /// transition; false when the flag was already set (or the
    /// transaction does not exist). This compare-and-set is the
    /// at-most-once primitive for order creation.
    async fn try_mark_order_created(&self, id: TransactionId) -> Result<bool>;

    /// Records the outcome of a processing attempt: increments the
    /// attempt counter and sets (or clears, on `None`) the last
    /// processing error.
    async fn record_processing_result(
        &self,
        id: TransactionId,
        error: Option<&str>,
    ) -> Result<()>;

    /// Lists transactions still awaiting payment confirmation, oldest
    /// first, for the scheduled reconciliation sweep.
    async fn list_pending_transactions(&self, limit: usize) -> Result<Vec<TransactionRecord>>;

    /// Lists approved transactions whose orders were never created,
    /// oldest first, for the unsent-order sweep.
    async fn list_unsent_approved_transactions(
        &self,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>>;

    /// Inserts a batch of line items. The batch is atomic: either all
    /// items are stored or none are.
    async fn insert_line_items(&self, items: Vec<LineItemRecord>) -> Result<()>;

    /// Retrieves a transaction's line items in stored (selection) order.
    async fn get_line_items(&self, transaction_id: TransactionId) -> Result<Vec<LineItemRecord>>;

    /// Attempts to acquire the processing lock for a transaction.
    ///
    /// Succeeds when no lock row exists or the existing row has
    /// expired; the check and write are a single atomic operation.
    /// Returns false when a live lock is held by someone else.
    async fn acquire_lock(
        &self,
        transaction_id: TransactionId,
        locked_by: &WorkerId,
        expires_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Releases the lock if it is still held by `locked_by`.
    ///
    /// A lock reclaimed by another worker after expiry is left alone.
    async fn release_lock(&self, transaction_id: TransactionId, locked_by: &WorkerId)
    -> Result<()>;

    /// Retrieves the current lock row for a transaction, expired or not.
    async fn get_lock(&self, transaction_id: TransactionId) -> Result<Option<ProcessingLock>>;

    /// Deletes every expired lock row. Returns the number deleted.
    async fn clear_expired_locks(&self) -> Result<u64>;

    /// Counts lock rows, split into active and expired.
    async fn lock_counts(&self) -> Result<LockCounts>;

    /// Appends an audit log entry.
    async fn append_log(&self, entry: LogEntry) -> Result<()>;

    /// Retrieves a transaction's audit log, oldest first.
    async fn get_logs(&self, transaction_id: TransactionId) -> Result<Vec<LogEntry>>;

    /// Inserts a dispatched order record.
    async fn insert_order(&self, order: OrderRecord) -> Result<()>;

    /// Finds a prior non-failed order for the same content and service,
    /// from any transaction. Used by the duplicate guard.
    async fn find_order_for_content(
        &self,
        content_code: &str,
        service_id: &str,
    ) -> Result<Option<OrderRecord>>;

    /// Retrieves every order dispatched for a transaction.
    async fn get_orders_for_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<OrderRecord>>;
}

/// Extension trait providing convenience methods for stores.
#[async_trait]
pub trait TransactionStoreExt: TransactionStore {
    /// Retrieves a transaction, failing with `TransactionNotFound` when absent.
    async fn require_transaction(&self, id: TransactionId) -> Result<TransactionRecord> {
        self.get_transaction(id)
            .await?
            .ok_or(StoreError::TransactionNotFound(id))
    }

    /// Appends an `info` audit entry.
    async fn log_info(&self, transaction_id: TransactionId, message: &str) -> Result<()> {
        self.append_log(LogEntry::new(transaction_id, LogLevel::Info, message))
            .await
    }

    /// Appends a `warning` audit entry.
    async fn log_warning(&self, transaction_id: TransactionId, message: &str) -> Result<()> {
        self.append_log(LogEntry::new(transaction_id, LogLevel::Warning, message))
            .await
    }

    /// Appends an `error` audit entry.
    async fn log_error(&self, transaction_id: TransactionId, message: &str) -> Result<()> {
        self.append_log(LogEntry::new(transaction_id, LogLevel::Error, message))
            .await
    }
}

// Blanket implementation for all TransactionStore implementations
impl<T: TransactionStore + ?Sized> TransactionStoreExt for T {}
