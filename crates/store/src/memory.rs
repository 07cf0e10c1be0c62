use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{PaymentId, TransactionId, WorkerId};
use tokio::sync::RwLock;

use crate::{
    LineItemRecord, LogEntry, OrderRecord, ProcessingLock, Result, StatusHistoryEntry, StoreError,
    TransactionRecord, TransactionStatus,
    store::{LockCounts, TransactionStore},
};

#[derive(Default)]
struct InMemoryState {
    transactions: HashMap<TransactionId, TransactionRecord>,
    line_items: Vec<LineItemRecord>,
    locks: HashMap<TransactionId, ProcessingLock>,
    logs: Vec<LogEntry>,
    orders: Vec<OrderRecord>,
    fail_on_order_lookup: bool,
    fail_on_line_item_insert: bool,
}

/// In-memory store implementation for testing.
///
/// Provides the same interface and atomicity guarantees as the
/// PostgreSQL implementation; every mutation happens under a single
/// write guard, which is what makes the lock and order-created
/// operations atomic here.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<InMemoryState>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `find_order_for_content` fail, simulating a store outage
    /// during duplicate checks.
    pub async fn set_fail_on_order_lookup(&self, fail: bool) {
        self.state.write().await.fail_on_order_lookup = fail;
    }

    /// Makes `insert_line_items` fail, simulating a partial write at
    /// checkout time.
    pub async fn set_fail_on_line_item_insert(&self, fail: bool) {
        self.state.write().await.fail_on_line_item_insert = fail;
    }

    /// Returns the total number of stored transactions.
    pub async fn transaction_count(&self) -> usize {
        self.state.read().await.transactions.len()
    }

    /// Returns the total number of dispatched order records.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Returns the total number of audit log entries.
    pub async fn log_count(&self) -> usize {
        self.state.read().await.logs.len()
    }

    /// Clears all stored records.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.transactions.clear();
        state.line_items.clear();
        state.locks.clear();
        state.logs.clear();
        state.orders.clear();
    }
}

fn push_history(metadata: &mut serde_json::Value, entry: &StatusHistoryEntry) -> Result<()> {
    let entry_value = serde_json::to_value(entry)?;
    if !metadata.is_object() {
        *metadata = serde_json::Value::Object(serde_json::Map::new());
    }
    if let serde_json::Value::Object(map) = metadata {
        let history = map
            .entry("status_history")
            .or_insert_with(|| serde_json::Value::Array(Vec::new()));
        match history {
            serde_json::Value::Array(entries) => entries.push(entry_value),
            other => *other = serde_json::Value::Array(vec![entry_value]),
        }
    }
    Ok(())
}

#[async_trait]
impl TransactionStore for InMemoryStore {
    async fn insert_transaction(&self, transaction: TransactionRecord) -> Result<()> {
        let mut state = self.state.write().await;
        state.transactions.insert(transaction.id, transaction);
        Ok(())
    }

    async fn get_transaction(&self, id: TransactionId) -> Result<Option<TransactionRecord>> {
        let state = self.state.read().await;
        Ok(state.transactions.get(&id).cloned())
    }

    async fn get_transactions_for_payment(
        &self,
        payment_id: &PaymentId,
    ) -> Result<Vec<TransactionRecord>> {
        let state = self.state.read().await;
        let mut transactions: Vec<_> = state
            .transactions
            .values()
            .filter(|t| &t.payment_id == payment_id)
            .cloned()
            .collect();
        transactions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(transactions)
    }

    async fn update_payment_status(
        &self,
        payment_id: &PaymentId,
        status: TransactionStatus,
        gateway_status: &str,
        history: StatusHistoryEntry,
    ) -> Result<u64> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let mut updated = 0;
        for transaction in state.transactions.values_mut() {
            if &transaction.payment_id == payment_id {
                transaction.status = status;
                transaction.payment_status = gateway_status.to_owned();
                transaction.updated_at = now;
                push_history(&mut transaction.metadata, &history)?;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn try_mark_order_created(&self, id: TransactionId) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.transactions.get_mut(&id) {
            Some(transaction) if !transaction.order_created => {
                transaction.order_created = true;
                transaction.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_processing_result(
        &self,
        id: TransactionId,
        error: Option<&str>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let transaction = state
            .transactions
            .get_mut(&id)
            .ok_or(StoreError::TransactionNotFound(id))?;
        transaction.processing_attempts += 1;
        transaction.last_processing_error = error.map(str::to_owned);
        transaction.updated_at = Utc::now();
        Ok(())
    }

    async fn list_pending_transactions(&self, limit: usize) -> Result<Vec<TransactionRecord>> {
        let state = self.state.read().await;
        let mut pending: Vec<_> = state
            .transactions
            .values()
            .filter(|t| t.status.is_pending())
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        pending.truncate(limit);
        Ok(pending)
    }

    async fn list_unsent_approved_transactions(
        &self,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>> {
        let state = self.state.read().await;
        let mut unsent: Vec<_> = state
            .transactions
            .values()
            .filter(|t| t.status.is_approved() && !t.order_created)
            .cloned()
            .collect();
        unsent.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        unsent.truncate(limit);
        Ok(unsent)
    }

    async fn insert_line_items(&self, items: Vec<LineItemRecord>) -> Result<()> {
        let mut state = self.state.write().await;
        if state.fail_on_line_item_insert {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        state.line_items.extend(items);
        Ok(())
    }

    async fn get_line_items(&self, transaction_id: TransactionId) -> Result<Vec<LineItemRecord>> {
        let state = self.state.read().await;
        let mut items: Vec<_> = state
            .line_items
            .iter()
            .filter(|i| i.transaction_id == transaction_id)
            .cloned()
            .collect();
        items.sort_by_key(|i| i.position);
        Ok(items)
    }

    async fn acquire_lock(
        &self,
        transaction_id: TransactionId,
        locked_by: &WorkerId,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        if let Some(existing) = state.locks.get(&transaction_id)
            && !existing.is_expired(now)
        {
            return Ok(false);
        }
        state.locks.insert(
            transaction_id,
            ProcessingLock {
                transaction_id,
                locked_by: locked_by.clone(),
                expires_at,
                created_at: now,
            },
        );
        Ok(true)
    }

    async fn release_lock(
        &self,
        transaction_id: TransactionId,
        locked_by: &WorkerId,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.locks.get(&transaction_id)
            && &existing.locked_by == locked_by
        {
            state.locks.remove(&transaction_id);
        }
        Ok(())
    }

    async fn get_lock(&self, transaction_id: TransactionId) -> Result<Option<ProcessingLock>> {
        let state = self.state.read().await;
        Ok(state.locks.get(&transaction_id).cloned())
    }

    async fn clear_expired_locks(&self) -> Result<u64> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let before = state.locks.len();
        state.locks.retain(|_, lock| !lock.is_expired(now));
        Ok((before - state.locks.len()) as u64)
    }

    async fn lock_counts(&self) -> Result<LockCounts> {
        let state = self.state.read().await;
        let now = Utc::now();
        let total = state.locks.len() as u64;
        let expired = state
            .locks
            .values()
            .filter(|lock| lock.is_expired(now))
            .count() as u64;
        Ok(LockCounts {
            total,
            active: total - expired,
            expired,
        })
    }

    async fn append_log(&self, entry: LogEntry) -> Result<()> {
        let mut state = self.state.write().await;
        state.logs.push(entry);
        Ok(())
    }

    async fn get_logs(&self, transaction_id: TransactionId) -> Result<Vec<LogEntry>> {
        let state = self.state.read().await;
        Ok(state
            .logs
            .iter()
            .filter(|e| e.transaction_id == transaction_id)
            .cloned()
            .collect())
    }

    async fn insert_order(&self, order: OrderRecord) -> Result<()> {
        let mut state = self.state.write().await;
        state.orders.push(order);
        Ok(())
    }

    async fn find_order_for_content(
        &self,
        content_code: &str,
        service_id: &str,
    ) -> Result<Option<OrderRecord>> {
        let state = self.state.read().await;
        if state.fail_on_order_lookup {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(state
            .orders
            .iter()
            .find(|o| {
                o.content_code == content_code
                    && o.service_id == service_id
                    && !o.status.is_failed()
            })
            .cloned())
    }

    async fn get_orders_for_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<OrderRecord>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .iter()
            .filter(|o| o.transaction_id == transaction_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ContentType, OrderStatus, store::TransactionStoreExt};
    use common::{LineItemId, Money};

    fn create_test_transaction(payment_id: &str) -> TransactionRecord {
        TransactionRecord::new(
            "instagram-likes",
            PaymentId::new(payment_id),
            "someuser",
            Money::from_cents(1990),
            100,
        )
    }

    #[tokio::test]
    async fn insert_and_get_transaction() {
        let store = InMemoryStore::new();
        let transaction = create_test_transaction("pay-1");
        let id = transaction.id;

        store.insert_transaction(transaction).await.unwrap();

        let loaded = store.get_transaction(id).await.unwrap().unwrap();
        assert_eq!(loaded.id, id);
        assert_eq!(loaded.status, TransactionStatus::Pending);
        assert!(!loaded.order_created);
    }

    #[tokio::test]
    async fn transactions_for_payment_ordered_oldest_first() {
        let store = InMemoryStore::new();
        let mut older = create_test_transaction("pay-dup");
        older.created_at = Utc::now() - chrono::Duration::minutes(10);
        let older_id = older.id;
        let newer = create_test_transaction("pay-dup");

        // Insert newest first so ordering cannot come from insertion order
        store.insert_transaction(newer).await.unwrap();
        store.insert_transaction(older).await.unwrap();

        let found = store
            .get_transactions_for_payment(&PaymentId::new("pay-dup"))
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, older_id);
    }

    #[tokio::test]
    async fn update_payment_status_touches_every_sharing_transaction() {
        let store = InMemoryStore::new();
        let t1 = create_test_transaction("pay-dup");
        let t2 = create_test_transaction("pay-dup");
        let other = create_test_transaction("pay-other");
        let other_id = other.id;
        store.insert_transaction(t1).await.unwrap();
        store.insert_transaction(t2).await.unwrap();
        store.insert_transaction(other).await.unwrap();

        let updated = store
            .update_payment_status(
                &PaymentId::new("pay-dup"),
                TransactionStatus::Approved,
                "approved",
                StatusHistoryEntry::new(TransactionStatus::Approved, "approved"),
            )
            .await
            .unwrap();
        assert_eq!(updated, 2);

        for transaction in store
            .get_transactions_for_payment(&PaymentId::new("pay-dup"))
            .await
            .unwrap()
        {
            assert_eq!(transaction.status, TransactionStatus::Approved);
            let history = &transaction.metadata["status_history"];
            assert_eq!(history.as_array().unwrap().len(), 1);
        }

        let untouched = store.get_transaction(other_id).await.unwrap().unwrap();
        assert_eq!(untouched.status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn try_mark_order_created_flips_exactly_once() {
        let store = InMemoryStore::new();
        let transaction = create_test_transaction("pay-1");
        let id = transaction.id;
        store.insert_transaction(transaction).await.unwrap();

        assert!(store.try_mark_order_created(id).await.unwrap());
        assert!(!store.try_mark_order_created(id).await.unwrap());

        let loaded = store.get_transaction(id).await.unwrap().unwrap();
        assert!(loaded.order_created);
    }

    #[tokio::test]
    async fn record_processing_result_tracks_attempts() {
        let store = InMemoryStore::new();
        let transaction = create_test_transaction("pay-1");
        let id = transaction.id;
        store.insert_transaction(transaction).await.unwrap();

        store
            .record_processing_result(id, Some("provider timeout"))
            .await
            .unwrap();
        let loaded = store.get_transaction(id).await.unwrap().unwrap();
        assert_eq!(loaded.processing_attempts, 1);
        assert_eq!(loaded.last_processing_error.as_deref(), Some("provider timeout"));

        store.record_processing_result(id, None).await.unwrap();
        let loaded = store.get_transaction(id).await.unwrap().unwrap();
        assert_eq!(loaded.processing_attempts, 2);
        assert!(loaded.last_processing_error.is_none());
    }

    #[tokio::test]
    async fn acquire_lock_blocks_second_worker() {
        let store = InMemoryStore::new();
        let id = TransactionId::new();
        let expires = Utc::now() + chrono::Duration::minutes(5);

        assert!(
            store
                .acquire_lock(id, &WorkerId::new("w1"), expires)
                .await
                .unwrap()
        );
        assert!(
            !store
                .acquire_lock(id, &WorkerId::new("w2"), expires)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn expired_lock_can_be_reclaimed() {
        let store = InMemoryStore::new();
        let id = TransactionId::new();

        let already_expired = Utc::now() - chrono::Duration::seconds(1);
        assert!(
            store
                .acquire_lock(id, &WorkerId::new("w1"), already_expired)
                .await
                .unwrap()
        );

        let fresh = Utc::now() + chrono::Duration::minutes(5);
        assert!(
            store
                .acquire_lock(id, &WorkerId::new("w2"), fresh)
                .await
                .unwrap()
        );

        let lock = store.get_lock(id).await.unwrap().unwrap();
        assert_eq!(lock.locked_by, WorkerId::new("w2"));
    }

    #[tokio::test]
    async fn release_lock_ignores_foreign_owner() {
        let store = InMemoryStore::new();
        let id = TransactionId::new();
        let expires = Utc::now() + chrono::Duration::minutes(5);

        store
            .acquire_lock(id, &WorkerId::new("w1"), expires)
            .await
            .unwrap();

        // w2 never held this lock, so releasing must be a no-op
        store.release_lock(id, &WorkerId::new("w2")).await.unwrap();
        assert!(store.get_lock(id).await.unwrap().is_some());

        store.release_lock(id, &WorkerId::new("w1")).await.unwrap();
        assert!(store.get_lock(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clear_expired_locks_reports_deleted_count() {
        let store = InMemoryStore::new();
        let expired = Utc::now() - chrono::Duration::seconds(10);
        let live = Utc::now() + chrono::Duration::minutes(5);

        store
            .acquire_lock(TransactionId::new(), &WorkerId::new("w1"), expired)
            .await
            .unwrap();
        store
            .acquire_lock(TransactionId::new(), &WorkerId::new("w1"), expired)
            .await
            .unwrap();
        store
            .acquire_lock(TransactionId::new(), &WorkerId::new("w1"), live)
            .await
            .unwrap();

        let counts = store.lock_counts().await.unwrap();
        assert_eq!(counts.total, 3);
        assert_eq!(counts.active, 1);
        assert_eq!(counts.expired, 2);

        assert_eq!(store.clear_expired_locks().await.unwrap(), 2);
        let counts = store.lock_counts().await.unwrap();
        assert_eq!(counts.total, 1);
        assert_eq!(counts.expired, 0);
    }

    #[tokio::test]
    async fn line_items_returned_in_position_order() {
        let store = InMemoryStore::new();
        let transaction_id = TransactionId::new();

        let items = vec![
            LineItemRecord::new(transaction_id, 2, "C3", "u3", ContentType::Post, 3),
            LineItemRecord::new(transaction_id, 0, "C1", "u1", ContentType::Post, 4),
            LineItemRecord::new(transaction_id, 1, "C2", "u2", ContentType::Post, 4),
        ];
        store.insert_line_items(items).await.unwrap();

        let loaded = store.get_line_items(transaction_id).await.unwrap();
        let codes: Vec<_> = loaded.iter().map(|i| i.content_code.as_str()).collect();
        assert_eq!(codes, vec!["C1", "C2", "C3"]);
    }

    #[tokio::test]
    async fn find_order_skips_failed_orders() {
        let store = InMemoryStore::new();
        let transaction_id = TransactionId::new();

        let mut failed = OrderRecord::new(
            transaction_id,
            LineItemId::new(),
            "instagram-likes",
            "ABC",
            10,
        );
        failed.status = OrderStatus::Failed;
        store.insert_order(failed).await.unwrap();

        assert!(
            store
                .find_order_for_content("ABC", "instagram-likes")
                .await
                .unwrap()
                .is_none()
        );

        let sent = OrderRecord::new(
            transaction_id,
            LineItemId::new(),
            "instagram-likes",
            "ABC",
            10,
        )
        .sent("prov-1");
        store.insert_order(sent).await.unwrap();

        let found = store
            .find_order_for_content("ABC", "instagram-likes")
            .await
            .unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().external_order_id.as_deref(), Some("prov-1"));
    }

    #[tokio::test]
    async fn order_lookup_failure_switch_surfaces_error() {
        let store = InMemoryStore::new();
        store.set_fail_on_order_lookup(true).await;

        let result = store.find_order_for_content("ABC", "instagram-likes").await;
        assert!(matches!(result, Err(StoreError::Database(_))));
    }

    #[tokio::test]
    async fn require_transaction_fails_for_unknown_id() {
        let store = InMemoryStore::new();
        let id = TransactionId::new();

        let result = store.require_transaction(id).await;
        assert!(matches!(result, Err(StoreError::TransactionNotFound(_))));
    }
}
