use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{LineItemId, Money, OrderRecordId, PaymentId, TransactionId, WorkerId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    ContentType, LineItemRecord, LogEntry, LogLevel, OrderRecord, OrderStatus, ProcessingLock,
    Result, StatusHistoryEntry, StoreError, TransactionRecord, TransactionStatus,
    store::{LockCounts, TransactionStore},
};

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_transaction(row: PgRow) -> Result<TransactionRecord> {
        let status: String = row.try_get("status")?;
        Ok(TransactionRecord {
            id: TransactionId::from_uuid(row.try_get::<Uuid, _>("id")?),
            service_id: row.try_get("service_id")?,
            payment_id: PaymentId::new(row.try_get::<String, _>("payment_id")?),
            status: TransactionStatus::parse(&status).ok_or(StoreError::InvalidColumn {
                column: "status",
                value: status,
            })?,
            payment_status: row.try_get("payment_status")?,
            target_username: row.try_get("target_username")?,
            amount: Money::from_cents(row.try_get::<i64, _>("amount")?),
            quantity: row.try_get::<i32, _>("quantity")? as u32,
            order_created: row.try_get("order_created")?,
            processing_attempts: row.try_get("processing_attempts")?,
            last_processing_error: row.try_get("last_processing_error")?,
            metadata: row.try_get("metadata")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_line_item(row: PgRow) -> Result<LineItemRecord> {
        let content_type: String = row.try_get("content_type")?;
        Ok(LineItemRecord {
            id: LineItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
            transaction_id: TransactionId::from_uuid(row.try_get::<Uuid, _>("transaction_id")?),
            position: row.try_get("position")?,
            content_code: row.try_get("content_code")?,
            content_url: row.try_get("content_url")?,
            content_type: ContentType::parse(&content_type).ok_or(StoreError::InvalidColumn {
                column: "content_type",
                value: content_type,
            })?,
            quantity: row.try_get::<i32, _>("quantity")? as u32,
            selected: row.try_get("selected")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_lock(row: PgRow) -> Result<ProcessingLock> {
        Ok(ProcessingLock {
            transaction_id: TransactionId::from_uuid(row.try_get::<Uuid, _>("transaction_id")?),
            locked_by: WorkerId::new(row.try_get::<String, _>("locked_by")?),
            expires_at: row.try_get("expires_at")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_log(row: PgRow) -> Result<LogEntry> {
        let level: String = row.try_get("level")?;
        Ok(LogEntry {
            id: row.try_get("id")?,
            transaction_id: TransactionId::from_uuid(row.try_get::<Uuid, _>("transaction_id")?),
            level: LogLevel::parse(&level).ok_or(StoreError::InvalidColumn {
                column: "level",
                value: level,
            })?,
            message: row.try_get("message")?,
            metadata: row.try_get("metadata")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_order(row: PgRow) -> Result<OrderRecord> {
        let status: String = row.try_get("status")?;
        Ok(OrderRecord {
            id: OrderRecordId::from_uuid(row.try_get::<Uuid, _>("id")?),
            transaction_id: TransactionId::from_uuid(row.try_get::<Uuid, _>("transaction_id")?),
            line_item_id: LineItemId::from_uuid(row.try_get::<Uuid, _>("line_item_id")?),
            external_order_id: row.try_get("external_order_id")?,
            status: OrderStatus::parse(&status).ok_or(StoreError::InvalidColumn {
                column: "status",
                value: status,
            })?,
            service_id: row.try_get("service_id")?,
            content_code: row.try_get("content_code")?,
            quantity: row.try_get::<i32, _>("quantity")? as u32,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl TransactionStore for PostgresStore {
    async fn insert_transaction(&self, transaction: TransactionRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions
                (id, service_id, payment_id, status, payment_status, target_username,
                 amount, quantity, order_created, processing_attempts,
                 last_processing_error, metadata, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(transaction.id.as_uuid())
        .bind(&transaction.service_id)
        .bind(transaction.payment_id.as_str())
        .bind(transaction.status.as_str())
        .bind(&transaction.payment_status)
        .bind(&transaction.target_username)
        .bind(transaction.amount.cents())
        .bind(transaction.quantity as i32)
        .bind(transaction.order_created)
        .bind(transaction.processing_attempts)
        .bind(&transaction.last_processing_error)
        .bind(&transaction.metadata)
        .bind(transaction.created_at)
        .bind(transaction.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_transaction(&self, id: TransactionId) -> Result<Option<TransactionRecord>> {
        let row = sqlx::query("SELECT * FROM transactions WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_transaction).transpose()
    }

    async fn get_transactions_for_payment(
        &self,
        payment_id: &PaymentId,
    ) -> Result<Vec<TransactionRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM transactions
            WHERE payment_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(payment_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_transaction).collect()
    }

    async fn update_payment_status(
        &self,
        payment_id: &PaymentId,
        status: TransactionStatus,
        gateway_status: &str,
        history: StatusHistoryEntry,
    ) -> Result<u64> {
        let history_json = serde_json::to_value(&history)?;

        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = $2,
                payment_status = $3,
                metadata = jsonb_set(
                    COALESCE(metadata, '{}'::jsonb),
                    '{status_history}',
                    COALESCE(metadata->'status_history', '[]'::jsonb) || $4,
                    true
                ),
                updated_at = NOW()
            WHERE payment_id = $1
            "#,
        )
        .bind(payment_id.as_str())
        .bind(status.as_str())
        .bind(gateway_status)
        .bind(history_json)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn try_mark_order_created(&self, id: TransactionId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET order_created = TRUE, updated_at = NOW()
            WHERE id = $1 AND order_created = FALSE
            "#,
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_processing_result(
        &self,
        id: TransactionId,
        error: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET processing_attempts = processing_attempts + 1,
                last_processing_error = $2,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::TransactionNotFound(id));
        }
        Ok(())
    }

    async fn list_pending_transactions(&self, limit: usize) -> Result<Vec<TransactionRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM transactions
            WHERE status = 'pending'
            ORDER BY created_at ASC, id ASC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_transaction).collect()
    }

    async fn list_unsent_approved_transactions(
        &self,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM transactions
            WHERE status = 'approved' AND order_created = FALSE
            ORDER BY created_at ASC, id ASC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_transaction).collect()
    }

    async fn insert_line_items(&self, items: Vec<LineItemRecord>) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for item in &items {
            sqlx::query(
                r#"
                INSERT INTO transaction_line_items
                    (id, transaction_id, position, content_code, content_url,
                     content_type, quantity, selected, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(item.transaction_id.as_uuid())
            .bind(item.position)
            .bind(&item.content_code)
            .bind(&item.content_url)
            .bind(item.content_type.as_str())
            .bind(item.quantity as i32)
            .bind(item.selected)
            .bind(item.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_line_items(&self, transaction_id: TransactionId) -> Result<Vec<LineItemRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM transaction_line_items
            WHERE transaction_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(transaction_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_line_item).collect()
    }

    async fn acquire_lock(
        &self,
        transaction_id: TransactionId,
        locked_by: &WorkerId,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        // Single atomic statement: insert wins when no row exists, the
        // conditional update wins only when the existing row is expired.
        let result = sqlx::query(
            r#"
            INSERT INTO processing_locks (transaction_id, locked_by, expires_at, created_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (transaction_id) DO UPDATE
            SET locked_by = EXCLUDED.locked_by,
                expires_at = EXCLUDED.expires_at,
                created_at = NOW()
            WHERE processing_locks.expires_at <= NOW()
            "#,
        )
        .bind(transaction_id.as_uuid())
        .bind(locked_by.as_str())
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        let acquired = result.rows_affected() == 1;
        if !acquired {
            tracing::debug!(%transaction_id, "lock held by another worker");
        }
        Ok(acquired)
    }

    async fn release_lock(
        &self,
        transaction_id: TransactionId,
        locked_by: &WorkerId,
    ) -> Result<()> {
        sqlx::query("DELETE FROM processing_locks WHERE transaction_id = $1 AND locked_by = $2")
            .bind(transaction_id.as_uuid())
            .bind(locked_by.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn get_lock(&self, transaction_id: TransactionId) -> Result<Option<ProcessingLock>> {
        let row = sqlx::query("SELECT * FROM processing_locks WHERE transaction_id = $1")
            .bind(transaction_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_lock).transpose()
    }

    async fn clear_expired_locks(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM processing_locks WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected();
        if deleted > 0 {
            tracing::info!(deleted, "cleared expired processing locks");
        }
        Ok(deleted)
    }

    async fn lock_counts(&self) -> Result<LockCounts> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE expires_at > NOW()) AS active
            FROM processing_locks
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let total = row.try_get::<i64, _>("total")? as u64;
        let active = row.try_get::<i64, _>("active")? as u64;
        Ok(LockCounts {
            total,
            active,
            expired: total - active,
        })
    }

    async fn append_log(&self, entry: LogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO processing_logs (id, transaction_id, level, message, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.id)
        .bind(entry.transaction_id.as_uuid())
        .bind(entry.level.as_str())
        .bind(&entry.message)
        .bind(&entry.metadata)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_logs(&self, transaction_id: TransactionId) -> Result<Vec<LogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM processing_logs
            WHERE transaction_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(transaction_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_log).collect()
    }

    async fn insert_order(&self, order: OrderRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders
                (id, transaction_id, line_item_id, external_order_id, status,
                 service_id, content_code, quantity, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.transaction_id.as_uuid())
        .bind(order.line_item_id.as_uuid())
        .bind(&order.external_order_id)
        .bind(order.status.as_str())
        .bind(&order.service_id)
        .bind(&order.content_code)
        .bind(order.quantity as i32)
        .bind(order.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_order_for_content(
        &self,
        content_code: &str,
        service_id: &str,
    ) -> Result<Option<OrderRecord>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM orders
            WHERE content_code = $1 AND service_id = $2 AND status <> 'failed'
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(content_code)
        .bind(service_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn get_orders_for_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<OrderRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM orders
            WHERE transaction_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(transaction_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }
}
