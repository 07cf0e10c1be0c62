//! Per-transaction processing locks.
//!
//! Dispatch must be serialized per transaction across workers. Locks
//! carry a TTL so a crashed worker cannot park a transaction forever.

use std::future::Future;

use chrono::{Duration, Utc};
use common::{TransactionId, WorkerId};
use store::{LockCounts, TransactionStore};

use crate::error::{EngineError, Result};

/// Acquires and releases the exclusive dispatch lock for a transaction.
pub struct LockManager<S> {
    store: S,
    worker_id: WorkerId,
    ttl: Duration,
}

impl<S> LockManager<S>
where
    S: TransactionStore,
{
    pub fn new(store: S, worker_id: WorkerId, ttl: Duration) -> Self {
        Self {
            store,
            worker_id,
            ttl,
        }
    }

    pub fn worker_id(&self) -> &WorkerId {
        &self.worker_id
    }

    /// Runs `f` while holding the transaction's lock.
    ///
    /// The lock is released whether `f`'s outcome is good or bad. If
    /// another worker holds a live lock, `f` never runs and the call
    /// fails with [`EngineError::LockContention`].
    pub async fn with_lock<F, Fut, T>(&self, transaction_id: TransactionId, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let expires_at = Utc::now() + self.ttl;
        let acquired = self
            .store
            .acquire_lock(transaction_id, &self.worker_id, expires_at)
            .await?;
        if !acquired {
            metrics::counter!("lock_contention_total").increment(1);
            return Err(EngineError::LockContention { transaction_id });
        }

        let value = f().await;

        // Release failures leave the lock to expire on its own.
        if let Err(error) = self.store.release_lock(transaction_id, &self.worker_id).await {
            tracing::warn!(%transaction_id, %error, "failed to release processing lock");
        }

        Ok(value)
    }

    /// Removes locks past their expiry. Returns how many were deleted.
    pub async fn clear_expired(&self) -> Result<u64> {
        Ok(self.store.clear_expired_locks().await?)
    }

    /// Counts total, active and expired locks.
    pub async fn status(&self) -> Result<LockCounts> {
        Ok(self.store.lock_counts().await?)
    }
}
