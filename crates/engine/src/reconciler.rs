//! Payment reconciliation.
//!
//! Reads a payment's status from the gateway, writes it onto every
//! transaction sharing that payment, and triggers the dispatch
//! pipeline when the payment transitions to approved.

use std::collections::HashSet;

use chrono::Duration;
use common::{PaymentId, TransactionId, WorkerId};
use domain::{ServiceCatalog, map_gateway_status};
use store::{
    StatusHistoryEntry, TransactionRecord, TransactionStatus, TransactionStore,
    TransactionStoreExt,
};

use crate::dispatcher::FulfillmentDispatcher;
use crate::error::{EngineError, Result};
use crate::gateway::PaymentGateway;
use crate::lock::LockManager;
use crate::orchestrator::DispatchOrchestrator;
use crate::outcome::{CheckOutcome, ProcessOutcome, SweepSummary};

/// Coordinates gateway checks, status reconciliation and dispatch.
pub struct PaymentReconciler<S, G, D> {
    store: S,
    gateway: G,
    orchestrator: DispatchOrchestrator<S, D>,
    locks: LockManager<S>,
}

impl<S, G, D> PaymentReconciler<S, G, D>
where
    S: TransactionStore + Clone,
    G: PaymentGateway,
    D: FulfillmentDispatcher,
{
    pub fn new(
        store: S,
        gateway: G,
        dispatcher: D,
        catalog: ServiceCatalog,
        worker_id: WorkerId,
        lock_ttl: Duration,
    ) -> Self {
        let orchestrator = DispatchOrchestrator::new(store.clone(), dispatcher, catalog);
        let locks = LockManager::new(store.clone(), worker_id, lock_ttl);
        Self {
            store,
            gateway,
            orchestrator,
            locks,
        }
    }

    pub fn orchestrator(&self) -> &DispatchOrchestrator<S, D> {
        &self.orchestrator
    }

    pub fn locks(&self) -> &LockManager<S> {
        &self.locks
    }

    /// Fetches the payment's gateway status and reconciles local state.
    ///
    /// Dispatch fires only on a transition into approved, and only when
    /// no transaction on the payment has orders yet. The outcome's
    /// `dispatch` field stays empty when another worker already holds
    /// the transaction's lock.
    #[tracing::instrument(skip(self), fields(payment_id = %payment_id))]
    pub async fn check_payment_status(&self, payment_id: &PaymentId) -> Result<CheckOutcome> {
        metrics::counter!("payment_checks_total").increment(1);

        let info = self.gateway.get_payment_status(payment_id).await?;
        let mapped = map_gateway_status(&info.status);

        let transactions = self.store.get_transactions_for_payment(payment_id).await?;
        let Some(first) = select_primary(&transactions) else {
            tracing::warn!(gateway_status = %info.status, "payment has no recorded transaction");
            return Err(EngineError::NoTransactionForPayment(payment_id.clone()));
        };
        let transaction_id = first.id;

        let changed = first.status != mapped;
        let raw_changed = first.payment_status != info.status;
        if changed || raw_changed {
            let history = StatusHistoryEntry::new(mapped, &info.status);
            let updated = self
                .store
                .update_payment_status(payment_id, mapped, &info.status, history)
                .await?;
            tracing::info!(gateway_status = %info.status, status = %mapped, updated, "payment status updated");
            let _ = self
                .store
                .log_info(
                    transaction_id,
                    &format!(
                        "gateway reports {}, mapped to {} across {updated} transaction(s)",
                        info.status, mapped
                    ),
                )
                .await;
        }

        let mut dispatch = None;
        if changed
            && mapped == TransactionStatus::Approved
            && !transactions.iter().any(|transaction| transaction.order_created)
        {
            dispatch = self.trigger_dispatch(transaction_id).await?;
        }

        Ok(CheckOutcome {
            payment_id: payment_id.clone(),
            gateway_status: info.status,
            mapped_status: mapped,
            changed,
            transaction_id,
            dispatch,
        })
    }

    /// Runs the dispatch pipeline for one transaction under its lock.
    ///
    /// Skips the approval-transition guard, so operators can re-drive a
    /// stuck transaction. Contention surfaces as an error.
    #[tracing::instrument(skip(self), fields(transaction_id = %transaction_id))]
    pub async fn force_process(&self, transaction_id: TransactionId) -> Result<ProcessOutcome> {
        if self.store.get_transaction(transaction_id).await?.is_none() {
            return Err(EngineError::TransactionNotFound(transaction_id));
        }
        self.locks
            .with_lock(transaction_id, || {
                self.orchestrator.process_transaction(transaction_id)
            })
            .await
    }

    /// Re-checks the gateway for payments whose transactions are still
    /// pending. Each payment is checked once per sweep.
    #[tracing::instrument(skip(self))]
    pub async fn process_pending_payments(&self, limit: usize) -> Result<SweepSummary> {
        let pending = self.store.list_pending_transactions(limit).await?;
        let mut summary = SweepSummary::default();
        let mut seen: HashSet<PaymentId> = HashSet::new();

        for transaction in pending {
            if !seen.insert(transaction.payment_id.clone()) {
                continue;
            }
            summary.scanned += 1;
            match self.check_payment_status(&transaction.payment_id).await {
                Ok(outcome) => tally_dispatch(&mut summary, outcome.dispatch),
                Err(error) => {
                    tracing::warn!(payment_id = %transaction.payment_id, %error, "pending payment check failed");
                    if error.is_retryable() {
                        summary.retried += 1;
                    } else {
                        summary.failed += 1;
                    }
                }
            }
        }

        tracing::info!(?summary, "pending payment sweep finished");
        Ok(summary)
    }

    /// Dispatches approved transactions whose orders were never created,
    /// e.g. after a crash between approval and dispatch.
    #[tracing::instrument(skip(self))]
    pub async fn process_unsent_orders(&self, limit: usize) -> Result<SweepSummary> {
        let unsent = self.store.list_unsent_approved_transactions(limit).await?;
        let mut summary = SweepSummary::default();

        for transaction in unsent {
            summary.scanned += 1;
            match self
                .locks
                .with_lock(transaction.id, || {
                    self.orchestrator.process_transaction(transaction.id)
                })
                .await
            {
                Ok(outcome) => tally_dispatch(&mut summary, Some(outcome)),
                Err(EngineError::LockContention { .. }) => summary.skipped += 1,
                Err(error) => {
                    tracing::warn!(transaction_id = %transaction.id, %error, "unsent order sweep failed");
                    if error.is_retryable() {
                        summary.retried += 1;
                    } else {
                        summary.failed += 1;
                    }
                }
            }
        }

        tracing::info!(?summary, "unsent order sweep finished");
        Ok(summary)
    }

    async fn trigger_dispatch(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Option<ProcessOutcome>> {
        match self
            .locks
            .with_lock(transaction_id, || {
                self.orchestrator.process_transaction(transaction_id)
            })
            .await
        {
            Ok(outcome) => Ok(Some(outcome)),
            Err(EngineError::LockContention { .. }) => {
                tracing::debug!(%transaction_id, "dispatch already running elsewhere");
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }
}

/// Oldest transaction first; ties broken by id so every worker picks
/// the same one.
fn select_primary(transactions: &[TransactionRecord]) -> Option<&TransactionRecord> {
    transactions.iter().min_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    })
}

fn tally_dispatch(summary: &mut SweepSummary, dispatch: Option<ProcessOutcome>) {
    match dispatch {
        Some(outcome) if outcome.success => summary.succeeded += 1,
        Some(outcome) if outcome.needs_retry => summary.retried += 1,
        Some(_) => summary.failed += 1,
        None => summary.skipped += 1,
    }
}
