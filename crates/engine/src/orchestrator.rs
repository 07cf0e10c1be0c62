//! Dispatch orchestration.
//!
//! Turns an approved transaction into provider orders, one per line
//! item, and flips the transaction's order flag exactly once. Callers
//! are expected to hold the transaction's processing lock.

use common::TransactionId;
use domain::{ServiceCatalog, ServiceDefinition, instagram};
use store::{
    ContentType, LineItemRecord, OrderRecord, TransactionRecord, TransactionStatus,
    TransactionStore, TransactionStoreExt,
};

use crate::dispatcher::{FulfillmentDispatcher, FulfillmentRequest};
use crate::duplicate::DuplicateGuard;
use crate::error::{EngineError, Result};
use crate::outcome::ProcessOutcome;

/// Runs the dispatch pipeline for one transaction at a time.
pub struct DispatchOrchestrator<S, D> {
    store: S,
    dispatcher: D,
    guard: DuplicateGuard<S>,
    catalog: ServiceCatalog,
}

impl<S, D> DispatchOrchestrator<S, D>
where
    S: TransactionStore + Clone,
    D: FulfillmentDispatcher,
{
    pub fn new(store: S, dispatcher: D, catalog: ServiceCatalog) -> Self {
        let guard = DuplicateGuard::new(store.clone());
        Self {
            store,
            dispatcher,
            guard,
            catalog,
        }
    }

    pub fn catalog(&self) -> &ServiceCatalog {
        &self.catalog
    }

    /// Processes one transaction end to end.
    ///
    /// Never fails its caller: infrastructure errors fold into a
    /// retryable outcome, with the message recorded on the transaction.
    #[tracing::instrument(skip(self), fields(transaction_id = %transaction_id))]
    pub async fn process_transaction(&self, transaction_id: TransactionId) -> ProcessOutcome {
        let started = std::time::Instant::now();
        let outcome = match self.try_process(transaction_id).await {
            Ok(outcome) => outcome,
            Err(error) => self.record_failure(transaction_id, error).await,
        };
        metrics::histogram!("process_transaction_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        outcome
    }

    async fn try_process(&self, transaction_id: TransactionId) -> Result<ProcessOutcome> {
        // Fresh read under the caller's lock; the order flag is the
        // idempotence anchor for the whole pass.
        let Some(transaction) = self.store.get_transaction(transaction_id).await? else {
            return Ok(ProcessOutcome::failed(format!(
                "transaction {transaction_id} not found"
            )));
        };
        if transaction.order_created {
            tracing::debug!("orders already created, nothing to do");
            return Ok(ProcessOutcome::success());
        }
        if transaction.status != TransactionStatus::Approved {
            return Ok(ProcessOutcome::failed(format!(
                "transaction is {}, not approved",
                transaction.status
            )));
        }

        let service = match self.catalog.get(&transaction.service_id) {
            Some(service) => service.clone(),
            None => {
                let message = format!("unknown service {}", transaction.service_id);
                self.store.log_error(transaction_id, &message).await?;
                return Ok(ProcessOutcome::failed(message));
            }
        };

        let mut items = self.store.get_line_items(transaction_id).await?;
        if items.is_empty() {
            if service.kind.is_profile_wide() {
                items = vec![self.synthesize_profile_item(&transaction).await?];
            } else {
                let message = "no content items to dispatch".to_string();
                self.store.log_error(transaction_id, &message).await?;
                return Ok(ProcessOutcome::failed(message));
            }
        }

        // One invalid target voids the whole batch before anything goes out.
        if let Some(message) = invalid_target(&service, &items) {
            self.store.log_error(transaction_id, &message).await?;
            return Ok(ProcessOutcome::failed(message));
        }

        let mut dispatched = 0usize;
        let mut skipped = 0usize;
        for item in &items {
            let check = self
                .guard
                .check(transaction_id, &item.content_code, &service.id)
                .await;
            if check.duplicate {
                skipped += 1;
                let detail = check
                    .existing_order
                    .map(|order| format!(" by order {}", order.id))
                    .unwrap_or_default();
                let _ = self
                    .store
                    .log_info(
                        transaction_id,
                        &format!("skipping {}: already fulfilled{detail}", item.content_code),
                    )
                    .await;
                continue;
            }

            let request = build_request(&transaction, &service, item);
            match self.dispatcher.dispatch(&request).await {
                Ok(result) if result.success => {
                    let mut order = OrderRecord::new(
                        transaction_id,
                        item.id,
                        &service.id,
                        &item.content_code,
                        item.quantity,
                    );
                    if let Some(external_order_id) = &result.external_order_id {
                        order = order.sent(external_order_id);
                    }
                    if let Err(error) = self.store.insert_order(order).await {
                        // The provider already accepted this order; losing
                        // the record must not trigger a re-send.
                        tracing::error!(%error, order_id = request.order_id, "dispatched order could not be recorded");
                        let _ = self
                            .store
                            .log_error(
                                transaction_id,
                                &format!(
                                    "order {} dispatched but not recorded: {error}",
                                    request.order_id
                                ),
                            )
                            .await;
                    }
                    metrics::counter!("orders_dispatched_total").increment(1);
                    let _ = self
                        .store
                        .log_info(
                            transaction_id,
                            &format!(
                                "dispatched order {} for {} ({} units)",
                                request.order_id, item.content_code, item.quantity
                            ),
                        )
                        .await;
                    dispatched += 1;
                }
                Ok(result) => {
                    let reason = result
                        .error
                        .unwrap_or_else(|| "provider rejected the order".to_string());
                    return Ok(self
                        .dispatch_failed(transaction_id, &request.order_id, reason)
                        .await);
                }
                Err(error) => {
                    return Ok(self
                        .dispatch_failed(transaction_id, &request.order_id, error.to_string())
                        .await);
                }
            }
        }

        if !self.store.try_mark_order_created(transaction_id).await? {
            tracing::debug!("order flag already set by a concurrent pass");
        }
        self.store
            .record_processing_result(transaction_id, None)
            .await?;
        let _ = self
            .store
            .log_info(
                transaction_id,
                &format!("processing complete: {dispatched} dispatched, {skipped} skipped"),
            )
            .await;
        metrics::counter!("transactions_processed_total").increment(1);
        Ok(ProcessOutcome::success())
    }

    /// Profile-wide purchases may arrive without explicit items; the
    /// profile itself is the target.
    async fn synthesize_profile_item(
        &self,
        transaction: &TransactionRecord,
    ) -> Result<LineItemRecord> {
        let username = transaction.target_username.trim_start_matches('@');
        let item = LineItemRecord::new(
            transaction.id,
            0,
            username,
            format!("https://instagram.com/{username}"),
            ContentType::Profile,
            transaction.quantity,
        );
        self.store.insert_line_items(vec![item.clone()]).await?;
        let _ = self
            .store
            .log_info(
                transaction.id,
                "no line items found, targeting the profile itself",
            )
            .await;
        Ok(item)
    }

    async fn dispatch_failed(
        &self,
        transaction_id: TransactionId,
        order_id: &str,
        reason: String,
    ) -> ProcessOutcome {
        let message = format!("dispatch of {order_id} failed: {reason}");
        tracing::warn!(%transaction_id, order_id, reason, "dispatch failed");
        let _ = self.store.log_error(transaction_id, &message).await;
        let _ = self
            .store
            .record_processing_result(transaction_id, Some(&message))
            .await;
        ProcessOutcome::retryable(message)
    }

    async fn record_failure(
        &self,
        transaction_id: TransactionId,
        error: EngineError,
    ) -> ProcessOutcome {
        let message = error.to_string();
        tracing::error!(%transaction_id, %message, "processing pass failed");
        let _ = self
            .store
            .record_processing_result(transaction_id, Some(&message))
            .await;
        let _ = self
            .store
            .log_error(transaction_id, &format!("processing failed: {message}"))
            .await;
        if error.is_retryable() {
            ProcessOutcome::retryable(message)
        } else {
            ProcessOutcome::failed(message)
        }
    }
}

/// A content-scoped service cannot run against a bare profile.
fn invalid_target(service: &ServiceDefinition, items: &[LineItemRecord]) -> Option<String> {
    if !service.kind.requires_content_url() {
        return None;
    }
    items.iter().find_map(|item| {
        if item.content_type == ContentType::Profile
            || instagram::is_bare_profile_url(&item.content_url)
        {
            Some(format!(
                "line item {} targets a profile, but {} needs a post or reel URL",
                item.id, service.id
            ))
        } else {
            None
        }
    })
}

fn build_request(
    transaction: &TransactionRecord,
    service: &ServiceDefinition,
    item: &LineItemRecord,
) -> FulfillmentRequest {
    FulfillmentRequest {
        order_id: format!("{}-{}", transaction.id, item.id),
        transaction_id: transaction.id.to_string(),
        service_id: service.id.clone(),
        provider_id: service.provider_id.clone(),
        external_service_id: service.external_service_id.clone(),
        quantity: item.quantity,
        target_url: item.content_url.clone(),
        target_username: transaction.target_username.clone(),
        metadata: serde_json::json!({
            "contentCode": item.content_code,
            "contentType": item.content_type.as_str(),
            "lineItemId": item.id.to_string(),
        }),
    }
}
