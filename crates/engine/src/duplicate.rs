//! Duplicate fulfillment detection.
//!
//! Before dispatching a line item the engine asks whether an order for
//! the same content and service already went out, from any transaction.
//! A probe that cannot reach the store answers "not a duplicate" so a
//! read failure never blocks fulfillment.

use common::TransactionId;
use store::{OrderRecord, TransactionStore, TransactionStoreExt};

/// Answer from a duplicate probe for one content code.
#[derive(Debug, Clone)]
pub struct DuplicateCheck {
    pub duplicate: bool,
    pub existing_order: Option<OrderRecord>,
}

impl DuplicateCheck {
    fn clear() -> Self {
        Self {
            duplicate: false,
            existing_order: None,
        }
    }
}

/// Looks up previously fulfilled orders by content code and service.
pub struct DuplicateGuard<S> {
    store: S,
}

impl<S> DuplicateGuard<S>
where
    S: TransactionStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn check(
        &self,
        transaction_id: TransactionId,
        content_code: &str,
        service_id: &str,
    ) -> DuplicateCheck {
        match self
            .store
            .find_order_for_content(content_code, service_id)
            .await
        {
            Ok(Some(existing)) => {
                metrics::counter!("duplicates_detected_total").increment(1);
                DuplicateCheck {
                    duplicate: true,
                    existing_order: Some(existing),
                }
            }
            Ok(None) => DuplicateCheck::clear(),
            Err(error) => {
                tracing::warn!(
                    %transaction_id,
                    content_code,
                    %error,
                    "duplicate check failed, treating as not duplicated"
                );
                let _ = self
                    .store
                    .log_warning(
                        transaction_id,
                        &format!("duplicate check failed for {content_code}: {error}"),
                    )
                    .await;
                DuplicateCheck::clear()
            }
        }
    }
}
