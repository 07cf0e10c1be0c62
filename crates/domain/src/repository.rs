//! Transaction creation from checkout input.

use common::Money;
use serde_json::json;
use store::{ContentType, LineItemRecord, TransactionRecord, TransactionStore, TransactionStoreExt};

use crate::catalog::{ServiceCatalog, ServiceDefinition};
use crate::checkout::{CheckoutRequest, ContentSelection};
use crate::error::DomainError;
use crate::{instagram, quantity};

/// Outcome of a successful checkout.
#[derive(Debug, Clone)]
pub struct CreatedTransaction {
    pub transaction: TransactionRecord,
    pub line_items: Vec<LineItemRecord>,
}

/// Creates transaction and line-item records from checkout input.
pub struct TransactionRepository<S> {
    store: S,
    catalog: ServiceCatalog,
}

impl<S: TransactionStore> TransactionRepository<S> {
    pub fn new(store: S, catalog: ServiceCatalog) -> Self {
        Self { store, catalog }
    }

    pub fn catalog(&self) -> &ServiceCatalog {
        &self.catalog
    }

    /// Creates the transaction plus its line items.
    ///
    /// If every selected item carries an explicit quantity those are trusted
    /// verbatim; otherwise the total is distributed in selection order.
    /// Profile-wide services get a single synthesized line item for the
    /// target account.
    ///
    /// The transaction row is the customer-facing commitment: when line-item
    /// insertion fails the transaction still stands and the failure is only
    /// logged. Reconciliation surfaces the empty batch later as a
    /// non-retryable processing error.
    #[tracing::instrument(
        skip(self, request),
        fields(payment_id = %request.payment_id, service_id = %request.service_id)
    )]
    pub async fn create_transaction(
        &self,
        request: CheckoutRequest,
    ) -> Result<CreatedTransaction, DomainError> {
        let service = self.catalog.require(&request.service_id)?.clone();
        validate_request(&request, &service)?;

        let mut transaction = TransactionRecord::new(
            &service.id,
            request.payment_id.clone(),
            &request.target_username,
            Money::from_cents(request.amount_cents),
            request.quantity,
        );

        let line_items = if service.kind.is_profile_wide() {
            vec![profile_line_item(&transaction, &request)]
        } else {
            content_line_items(&transaction, &request)?
        };
        transaction.metadata = build_metadata(&request, &line_items)?;

        let transaction_id = transaction.id;
        self.store.insert_transaction(transaction.clone()).await?;

        match self.store.insert_line_items(line_items.clone()).await {
            Ok(()) => {
                let message =
                    format!("transaction created with {} line item(s)", line_items.len());
                if let Err(error) = self.store.log_info(transaction_id, &message).await {
                    tracing::warn!(%transaction_id, %error, "audit log write failed");
                }
                metrics::counter!("transactions_created_total").increment(1);
                tracing::info!(%transaction_id, items = line_items.len(), "transaction created");
                Ok(CreatedTransaction {
                    transaction,
                    line_items,
                })
            }
            Err(error) => {
                // The transaction stands even when its items could not be written.
                tracing::warn!(%transaction_id, %error, "line item insert failed");
                let message = format!("line item insert failed: {error}");
                if let Err(log_error) = self.store.log_warning(transaction_id, &message).await {
                    tracing::warn!(%transaction_id, %log_error, "audit log write failed");
                }
                Ok(CreatedTransaction {
                    transaction,
                    line_items: Vec::new(),
                })
            }
        }
    }
}

fn validate_request(
    request: &CheckoutRequest,
    service: &ServiceDefinition,
) -> Result<(), DomainError> {
    if request.quantity == 0 {
        return Err(DomainError::InvalidQuantity {
            quantity: i64::from(request.quantity),
        });
    }
    if request.amount_cents <= 0 {
        return Err(DomainError::InvalidAmount {
            amount: request.amount_cents,
        });
    }
    if service.kind.requires_content_url() && request.content_items.is_empty() {
        return Err(DomainError::NoContentItems {
            service_id: service.id.clone(),
        });
    }
    Ok(())
}

/// Builds line items for a content-scoped service, one per selection.
fn content_line_items(
    transaction: &TransactionRecord,
    request: &CheckoutRequest,
) -> Result<Vec<LineItemRecord>, DomainError> {
    let items = &request.content_items;
    let quantities = match explicit_quantities(items) {
        Some(quantities) => quantities,
        None => quantity::distribute(request.quantity, items.len())?,
    };

    Ok(items
        .iter()
        .zip(quantities)
        .enumerate()
        .map(|(position, (item, share))| {
            LineItemRecord::new(
                transaction.id,
                position as i32,
                item_code(item),
                &item.url,
                item_type(item),
                share,
            )
        })
        .collect())
}

/// Caller-supplied quantities, honored only when every item carries one.
fn explicit_quantities(items: &[ContentSelection]) -> Option<Vec<u32>> {
    items.iter().map(|item| item.quantity).collect()
}

/// A single line item standing in for the target account itself.
fn profile_line_item(transaction: &TransactionRecord, request: &CheckoutRequest) -> LineItemRecord {
    let username = request.target_username.trim_start_matches('@');
    LineItemRecord::new(
        transaction.id,
        0,
        username,
        format!("https://instagram.com/{username}"),
        ContentType::Profile,
        request.quantity,
    )
}

fn item_code(item: &ContentSelection) -> String {
    if let Some(code) = &item.content_code {
        return code.clone();
    }
    instagram::content_code(&item.url).unwrap_or_else(|| item.url.clone())
}

fn item_type(item: &ContentSelection) -> ContentType {
    if let Some(content_type) = item.content_type {
        return content_type;
    }
    instagram::classify(&item.url).unwrap_or(ContentType::Post)
}

fn build_metadata(
    request: &CheckoutRequest,
    line_items: &[LineItemRecord],
) -> Result<serde_json::Value, DomainError> {
    let shares: Vec<u32> = line_items.iter().map(|item| item.quantity).collect();
    let mut metadata = serde_json::Map::new();
    metadata.insert("customer".to_owned(), serde_json::to_value(&request.customer)?);
    metadata.insert(
        "distribution".to_owned(),
        json!({ "total": request.quantity, "shares": shares }),
    );
    if let Some(qr_code) = &request.qr_code {
        metadata.insert("qr_code".to_owned(), json!(qr_code));
    }
    Ok(serde_json::Value::Object(metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::PaymentId;
    use store::InMemoryStore;

    use crate::checkout::Customer;

    fn repository() -> TransactionRepository<InMemoryStore> {
        TransactionRepository::new(InMemoryStore::new(), ServiceCatalog::builtin())
    }

    fn likes_request(urls: &[&str], quantity: u32) -> CheckoutRequest {
        CheckoutRequest {
            customer: Customer::new("Ana", "ana@example.com"),
            service_id: "instagram-likes".to_owned(),
            payment_id: PaymentId::new("mp-1"),
            target_username: "someuser".to_owned(),
            amount_cents: 1990,
            quantity,
            content_items: urls.iter().map(|url| ContentSelection::new(*url)).collect(),
            qr_code: None,
        }
    }

    #[tokio::test]
    async fn test_distributes_quantity_in_selection_order() {
        let repository = repository();
        let created = repository
            .create_transaction(likes_request(
                &[
                    "https://instagram.com/p/C1/",
                    "https://instagram.com/p/C2/",
                    "https://instagram.com/p/C3/",
                    "https://instagram.com/p/C4/",
                    "https://instagram.com/p/C5/",
                ],
                17,
            ))
            .await
            .unwrap();

        let shares: Vec<u32> = created.line_items.iter().map(|item| item.quantity).collect();
        assert_eq!(shares, vec![4, 4, 3, 3, 3]);
        assert_eq!(created.line_items[0].content_code, "C1");
        assert_eq!(created.transaction.metadata["distribution"]["shares"][0], 4);
    }

    #[tokio::test]
    async fn test_explicit_quantities_are_trusted_verbatim() {
        let repository = repository();
        let mut request = likes_request(
            &["https://instagram.com/p/C1/", "https://instagram.com/p/C2/"],
            17,
        );
        request.content_items[0].quantity = Some(10);
        request.content_items[1].quantity = Some(7);

        let created = repository.create_transaction(request).await.unwrap();
        let shares: Vec<u32> = created.line_items.iter().map(|item| item.quantity).collect();
        assert_eq!(shares, vec![10, 7]);
    }

    #[tokio::test]
    async fn test_partial_explicit_quantities_fall_back_to_distribution() {
        let repository = repository();
        let mut request = likes_request(
            &["https://instagram.com/p/C1/", "https://instagram.com/p/C2/"],
            9,
        );
        request.content_items[0].quantity = Some(6);

        let created = repository.create_transaction(request).await.unwrap();
        let shares: Vec<u32> = created.line_items.iter().map(|item| item.quantity).collect();
        assert_eq!(shares, vec![5, 4]);
    }

    #[tokio::test]
    async fn test_profile_wide_service_synthesizes_single_item() {
        let repository = repository();
        let mut request = likes_request(&[], 500);
        request.service_id = "instagram-followers".to_owned();
        request.target_username = "@someuser".to_owned();

        let created = repository.create_transaction(request).await.unwrap();
        assert_eq!(created.line_items.len(), 1);
        let item = &created.line_items[0];
        assert_eq!(item.content_type, ContentType::Profile);
        assert_eq!(item.content_code, "someuser");
        assert_eq!(item.quantity, 500);
    }

    #[tokio::test]
    async fn test_rejects_invalid_input() {
        let repository = repository();

        let zero_quantity = likes_request(&["https://instagram.com/p/C1/"], 0);
        assert!(matches!(
            repository.create_transaction(zero_quantity).await,
            Err(DomainError::InvalidQuantity { .. })
        ));

        let mut free = likes_request(&["https://instagram.com/p/C1/"], 10);
        free.amount_cents = 0;
        assert!(matches!(
            repository.create_transaction(free).await,
            Err(DomainError::InvalidAmount { .. })
        ));

        let empty = likes_request(&[], 10);
        assert!(matches!(
            repository.create_transaction(empty).await,
            Err(DomainError::NoContentItems { .. })
        ));

        let mut unknown = likes_request(&["https://instagram.com/p/C1/"], 10);
        unknown.service_id = "instagram-saves".to_owned();
        assert!(matches!(
            repository.create_transaction(unknown).await,
            Err(DomainError::ServiceNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_line_item_failure_leaves_transaction_standing() {
        let store = InMemoryStore::new();
        store.set_fail_on_line_item_insert(true).await;
        let repository = TransactionRepository::new(store.clone(), ServiceCatalog::builtin());

        let created = repository
            .create_transaction(likes_request(&["https://instagram.com/p/C1/"], 10))
            .await
            .unwrap();

        assert!(created.line_items.is_empty());
        let stored = store
            .get_transaction(created.transaction.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.id, created.transaction.id);

        let logs = store.get_logs(created.transaction.id).await.unwrap();
        assert!(logs.iter().any(|entry| {
            entry.level == store::LogLevel::Warning
                && entry.message.contains("line item insert failed")
        }));
    }

    #[tokio::test]
    async fn test_success_appends_info_log() {
        let store = InMemoryStore::new();
        let repository = TransactionRepository::new(store.clone(), ServiceCatalog::builtin());

        let created = repository
            .create_transaction(likes_request(&["https://instagram.com/p/C1/"], 10))
            .await
            .unwrap();

        let logs = store.get_logs(created.transaction.id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].level, store::LogLevel::Info);
    }
}
