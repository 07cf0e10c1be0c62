//! Checkout, payment reconciliation and operator maintenance endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::{PaymentId, TransactionId};
use domain::{CheckoutRequest, TransactionRepository};
use engine::{
    FulfillmentDispatcher, PaymentGateway, PaymentReconciler, ProcessOutcome, SweepSummary,
};
use serde::{Deserialize, Serialize};
use store::{LockCounts, TransactionStore, TransactionStoreExt};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: TransactionStore, G, D> {
    pub repository: TransactionRepository<S>,
    pub reconciler: PaymentReconciler<S, G, D>,
    pub store: S,
}

// -- Request types --

/// Batch limits for the maintenance sweep. Both default to 50.
#[derive(Deserialize)]
pub struct SweepRequest {
    #[serde(default = "default_sweep_limit")]
    pub pending_limit: usize,
    #[serde(default = "default_sweep_limit")]
    pub unsent_limit: usize,
}

fn default_sweep_limit() -> usize {
    50
}

impl Default for SweepRequest {
    fn default() -> Self {
        Self {
            pending_limit: default_sweep_limit(),
            unsent_limit: default_sweep_limit(),
        }
    }
}

// -- Response types --

#[derive(Serialize)]
pub struct CheckoutResponse {
    pub transaction_id: String,
    pub payment_id: String,
    pub status: String,
    pub quantity: u32,
    pub line_items: Vec<LineItemResponse>,
}

#[derive(Serialize)]
pub struct LineItemResponse {
    pub id: String,
    pub position: i32,
    pub content_code: String,
    pub content_url: String,
    pub content_type: String,
    pub quantity: u32,
}

#[derive(Serialize)]
pub struct TransactionResponse {
    pub id: String,
    pub service_id: String,
    pub payment_id: String,
    pub status: String,
    pub payment_status: String,
    pub target_username: String,
    pub amount_cents: i64,
    pub quantity: u32,
    pub order_created: bool,
    pub processing_attempts: i32,
    pub last_processing_error: Option<String>,
    pub created_at: String,
    pub line_items: Vec<LineItemResponse>,
    pub orders: Vec<OrderResponse>,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub line_item_id: String,
    pub external_order_id: Option<String>,
    pub status: String,
    pub content_code: String,
    pub quantity: u32,
}

#[derive(Serialize)]
pub struct CheckResponse {
    pub payment_id: String,
    pub gateway_status: String,
    pub status: String,
    pub changed: bool,
    pub transaction_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatch: Option<ProcessOutcome>,
}

#[derive(Serialize)]
pub struct LogResponse {
    pub level: String,
    pub message: String,
    pub metadata: serde_json::Value,
    pub created_at: String,
}

#[derive(Serialize)]
pub struct ClearedLocksResponse {
    pub cleared: u64,
}

#[derive(Serialize)]
pub struct SweepResponse {
    pub pending: SweepSummary,
    pub unsent: SweepSummary,
}

// -- Handlers --

/// POST /checkout — record a purchase and its selected content items.
#[tracing::instrument(skip(state, req))]
pub async fn checkout<S, G, D>(
    State(state): State<Arc<AppState<S, G, D>>>,
    Json(req): Json<CheckoutRequest>,
) -> Result<(axum::http::StatusCode, Json<CheckoutResponse>), ApiError>
where
    S: TransactionStore + 'static,
    G: PaymentGateway + 'static,
    D: FulfillmentDispatcher + 'static,
{
    metrics::counter!("checkout_requests_total").increment(1);

    let created = state.repository.create_transaction(req).await?;

    let line_items: Vec<LineItemResponse> = created
        .line_items
        .iter()
        .map(|item| LineItemResponse {
            id: item.id.to_string(),
            position: item.position,
            content_code: item.content_code.clone(),
            content_url: item.content_url.clone(),
            content_type: item.content_type.as_str().to_string(),
            quantity: item.quantity,
        })
        .collect();

    let response = CheckoutResponse {
        transaction_id: created.transaction.id.to_string(),
        payment_id: created.transaction.payment_id.to_string(),
        status: created.transaction.status.as_str().to_string(),
        quantity: created.transaction.quantity,
        line_items,
    };

    Ok((axum::http::StatusCode::CREATED, Json(response)))
}

/// POST /payments/:payment_id/check — reconcile one payment against the
/// gateway, dispatching orders when it transitions into approved.
#[tracing::instrument(skip(state))]
pub async fn check_payment<S, G, D>(
    State(state): State<Arc<AppState<S, G, D>>>,
    Path(payment_id): Path<String>,
) -> Result<Json<CheckResponse>, ApiError>
where
    S: TransactionStore + 'static,
    G: PaymentGateway + 'static,
    D: FulfillmentDispatcher + 'static,
{
    let payment_id = PaymentId::new(payment_id);
    let outcome = state.reconciler.check_payment_status(&payment_id).await?;

    Ok(Json(CheckResponse {
        payment_id: outcome.payment_id.to_string(),
        gateway_status: outcome.gateway_status,
        status: outcome.mapped_status.as_str().to_string(),
        changed: outcome.changed,
        transaction_id: outcome.transaction_id.to_string(),
        dispatch: outcome.dispatch,
    }))
}

/// GET /transactions/:id — load a transaction with its line items and orders.
#[tracing::instrument(skip(state))]
pub async fn get<S, G, D>(
    State(state): State<Arc<AppState<S, G, D>>>,
    Path(id): Path<String>,
) -> Result<Json<TransactionResponse>, ApiError>
where
    S: TransactionStore + 'static,
    G: PaymentGateway + 'static,
    D: FulfillmentDispatcher + 'static,
{
    let transaction_id = parse_transaction_id(&id)?;
    let transaction = state
        .store
        .get_transaction(transaction_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Transaction {id} not found")))?;

    let line_items: Vec<LineItemResponse> = state
        .store
        .get_line_items(transaction_id)
        .await?
        .iter()
        .map(|item| LineItemResponse {
            id: item.id.to_string(),
            position: item.position,
            content_code: item.content_code.clone(),
            content_url: item.content_url.clone(),
            content_type: item.content_type.as_str().to_string(),
            quantity: item.quantity,
        })
        .collect();

    let orders: Vec<OrderResponse> = state
        .store
        .get_orders_for_transaction(transaction_id)
        .await?
        .into_iter()
        .map(|order| OrderResponse {
            id: order.id.to_string(),
            line_item_id: order.line_item_id.to_string(),
            external_order_id: order.external_order_id,
            status: order.status.as_str().to_string(),
            content_code: order.content_code,
            quantity: order.quantity,
        })
        .collect();

    Ok(Json(TransactionResponse {
        id: transaction.id.to_string(),
        service_id: transaction.service_id,
        payment_id: transaction.payment_id.to_string(),
        status: transaction.status.as_str().to_string(),
        payment_status: transaction.payment_status,
        target_username: transaction.target_username,
        amount_cents: transaction.amount.cents(),
        quantity: transaction.quantity,
        order_created: transaction.order_created,
        processing_attempts: transaction.processing_attempts,
        last_processing_error: transaction.last_processing_error,
        created_at: transaction.created_at.to_rfc3339(),
        line_items,
        orders,
    }))
}

/// GET /transactions/:id/logs — read a transaction's audit trail.
#[tracing::instrument(skip(state))]
pub async fn logs<S, G, D>(
    State(state): State<Arc<AppState<S, G, D>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<LogResponse>>, ApiError>
where
    S: TransactionStore + 'static,
    G: PaymentGateway + 'static,
    D: FulfillmentDispatcher + 'static,
{
    let transaction_id = parse_transaction_id(&id)?;
    state.store.require_transaction(transaction_id).await?;

    let entries = state.store.get_logs(transaction_id).await?;
    let responses: Vec<LogResponse> = entries
        .into_iter()
        .map(|entry| LogResponse {
            level: entry.level.as_str().to_string(),
            message: entry.message,
            metadata: entry.metadata,
            created_at: entry.created_at.to_rfc3339(),
        })
        .collect();

    Ok(Json(responses))
}

/// POST /transactions/:id/process — run a dispatch pass for one transaction.
///
/// Responds 409 when another worker holds the processing lock.
#[tracing::instrument(skip(state))]
pub async fn process<S, G, D>(
    State(state): State<Arc<AppState<S, G, D>>>,
    Path(id): Path<String>,
) -> Result<Json<ProcessOutcome>, ApiError>
where
    S: TransactionStore + 'static,
    G: PaymentGateway + 'static,
    D: FulfillmentDispatcher + 'static,
{
    let transaction_id = parse_transaction_id(&id)?;
    let outcome = state.reconciler.force_process(transaction_id).await?;
    Ok(Json(outcome))
}

/// GET /locks/status — processing lock counts for operators.
#[tracing::instrument(skip(state))]
pub async fn locks_status<S, G, D>(
    State(state): State<Arc<AppState<S, G, D>>>,
) -> Result<Json<LockCounts>, ApiError>
where
    S: TransactionStore + 'static,
    G: PaymentGateway + 'static,
    D: FulfillmentDispatcher + 'static,
{
    let counts = state.reconciler.locks().status().await?;
    Ok(Json(counts))
}

/// POST /maintenance/locks/clear — delete expired processing locks.
#[tracing::instrument(skip(state))]
pub async fn clear_locks<S, G, D>(
    State(state): State<Arc<AppState<S, G, D>>>,
) -> Result<Json<ClearedLocksResponse>, ApiError>
where
    S: TransactionStore + 'static,
    G: PaymentGateway + 'static,
    D: FulfillmentDispatcher + 'static,
{
    let cleared = state.reconciler.locks().clear_expired().await?;
    Ok(Json(ClearedLocksResponse { cleared }))
}

/// POST /maintenance/sweep — reconcile pending payments and retry unsent
/// approved transactions in one batch.
#[tracing::instrument(skip(state, req))]
pub async fn sweep<S, G, D>(
    State(state): State<Arc<AppState<S, G, D>>>,
    req: Option<Json<SweepRequest>>,
) -> Result<Json<SweepResponse>, ApiError>
where
    S: TransactionStore + 'static,
    G: PaymentGateway + 'static,
    D: FulfillmentDispatcher + 'static,
{
    let req = req.map(|Json(r)| r).unwrap_or_default();

    let pending = state
        .reconciler
        .process_pending_payments(req.pending_limit)
        .await?;
    let unsent = state
        .reconciler
        .process_unsent_orders(req.unsent_limit)
        .await?;

    Ok(Json(SweepResponse { pending, unsent }))
}

fn parse_transaction_id(id: &str) -> Result<TransactionId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid transaction ID: {e}")))?;
    Ok(TransactionId::from_uuid(uuid))
}
