//! HTTP API server with observability for the reconciliation engine.
//!
//! Provides REST endpoints for checkout intake, payment status checks and
//! operator maintenance, with structured logging (tracing) and Prometheus
//! metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use common::WorkerId;
use domain::{ServiceCatalog, TransactionRepository};
use engine::{FulfillmentDispatcher, PaymentGateway, PaymentReconciler};
use metrics_exporter_prometheus::PrometheusHandle;
use store::TransactionStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::transactions::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, G, D>(state: Arc<AppState<S, G, D>>, metrics_handle: PrometheusHandle) -> Router
where
    S: TransactionStore + 'static,
    G: PaymentGateway + 'static,
    D: FulfillmentDispatcher + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/checkout", post(routes::transactions::checkout::<S, G, D>))
        .route(
            "/payments/{payment_id}/check",
            post(routes::transactions::check_payment::<S, G, D>),
        )
        .route(
            "/transactions/{id}",
            get(routes::transactions::get::<S, G, D>),
        )
        .route(
            "/transactions/{id}/logs",
            get(routes::transactions::logs::<S, G, D>),
        )
        .route(
            "/transactions/{id}/process",
            post(routes::transactions::process::<S, G, D>),
        )
        .route(
            "/locks/status",
            get(routes::transactions::locks_status::<S, G, D>),
        )
        .route(
            "/maintenance/locks/clear",
            post(routes::transactions::clear_locks::<S, G, D>),
        )
        .route(
            "/maintenance/sweep",
            post(routes::transactions::sweep::<S, G, D>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Builds shared application state from a store and provider clients.
pub fn create_state<S, G, D>(
    store: S,
    gateway: G,
    dispatcher: D,
    config: &Config,
) -> Arc<AppState<S, G, D>>
where
    S: TransactionStore + Clone,
    G: PaymentGateway,
    D: FulfillmentDispatcher,
{
    let catalog = ServiceCatalog::builtin();
    let worker_id = config
        .worker_id
        .as_ref()
        .map(|id| WorkerId::new(id.as_str()))
        .unwrap_or_else(WorkerId::generate);

    let repository = TransactionRepository::new(store.clone(), catalog.clone());
    let reconciler = PaymentReconciler::new(
        store.clone(),
        gateway,
        dispatcher,
        catalog,
        worker_id,
        config.lock_ttl(),
    );

    Arc::new(AppState {
        repository,
        reconciler,
        store,
    })
}

/// Creates application state backed by in-memory doubles, for tests and
/// local development.
pub fn create_default_state() -> (
    Arc<AppState<store::InMemoryStore, engine::InMemoryPaymentGateway, engine::InMemoryDispatcher>>,
    store::InMemoryStore,
    engine::InMemoryPaymentGateway,
    engine::InMemoryDispatcher,
) {
    let store = store::InMemoryStore::new();
    let gateway = engine::InMemoryPaymentGateway::new();
    let dispatcher = engine::InMemoryDispatcher::new();

    let state = create_state(
        store.clone(),
        gateway.clone(),
        dispatcher.clone(),
        &Config::default(),
    );

    (state, store, gateway, dispatcher)
}
