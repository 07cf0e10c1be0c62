//! API server entry point.

use api::config::Config;
use engine::{
    FulfillmentDispatcher, HttpDispatcher, HttpPaymentGateway, InMemoryDispatcher,
    InMemoryPaymentGateway, PaymentGateway,
};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::postgres::PgPoolOptions;
use store::{InMemoryStore, PostgresStore, TransactionStore};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[tokio::main]
async fn main() {
    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    let config = Config::from_env();

    // 3. Pick the store backend
    if let Some(database_url) = config.database_url.clone() {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&database_url)
            .await
            .expect("failed to connect to PostgreSQL");
        let store = PostgresStore::new(pool);
        store.run_migrations().await.expect("migrations failed");
        run_with_store(store, config, metrics_handle).await;
    } else {
        tracing::warn!("DATABASE_URL not set, using the in-memory store");
        run_with_store(InMemoryStore::new(), config, metrics_handle).await;
    }
}

/// Picks provider clients from config, then starts the server.
async fn run_with_store<S>(store: S, config: Config, metrics_handle: PrometheusHandle)
where
    S: TransactionStore + Clone + 'static,
{
    let payment_api = config
        .payment_api()
        .map(|(url, token)| (url.to_string(), token.to_string()));
    let webhook_url = config.dispatch_webhook_url.clone();

    match (payment_api, webhook_url) {
        (Some((url, token)), Some(webhook_url)) => {
            let gateway =
                HttpPaymentGateway::new(url, token).expect("failed to build payment gateway client");
            let dispatcher =
                HttpDispatcher::new(webhook_url).expect("failed to build dispatcher client");
            serve(store, gateway, dispatcher, config, metrics_handle).await;
        }
        _ => {
            tracing::warn!("provider endpoints not configured, using in-memory doubles");
            let gateway = InMemoryPaymentGateway::new();
            let dispatcher = InMemoryDispatcher::new();
            serve(store, gateway, dispatcher, config, metrics_handle).await;
        }
    }
}

async fn serve<S, G, D>(store: S, gateway: G, dispatcher: D, config: Config, metrics_handle: PrometheusHandle)
where
    S: TransactionStore + Clone + 'static,
    G: PaymentGateway + 'static,
    D: FulfillmentDispatcher + 'static,
{
    // 4. Build application state and router
    let state = api::create_state(store, gateway, dispatcher, &config);
    let app = api::create_app(state, metrics_handle);

    // 5. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}
