//! Integration tests for the API server.

use std::sync::OnceLock;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use common::{PaymentId, TransactionId, WorkerId};
use engine::{InMemoryDispatcher, InMemoryPaymentGateway};
use metrics_exporter_prometheus::PrometheusHandle;
use store::{InMemoryStore, TransactionStore};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    app: axum::Router,
    store: InMemoryStore,
    gateway: InMemoryPaymentGateway,
    dispatcher: InMemoryDispatcher,
}

fn setup() -> TestApp {
    let (state, store, gateway, dispatcher) = api::create_default_state();
    let app = api::create_app(state, get_metrics_handle());
    TestApp {
        app,
        store,
        gateway,
        dispatcher,
    }
}

async fn get_json(app: &axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    read_response(response).await
}

async fn post_json(
    app: &axum::Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    read_response(response).await
}

async fn post_empty(app: &axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    read_response(response).await
}

async fn read_response(response: axum::response::Response) -> (StatusCode, serde_json::Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn checkout_body(payment_id: &str, urls: &[&str], quantity: u32) -> serde_json::Value {
    serde_json::json!({
        "customer": { "name": "Ada Lovelace", "email": "ada@example.com" },
        "service_id": "instagram-likes",
        "payment_id": payment_id,
        "target_username": "someuser",
        "amount_cents": 1990,
        "quantity": quantity,
        "content_items": urls
            .iter()
            .map(|url| serde_json::json!({ "url": url }))
            .collect::<Vec<_>>(),
    })
}

fn parse_id(value: &serde_json::Value) -> TransactionId {
    let uuid = uuid::Uuid::parse_str(value.as_str().unwrap()).unwrap();
    TransactionId::from_uuid(uuid)
}

#[tokio::test]
async fn test_health_check() {
    let harness = setup();

    let (status, json) = get_json(&harness.app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_checkout_creates_transaction() {
    let harness = setup();

    let (status, json) = post_json(
        &harness.app,
        "/checkout",
        checkout_body(
            "PAY-1",
            &[
                "https://instagram.com/p/C1/",
                "https://instagram.com/p/C2/",
            ],
            61,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["status"], "pending");
    assert_eq!(json["payment_id"], "PAY-1");
    assert!(json["transaction_id"].as_str().is_some());

    let items = json["line_items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["content_code"], "C1");
    assert_eq!(items[0]["quantity"], 31);
    assert_eq!(items[1]["quantity"], 30);
}

#[tokio::test]
async fn test_checkout_with_unknown_service() {
    let harness = setup();

    let mut body = checkout_body("PAY-2", &["https://instagram.com/p/C1/"], 10);
    body["service_id"] = serde_json::json!("instagram-saves");

    let (status, json) = post_json(&harness.app, "/checkout", body).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("Unknown service"));
}

#[tokio::test]
async fn test_checkout_without_content_items() {
    let harness = setup();

    let (status, json) = post_json(&harness.app, "/checkout", checkout_body("PAY-3", &[], 10)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("content items"));
}

#[tokio::test]
async fn test_checkout_for_followers_targets_the_profile() {
    let harness = setup();

    let mut body = checkout_body("PAY-4", &[], 500);
    body["service_id"] = serde_json::json!("instagram-followers");

    let (status, json) = post_json(&harness.app, "/checkout", body).await;

    assert_eq!(status, StatusCode::CREATED);
    let items = json["line_items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["content_type"], "profile");
    assert_eq!(items[0]["content_code"], "someuser");
    assert_eq!(items[0]["quantity"], 500);
}

#[tokio::test]
async fn test_check_payment_approves_and_dispatches() {
    let harness = setup();

    let (_, created) = post_json(
        &harness.app,
        "/checkout",
        checkout_body(
            "PAY-5",
            &[
                "https://instagram.com/p/C1/",
                "https://instagram.com/p/C2/",
            ],
            60,
        ),
    )
    .await;
    let transaction_id = created["transaction_id"].as_str().unwrap().to_string();

    harness
        .gateway
        .set_status(&PaymentId::new("PAY-5"), "approved");

    let (status, check) = post_empty(&harness.app, "/payments/PAY-5/check").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(check["status"], "approved");
    assert_eq!(check["changed"], true);
    assert_eq!(check["dispatch"]["success"], true);
    assert_eq!(harness.dispatcher.dispatch_count(), 2);

    let (status, transaction) =
        get_json(&harness.app, &format!("/transactions/{transaction_id}")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(transaction["status"], "approved");
    assert_eq!(transaction["order_created"], true);

    let orders = transaction["orders"].as_array().unwrap();
    assert_eq!(orders.len(), 2);
    for order in orders {
        assert_eq!(order["status"], "sent");
        assert!(order["external_order_id"].as_str().unwrap().starts_with("ext-"));
    }
}

#[tokio::test]
async fn test_repeat_check_does_not_redispatch() {
    let harness = setup();

    let (_, _created) = post_json(
        &harness.app,
        "/checkout",
        checkout_body("PAY-6", &["https://instagram.com/p/C1/"], 25),
    )
    .await;
    harness
        .gateway
        .set_status(&PaymentId::new("PAY-6"), "approved");

    let (_, first) = post_empty(&harness.app, "/payments/PAY-6/check").await;
    assert_eq!(first["dispatch"]["success"], true);

    let (status, second) = post_empty(&harness.app, "/payments/PAY-6/check").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["changed"], false);
    assert!(second.get("dispatch").is_none());
    assert_eq!(harness.dispatcher.dispatch_count(), 1);
}

#[tokio::test]
async fn test_check_unknown_payment() {
    let harness = setup();

    let (status, json) = post_empty(&harness.app, "/payments/PAY-404/check").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("PAY-404"));
}

#[tokio::test]
async fn test_get_nonexistent_transaction() {
    let harness = setup();
    let fake_id = uuid::Uuid::new_v4();

    let (status, _) = get_json(&harness.app, &format!("/transactions/{fake_id}")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_transaction_id_format() {
    let harness = setup();

    let (status, _) = get_json(&harness.app, "/transactions/not-a-uuid").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_transaction_logs_follow_the_flow() {
    let harness = setup();

    let (_, created) = post_json(
        &harness.app,
        "/checkout",
        checkout_body("PAY-7", &["https://instagram.com/p/C1/"], 30),
    )
    .await;
    let transaction_id = created["transaction_id"].as_str().unwrap().to_string();

    harness
        .gateway
        .set_status(&PaymentId::new("PAY-7"), "approved");
    post_empty(&harness.app, "/payments/PAY-7/check").await;

    let (status, logs) =
        get_json(&harness.app, &format!("/transactions/{transaction_id}/logs")).await;

    assert_eq!(status, StatusCode::OK);
    let entries = logs.as_array().unwrap();
    assert!(entries.len() >= 3);
    assert!(entries[0]["message"]
        .as_str()
        .unwrap()
        .contains("transaction created"));
    assert!(entries
        .iter()
        .any(|entry| entry["message"].as_str().unwrap().contains("processing complete")));
}

#[tokio::test]
async fn test_force_process_is_idempotent() {
    let harness = setup();

    let (_, created) = post_json(
        &harness.app,
        "/checkout",
        checkout_body("PAY-8", &["https://instagram.com/p/C1/"], 40),
    )
    .await;
    let transaction_id = created["transaction_id"].as_str().unwrap().to_string();

    harness
        .gateway
        .set_status(&PaymentId::new("PAY-8"), "approved");
    post_empty(&harness.app, "/payments/PAY-8/check").await;
    assert_eq!(harness.dispatcher.dispatch_count(), 1);

    let (status, outcome) = post_empty(
        &harness.app,
        &format!("/transactions/{transaction_id}/process"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["success"], true);
    assert_eq!(harness.dispatcher.dispatch_count(), 1);
}

#[tokio::test]
async fn test_force_process_conflicts_while_locked() {
    let harness = setup();

    let (_, created) = post_json(
        &harness.app,
        "/checkout",
        checkout_body("PAY-9", &["https://instagram.com/p/C1/"], 40),
    )
    .await;
    let transaction_id = parse_id(&created["transaction_id"]);

    let acquired = harness
        .store
        .acquire_lock(
            transaction_id,
            &WorkerId::new("other-worker"),
            Utc::now() + Duration::minutes(5),
        )
        .await
        .unwrap();
    assert!(acquired);

    let (status, json) = post_empty(
        &harness.app,
        &format!("/transactions/{transaction_id}/process"),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json["error"].as_str().unwrap().contains("locked"));
}

#[tokio::test]
async fn test_lock_maintenance_endpoints() {
    let harness = setup();

    let acquired = harness
        .store
        .acquire_lock(
            TransactionId::new(),
            &WorkerId::new("stale-worker"),
            Utc::now() - Duration::minutes(5),
        )
        .await
        .unwrap();
    assert!(acquired);

    let (status, counts) = get_json(&harness.app, "/locks/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(counts["total"], 1);
    assert_eq!(counts["expired"], 1);

    let (status, cleared) = post_empty(&harness.app, "/maintenance/locks/clear").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cleared["cleared"], 1);

    let (_, counts) = get_json(&harness.app, "/locks/status").await;
    assert_eq!(counts["total"], 0);
}

#[tokio::test]
async fn test_sweep_reconciles_pending_payments() {
    let harness = setup();

    let (_, created) = post_json(
        &harness.app,
        "/checkout",
        checkout_body("PAY-10", &["https://instagram.com/p/C1/"], 50),
    )
    .await;
    let transaction_id = created["transaction_id"].as_str().unwrap().to_string();

    harness
        .gateway
        .set_status(&PaymentId::new("PAY-10"), "approved");

    let (status, sweep) = post_json(&harness.app, "/maintenance/sweep", serde_json::json!({})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(sweep["pending"]["scanned"], 1);
    assert_eq!(sweep["pending"]["succeeded"], 1);
    assert_eq!(sweep["unsent"]["scanned"], 0);

    let (_, transaction) =
        get_json(&harness.app, &format!("/transactions/{transaction_id}")).await;
    assert_eq!(transaction["order_created"], true);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let harness = setup();

    let response = harness
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
