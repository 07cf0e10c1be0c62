//! Payment gateway client.
//!
//! The engine only ever reads from the gateway; the storefront takes
//! payments through the gateway's own checkout widget.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::PaymentId;
use serde_json::Value;

use crate::error::{EngineError, Result};

/// Snapshot of a payment as the gateway reported it.
#[derive(Debug, Clone)]
pub struct PaymentStatusInfo {
    /// Raw status string, e.g. `approved` or `in_process`.
    pub status: String,
    /// Full gateway payload, kept for audit logs.
    pub raw: Value,
}

impl PaymentStatusInfo {
    pub fn new(status: impl Into<String>) -> Self {
        let status = status.into();
        let raw = serde_json::json!({ "status": status });
        Self { status, raw }
    }
}

/// Read-only client for the payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Fetches the current status of a payment.
    async fn get_payment_status(&self, payment_id: &PaymentId) -> Result<PaymentStatusInfo>;
}

#[derive(Default)]
struct GatewayState {
    statuses: HashMap<PaymentId, String>,
    fail_on_status: bool,
    calls: u64,
}

/// In-memory gateway used for testing and local development.
#[derive(Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<GatewayState>>,
}

impl InMemoryPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the status the gateway will report for a payment.
    pub fn set_status(&self, payment_id: &PaymentId, status: impl Into<String>) {
        let mut state = self.state.write().unwrap();
        state.statuses.insert(payment_id.clone(), status.into());
    }

    /// Makes every status lookup fail (for testing provider outages).
    pub fn set_fail_on_status(&self, fail: bool) {
        self.state.write().unwrap().fail_on_status = fail;
    }

    /// Number of status lookups served so far.
    pub fn call_count(&self) -> u64 {
        self.state.read().unwrap().calls
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn get_payment_status(&self, payment_id: &PaymentId) -> Result<PaymentStatusInfo> {
        let mut state = self.state.write().unwrap();
        state.calls += 1;

        if state.fail_on_status {
            return Err(EngineError::Provider(
                "payment gateway unavailable".to_string(),
            ));
        }

        match state.statuses.get(payment_id) {
            Some(status) => Ok(PaymentStatusInfo::new(status.clone())),
            None => Err(EngineError::PaymentNotFound(payment_id.clone())),
        }
    }
}

/// Gateway client backed by the provider's REST API.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl HttpPaymentGateway {
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|error| EngineError::Provider(error.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        })
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn get_payment_status(&self, payment_id: &PaymentId) -> Result<PaymentStatusInfo> {
        let url = format!("{}/v1/payments/{}", self.base_url, payment_id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|error| EngineError::Provider(error.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(EngineError::PaymentNotFound(payment_id.clone()));
        }
        if !response.status().is_success() {
            return Err(EngineError::Provider(format!(
                "gateway returned {} for payment {payment_id}",
                response.status()
            )));
        }

        let raw: Value = response
            .json()
            .await
            .map_err(|error| EngineError::Provider(error.to_string()))?;
        // Missing or unreadable status falls through to an empty string,
        // which the status map treats as pending.
        let status = raw
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok(PaymentStatusInfo { status, raw })
    }
}
