//! Fulfillment dispatcher.
//!
//! Sends one provider order per line item. The wire shape matches the
//! provider's webhook contract, hence the camelCase field names.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, Result};

/// Order payload sent to the fulfillment provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillmentRequest {
    /// Stable id derived from the transaction and line item, so the
    /// provider can deduplicate redeliveries.
    pub order_id: String,
    pub transaction_id: String,
    pub service_id: String,
    pub provider_id: String,
    pub external_service_id: String,
    pub quantity: u32,
    pub target_url: String,
    pub target_username: String,
    #[serde(default)]
    pub metadata: Value,
}

/// Provider response for a dispatched order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DispatchResult {
    pub success: bool,
    pub external_order_id: Option<String>,
    pub error: Option<String>,
}

/// Client for the provider's order intake.
#[async_trait]
pub trait FulfillmentDispatcher: Send + Sync {
    /// Sends one order to the provider.
    async fn dispatch(&self, request: &FulfillmentRequest) -> Result<DispatchResult>;
}

#[derive(Default)]
struct DispatcherState {
    requests: Vec<FulfillmentRequest>,
    fail_on_dispatch: bool,
    fail_targets: HashSet<String>,
    next_order_number: u64,
}

/// In-memory dispatcher used for testing and local development.
///
/// Accepted requests are recorded in dispatch order; failures are not.
#[derive(Clone, Default)]
pub struct InMemoryDispatcher {
    state: Arc<RwLock<DispatcherState>>,
}

impl InMemoryDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every dispatch fail with a provider error.
    pub fn set_fail_on_dispatch(&self, fail: bool) {
        self.state.write().unwrap().fail_on_dispatch = fail;
    }

    /// Makes the provider reject orders for one target URL.
    pub fn fail_for_target(&self, target_url: impl Into<String>) {
        self.state
            .write()
            .unwrap()
            .fail_targets
            .insert(target_url.into());
    }

    /// Number of orders the provider accepted.
    pub fn dispatch_count(&self) -> usize {
        self.state.read().unwrap().requests.len()
    }

    /// Accepted requests so far, in dispatch order.
    pub fn requests(&self) -> Vec<FulfillmentRequest> {
        self.state.read().unwrap().requests.clone()
    }
}

#[async_trait]
impl FulfillmentDispatcher for InMemoryDispatcher {
    async fn dispatch(&self, request: &FulfillmentRequest) -> Result<DispatchResult> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_dispatch {
            return Err(EngineError::Provider(
                "fulfillment provider unavailable".to_string(),
            ));
        }
        if state.fail_targets.contains(&request.target_url) {
            return Ok(DispatchResult {
                success: false,
                external_order_id: None,
                error: Some(format!("provider rejected {}", request.target_url)),
            });
        }

        state.next_order_number += 1;
        let external_order_id = format!("ext-{:04}", state.next_order_number);
        state.requests.push(request.clone());

        Ok(DispatchResult {
            success: true,
            external_order_id: Some(external_order_id),
            error: None,
        })
    }
}

/// Dispatcher backed by the provider's order webhook.
pub struct HttpDispatcher {
    client: reqwest::Client,
    webhook_url: String,
}

impl HttpDispatcher {
    pub fn new(webhook_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|error| EngineError::Provider(error.to_string()))?;
        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
        })
    }
}

#[async_trait]
impl FulfillmentDispatcher for HttpDispatcher {
    async fn dispatch(&self, request: &FulfillmentRequest) -> Result<DispatchResult> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(request)
            .send()
            .await
            .map_err(|error| EngineError::Provider(error.to_string()))?;

        if !response.status().is_success() {
            return Err(EngineError::Provider(format!(
                "dispatch webhook returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|error| EngineError::Provider(error.to_string()))
    }
}
