//! Persisted record types for transactions, line items, locks, logs and orders.

use chrono::{DateTime, Utc};
use common::{LineItemId, Money, OrderRecordId, PaymentId, TransactionId, WorkerId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Internal status of a transaction.
///
/// Gateway vocabularies are mapped onto these three states before
/// anything else looks at them; `approved` is the only state that can
/// trigger order dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Payment not yet confirmed by the gateway.
    #[default]
    Pending,

    /// Payment confirmed; eligible for order dispatch.
    Approved,

    /// Payment rejected, cancelled, refunded or charged back (terminal).
    Rejected,
}

impl TransactionStatus {
    /// Returns true if orders may be dispatched in this status.
    pub fn is_approved(&self) -> bool {
        matches!(self, TransactionStatus::Approved)
    }

    /// Returns true if the gateway may still change its mind.
    pub fn is_pending(&self) -> bool {
        matches!(self, TransactionStatus::Pending)
    }

    /// Returns true if this is the rejected terminal status.
    pub fn is_rejected(&self) -> bool {
        matches!(self, TransactionStatus::Rejected)
    }

    /// Returns the status name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Approved => "approved",
            TransactionStatus::Rejected => "rejected",
        }
    }

    /// Parses a stored status value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(TransactionStatus::Pending),
            "approved" => Some(TransactionStatus::Approved),
            "rejected" => Some(TransactionStatus::Rejected),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of content a line item points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Post,
    Reel,
    /// The target account itself, used by profile-wide services.
    Profile,
}

impl ContentType {
    /// Returns the name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Post => "post",
            ContentType::Reel => "reel",
            ContentType::Profile => "profile",
        }
    }

    /// Parses a stored content type value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "post" => Some(ContentType::Post),
            "reel" => Some(ContentType::Reel),
            "profile" => Some(ContentType::Profile),
            _ => None,
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Severity of a processing log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Returns the name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }

    /// Parses a stored log level value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "info" => Some(LogLevel::Info),
            "warning" => Some(LogLevel::Warning),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of a dispatched order record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Accepted locally, provider confirmation still outstanding.
    #[default]
    Pending,

    /// Provider accepted the request and returned an external id.
    Sent,

    /// Provider rejected the request (does not block future dispatch).
    Failed,
}

impl OrderStatus {
    /// Returns true if this order no longer counts for duplicate checks.
    pub fn is_failed(&self) -> bool {
        matches!(self, OrderStatus::Failed)
    }

    /// Returns the name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Sent => "sent",
            OrderStatus::Failed => "failed",
        }
    }

    /// Parses a stored order status value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(OrderStatus::Pending),
            "sent" => Some(OrderStatus::Sent),
            "failed" => Some(OrderStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry of the status-change history kept in transaction metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    /// Mapped internal status after the change.
    pub status: String,

    /// Raw status string as reported by the gateway.
    pub gateway_status: String,

    /// When the change was observed.
    pub changed_at: DateTime<Utc>,
}

impl StatusHistoryEntry {
    /// Creates a history entry observed now.
    pub fn new(status: TransactionStatus, gateway_status: impl Into<String>) -> Self {
        Self {
            status: status.as_str().to_owned(),
            gateway_status: gateway_status.into(),
            changed_at: Utc::now(),
        }
    }
}

/// One checkout/payment attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: TransactionId,
    pub service_id: String,
    pub payment_id: PaymentId,
    pub status: TransactionStatus,
    /// Raw gateway status string from the last observation.
    pub payment_status: String,
    pub target_username: String,
    pub amount: Money,
    /// Total units purchased, split across line items.
    pub quantity: u32,
    pub order_created: bool,
    pub processing_attempts: i32,
    pub last_processing_error: Option<String>,
    /// Free-form audit blob: customer contact, status history, distribution notes.
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionRecord {
    /// Creates a new pending transaction with a fresh id.
    pub fn new(
        service_id: impl Into<String>,
        payment_id: PaymentId,
        target_username: impl Into<String>,
        amount: Money,
        quantity: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TransactionId::new(),
            service_id: service_id.into(),
            payment_id,
            status: TransactionStatus::Pending,
            payment_status: "pending".to_owned(),
            target_username: target_username.into(),
            amount,
            quantity,
            order_created: false,
            processing_attempts: 0,
            last_processing_error: None,
            metadata: serde_json::Value::Object(serde_json::Map::new()),
            created_at: now,
            updated_at: now,
        }
    }
}

/// One customer-selected content item within a transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItemRecord {
    pub id: LineItemId,
    pub transaction_id: TransactionId,
    /// Selection order; dispatch walks items by ascending position.
    pub position: i32,
    pub content_code: String,
    pub content_url: String,
    pub content_type: ContentType,
    /// This item's share of the transaction's total quantity.
    pub quantity: u32,
    pub selected: bool,
    pub created_at: DateTime<Utc>,
}

impl LineItemRecord {
    /// Creates a new selected line item with a fresh id.
    pub fn new(
        transaction_id: TransactionId,
        position: i32,
        content_code: impl Into<String>,
        content_url: impl Into<String>,
        content_type: ContentType,
        quantity: u32,
    ) -> Self {
        Self {
            id: LineItemId::new(),
            transaction_id,
            position,
            content_code: content_code.into(),
            content_url: content_url.into(),
            content_type,
            quantity,
            selected: true,
            created_at: Utc::now(),
        }
    }
}

/// Mutual-exclusion record for a transaction being processed.
///
/// Valid only while `now < expires_at`; an expired lock is logically
/// absent and may be overwritten by any worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingLock {
    pub transaction_id: TransactionId,
    pub locked_by: WorkerId,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl ProcessingLock {
    /// Returns true if the lock has expired as of `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Append-only audit record. Never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: Uuid,
    pub transaction_id: TransactionId,
    pub level: LogLevel,
    pub message: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl LogEntry {
    /// Creates a log entry timestamped now.
    pub fn new(transaction_id: TransactionId, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            transaction_id,
            level,
            message: message.into(),
            metadata: serde_json::Value::Object(serde_json::Map::new()),
            created_at: Utc::now(),
        }
    }

    /// Attaches structured metadata to the entry.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A materialized fulfillment request sent to the provider for one line item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: OrderRecordId,
    pub transaction_id: TransactionId,
    pub line_item_id: LineItemId,
    /// Provider-assigned identifier, absent until the provider confirms.
    pub external_order_id: Option<String>,
    pub status: OrderStatus,
    pub service_id: String,
    pub content_code: String,
    pub quantity: u32,
    pub created_at: DateTime<Utc>,
}

impl OrderRecord {
    /// Creates a new order record with a fresh id.
    pub fn new(
        transaction_id: TransactionId,
        line_item_id: LineItemId,
        service_id: impl Into<String>,
        content_code: impl Into<String>,
        quantity: u32,
    ) -> Self {
        Self {
            id: OrderRecordId::new(),
            transaction_id,
            line_item_id,
            external_order_id: None,
            status: OrderStatus::Pending,
            service_id: service_id.into(),
            content_code: content_code.into(),
            quantity,
            created_at: Utc::now(),
        }
    }

    /// Marks the order as accepted by the provider.
    pub fn sent(mut self, external_order_id: impl Into<String>) -> Self {
        self.external_order_id = Some(external_order_id.into());
        self.status = OrderStatus::Sent;
        self
    }
}
