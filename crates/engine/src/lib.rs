//! Payment-to-order reconciliation engine.
//!
//! This crate watches gateway payment status, reconciles it onto the
//! stored transactions, and dispatches fulfillment orders at most once
//! per line item.
//!
//! A reconciliation pass follows these steps:
//! 1. Read the payment's status from the gateway
//! 2. Map it to the local vocabulary and write it onto every
//!    transaction sharing the payment
//! 3. On a transition into approved, run the dispatch pipeline under
//!    the transaction's TTL lock
//!
//! Dispatch is guarded three ways: the approval transition itself, the
//! per-transaction lock, and an order flag flipped by compare-and-swap.

pub mod dispatcher;
pub mod duplicate;
pub mod error;
pub mod gateway;
pub mod lock;
pub mod orchestrator;
pub mod outcome;
pub mod reconciler;
pub mod retry;

pub use dispatcher::{
    DispatchResult, FulfillmentDispatcher, FulfillmentRequest, HttpDispatcher, InMemoryDispatcher,
};
pub use duplicate::{DuplicateCheck, DuplicateGuard};
pub use error::{EngineError, Result};
pub use gateway::{HttpPaymentGateway, InMemoryPaymentGateway, PaymentGateway, PaymentStatusInfo};
pub use lock::LockManager;
pub use orchestrator::DispatchOrchestrator;
pub use outcome::{CheckOutcome, ProcessOutcome, SweepSummary};
pub use reconciler::PaymentReconciler;
pub use retry::RetryPolicy;
