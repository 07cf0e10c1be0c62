//! Domain rules for the payment-to-order reconciliation engine.
//!
//! This crate holds the pure pieces and the checkout entry point:
//! - Service catalog (content-scoped vs profile-wide services)
//! - Gateway status mapping onto the internal three-state vocabulary
//! - Quantity distribution across selected content items
//! - Instagram URL classification
//! - Transaction repository turning checkout input into stored records

pub mod catalog;
pub mod checkout;
pub mod error;
pub mod instagram;
pub mod quantity;
pub mod repository;
pub mod status;

pub use catalog::{ServiceCatalog, ServiceDefinition, ServiceKind};
pub use checkout::{CheckoutRequest, ContentSelection, Customer};
pub use error::DomainError;
pub use quantity::distribute;
pub use repository::{CreatedTransaction, TransactionRepository};
pub use status::map_gateway_status;
