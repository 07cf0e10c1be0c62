pub mod money;
pub mod types;

pub use money::Money;
pub use types::{LineItemId, OrderRecordId, PaymentId, TransactionId, WorkerId};
