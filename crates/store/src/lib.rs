pub mod error;
pub mod memory;
pub mod postgres;
pub mod records;
pub mod store;

pub use common::{LineItemId, Money, OrderRecordId, PaymentId, TransactionId, WorkerId};
pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use records::{
    ContentType, LineItemRecord, LogEntry, LogLevel, OrderRecord, OrderStatus, ProcessingLock,
    StatusHistoryEntry, TransactionRecord, TransactionStatus,
};
pub use store::{LockCounts, TransactionStore, TransactionStoreExt};
