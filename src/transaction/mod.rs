//! Transaction processing: exactly-once sale commit per correlation id

pub mod processor;
pub mod store;
pub mod types;

pub use processor::TransactionProcessor;
pub use store::{MemoryStore, TransactionStore};
pub use types::{AgreedSale, CommitOutcome, Transaction, TransactionStatus};
