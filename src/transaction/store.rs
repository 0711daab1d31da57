//! Transaction store keyed by correlation id
//!
//! A trait seam so deployments that need durability across restarts can
//! plug in a persistent store; the default is in-memory.

use crate::error::Result;
use crate::types::CorrelationId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::types::Transaction;

/// Idempotent lookup and persistence of transactions
#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn get(&self, correlation_id: &CorrelationId) -> Result<Option<Transaction>>;
    async fn put(&self, transaction: Transaction) -> Result<()>;
}

/// In-memory store, the default for non-durable deployments
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<CorrelationId, Transaction>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn get(&self, correlation_id: &CorrelationId) -> Result<Option<Transaction>> {
        Ok(self
            .entries
            .lock()
            .expect("transaction store poisoned")
            .get(correlation_id)
            .cloned())
    }

    async fn put(&self, transaction: Transaction) -> Result<()> {
        self.entries
            .lock()
            .expect("transaction store poisoned")
            .insert(transaction.correlation_id.clone(), transaction);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::negotiation::Terms;
    use crate::transaction::types::TransactionStatus;
    use crate::types::Sku;
    use tokio_test::assert_ok;

    fn sample_transaction(id: &str, status: TransactionStatus) -> Transaction {
        Transaction {
            correlation_id: CorrelationId(id.to_string()),
            terms: Terms {
                sku: Sku("sku-1".to_string()),
                unit_price: 90,
                quantity: 1,
            },
            status,
            order_ref: None,
            failure: None,
            updated_at: 0,
        }
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let store = MemoryStore::new();
        let id = CorrelationId("corr_1".to_string());

        assert!(store.get(&id).await.unwrap().is_none());

        assert_ok!(
            store
                .put(sample_transaction("corr_1", TransactionStatus::Pending))
                .await
        );

        let found = store.get(&id).await.unwrap().unwrap();
        assert_eq!(found.status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn test_put_overwrites_status() {
        let store = MemoryStore::new();
        let id = CorrelationId("corr_1".to_string());

        store
            .put(sample_transaction("corr_1", TransactionStatus::Pending))
            .await
            .unwrap();
        store
            .put(sample_transaction("corr_1", TransactionStatus::Committed))
            .await
            .unwrap();

        let found = store.get(&id).await.unwrap().unwrap();
        assert_eq!(found.status, TransactionStatus::Committed);
    }
}
