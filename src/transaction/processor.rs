//! Transaction processor: at-most-once sale commit per correlation id

use crate::capabilities::{DiagnosticRecord, DiagnosticSink, OrderGateway};
use crate::config::CommitRetryConfig;
use crate::error::{CommitFailure, Result};
use crate::types::unix_millis;
use std::sync::Arc;

use super::store::TransactionStore;
use super::types::{AgreedSale, CommitOutcome, Transaction, TransactionStatus};

/// Commits accepted negotiations through the order gateway, exactly once
/// per correlation id.
pub struct TransactionProcessor {
    store: Arc<dyn TransactionStore>,
    gateway: Arc<dyn OrderGateway>,
    retry: CommitRetryConfig,
    sink: Arc<dyn DiagnosticSink>,
}

impl TransactionProcessor {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        gateway: Arc<dyn OrderGateway>,
        retry: CommitRetryConfig,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            store,
            gateway,
            retry,
            sink,
        }
    }

    /// Commit a sale. A correlation id that already reached a terminal
    /// status is replayed without touching the gateway again. Transient
    /// gateway failures are retried with backoff; a permanent failure or
    /// an exhausted retry budget marks the transaction `Failed`.
    pub async fn commit(&self, sale: &AgreedSale) -> Result<CommitOutcome> {
        if let Some(existing) = self.store.get(&sale.correlation_id).await? {
            if existing.status.is_terminal() {
                tracing::debug!(
                    correlation_id = %sale.correlation_id,
                    status = ?existing.status,
                    "commit replayed from store"
                );
                return Ok(CommitOutcome {
                    transaction: existing,
                    replayed: true,
                });
            }
            // A Pending record means an earlier attempt was interrupted;
            // fall through and finish the job.
        }

        let mut transaction = Transaction {
            correlation_id: sale.correlation_id.clone(),
            terms: sale.terms.clone(),
            status: TransactionStatus::Pending,
            order_ref: None,
            failure: None,
            updated_at: unix_millis(),
        };
        self.store.put(transaction.clone()).await?;

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            self.sink.record(DiagnosticRecord::CommitAttempt {
                correlation_id: sale.correlation_id.clone(),
                attempt,
            });

            match self
                .gateway
                .commit_order(&sale.terms, &sale.correlation_id)
                .await
            {
                Ok(receipt) => {
                    transaction.status = TransactionStatus::Committed;
                    transaction.order_ref = Some(receipt.order_ref);
                    transaction.updated_at = receipt.committed_at;
                    self.store.put(transaction.clone()).await?;

                    tracing::info!(
                        correlation_id = %sale.correlation_id,
                        order_ref = transaction.order_ref.as_deref().unwrap_or(""),
                        attempt,
                        "sale committed"
                    );
                    return Ok(CommitOutcome {
                        transaction,
                        replayed: false,
                    });
                }
                Err(CommitFailure::Transient(reason)) if attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff.delay(attempt);
                    tracing::warn!(
                        correlation_id = %sale.correlation_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        reason = %reason,
                        "transient commit failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(failure) => {
                    let reason = match &failure {
                        CommitFailure::Transient(reason) => {
                            format!("retries exhausted: {}", reason)
                        }
                        CommitFailure::Permanent(reason) => reason.clone(),
                    };

                    transaction.status = TransactionStatus::Failed;
                    transaction.failure = Some(reason.clone());
                    transaction.updated_at = unix_millis();
                    self.store.put(transaction.clone()).await?;

                    tracing::error!(
                        correlation_id = %sale.correlation_id,
                        attempt,
                        reason = %reason,
                        "sale permanently failed"
                    );
                    return Ok(CommitOutcome {
                        transaction,
                        replayed: false,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{NullSink, OrderReceipt};
    use crate::config::BackoffConfig;
    use crate::negotiation::Terms;
    use crate::transaction::store::MemoryStore;
    use crate::types::{CorrelationId, CounterpartyId, Sku};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Gateway that fails transiently a fixed number of times, then
    /// succeeds; counts every call.
    struct FlakyGateway {
        calls: AtomicU32,
        transient_failures: u32,
        permanent: bool,
    }

    impl FlakyGateway {
        fn succeeding_after(transient_failures: u32) -> Self {
            Self {
                calls: AtomicU32::new(0),
                transient_failures,
                permanent: false,
            }
        }

        fn always_permanent() -> Self {
            Self {
                calls: AtomicU32::new(0),
                transient_failures: 0,
                permanent: true,
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OrderGateway for FlakyGateway {
        async fn commit_order(
            &self,
            _terms: &Terms,
            correlation_id: &CorrelationId,
        ) -> std::result::Result<OrderReceipt, CommitFailure> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.permanent {
                return Err(CommitFailure::Permanent("inventory gone".to_string()));
            }
            if call <= self.transient_failures {
                return Err(CommitFailure::Transient("gateway timeout".to_string()));
            }
            Ok(OrderReceipt {
                order_ref: format!("ord_{}", correlation_id),
                committed_at: unix_millis(),
            })
        }
    }

    fn sale(id: &str) -> AgreedSale {
        AgreedSale {
            correlation_id: CorrelationId(id.to_string()),
            counterparty: CounterpartyId("scout_1".to_string()),
            terms: Terms {
                sku: Sku("sku-1".to_string()),
                unit_price: 90,
                quantity: 1,
            },
        }
    }

    fn retry_config(max_attempts: u32) -> CommitRetryConfig {
        CommitRetryConfig {
            max_attempts,
            backoff: BackoffConfig {
                base_ms: 10,
                multiplier: 2.0,
                cap_ms: 100,
                max_retries: max_attempts,
            },
        }
    }

    fn processor(gateway: Arc<FlakyGateway>, max_attempts: u32) -> TransactionProcessor {
        TransactionProcessor::new(
            Arc::new(MemoryStore::new()),
            gateway,
            retry_config(max_attempts),
            Arc::new(NullSink),
        )
    }

    #[tokio::test]
    async fn test_commit_success_first_attempt() {
        let gateway = Arc::new(FlakyGateway::succeeding_after(0));
        let processor = processor(gateway.clone(), 3);

        let outcome = processor.commit(&sale("corr_1")).await.unwrap();

        assert_eq!(outcome.transaction.status, TransactionStatus::Committed);
        assert!(!outcome.replayed);
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn test_commit_is_idempotent() {
        let gateway = Arc::new(FlakyGateway::succeeding_after(0));
        let processor = processor(gateway.clone(), 3);

        let first = processor.commit(&sale("corr_1")).await.unwrap();
        let second = processor.commit(&sale("corr_1")).await.unwrap();

        // Same outcome, side effect executed at most once
        assert!(!first.replayed);
        assert!(second.replayed);
        assert_eq!(
            first.transaction.order_ref,
            second.transaction.order_ref
        );
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_then_success() {
        // Fails twice, succeeds on the third attempt
        let gateway = Arc::new(FlakyGateway::succeeding_after(2));
        let processor = processor(gateway.clone(), 3);

        let outcome = processor.commit(&sale("corr_1")).await.unwrap();

        assert_eq!(outcome.transaction.status, TransactionStatus::Committed);
        assert!(!outcome.replayed);
        assert_eq!(gateway.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_retries_exhausted() {
        let gateway = Arc::new(FlakyGateway::succeeding_after(10));
        let processor = processor(gateway.clone(), 2);

        let outcome = processor.commit(&sale("corr_1")).await.unwrap();

        assert_eq!(outcome.transaction.status, TransactionStatus::Failed);
        assert!(outcome
            .transaction
            .failure
            .as_deref()
            .unwrap()
            .contains("retries exhausted"));
        assert_eq!(gateway.calls(), 2);
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let gateway = Arc::new(FlakyGateway::always_permanent());
        let processor = processor(gateway.clone(), 5);

        let outcome = processor.commit(&sale("corr_1")).await.unwrap();

        assert_eq!(outcome.transaction.status, TransactionStatus::Failed);
        assert_eq!(
            outcome.transaction.failure.as_deref(),
            Some("inventory gone")
        );
        assert_eq!(gateway.calls(), 1);

        // A later replay returns the failure without touching the gateway
        let replay = processor.commit(&sale("corr_1")).await.unwrap();
        assert!(replay.replayed);
        assert_eq!(replay.transaction.status, TransactionStatus::Failed);
        assert_eq!(gateway.calls(), 1);
    }
}
