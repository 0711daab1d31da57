//! Transaction types

use crate::negotiation::Terms;
use crate::types::{CorrelationId, CounterpartyId};
use serde::{Deserialize, Serialize};

/// Processing status of a transaction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Commit in progress
    Pending,
    /// Sale side effect performed
    Committed,
    /// Permanently failed; never retried again
    Failed,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Committed | TransactionStatus::Failed)
    }
}

/// A sale record keyed by the negotiation's correlation id.
/// The correlation id doubles as the idempotency key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    pub correlation_id: CorrelationId,
    pub terms: Terms,
    pub status: TransactionStatus,
    /// Gateway order reference, set on commit
    pub order_ref: Option<String>,
    /// Failure detail, set on permanent failure
    pub failure: Option<String>,
    /// Unix millis of the last status change
    pub updated_at: u64,
}

/// Snapshot handed off from an accepted negotiation. Constructed only
/// via `Negotiation::agreed_sale`, so accepted terms are guaranteed.
#[derive(Clone, Debug)]
pub struct AgreedSale {
    pub correlation_id: CorrelationId,
    pub counterparty: CounterpartyId,
    pub terms: Terms,
}

/// Result of a commit call
#[derive(Clone, Debug)]
pub struct CommitOutcome {
    pub transaction: Transaction,
    /// True when an earlier terminal result was returned as-is and the
    /// external side effect was not re-executed
    pub replayed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminal() {
        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(TransactionStatus::Committed.is_terminal());
        assert!(TransactionStatus::Failed.is_terminal());
    }
}
