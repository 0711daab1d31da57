//! Negotiation types and state machine

use crate::types::{CorrelationId, CounterpartyId, Sku};
use serde::{Deserialize, Serialize};

/// What the counterparty is looking for
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Intent {
    /// Free-text search query
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Highest unit price the counterparty will entertain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_unit_price: Option<u64>,
    pub quantity: u32,
}

/// An inbound inquiry, immutable once received
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Inquiry {
    pub correlation_id: CorrelationId,
    pub counterparty: CounterpartyId,
    pub intent: Intent,
    /// Unix millis at receipt
    pub received_at: u64,
}

/// The terms currently on the table for one negotiation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Terms {
    pub sku: Sku,
    /// Unit price in minor currency units
    pub unit_price: u64,
    pub quantity: u32,
}

impl Terms {
    pub fn total(&self) -> u64 {
        self.unit_price.saturating_mul(self.quantity as u64)
    }
}

/// Who put the current price on the table
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OfferOrigin {
    Beacon,
    Counterparty,
}

/// One entry in a proposition's offer lineage
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Offer {
    pub unit_price: u64,
    pub origin: OfferOrigin,
    /// Unix millis
    pub at: u64,
}

/// Status of a proposition; transitions are monotonic and the last
/// three are terminal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropositionStatus {
    Offered,
    Countered,
    Accepted,
    Declined,
    Expired,
}

impl PropositionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PropositionStatus::Accepted
                | PropositionStatus::Declined
                | PropositionStatus::Expired
        )
    }
}

/// A priced offer for one matched catalog item
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Proposition {
    pub correlation_id: CorrelationId,
    pub terms: Terms,
    /// Unix millis after which the offer no longer stands
    pub expires_at: u64,
    pub status: PropositionStatus,
}

/// Why a negotiation was declined
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclineReason {
    NoInventory,
    Unpriceable,
    InvalidTerms,
    OutOfPolicy,
    CounterpartyDeclined,
    SessionClosed,
    CommitFailed,
    UnknownCorrelation,
    Expired,
}

/// Negotiation state machine
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NegotiationState {
    /// Inquiry received, inventory not yet consulted
    Received,
    /// Initial proposition sent
    Proposed,
    /// At least one counter-offer round has happened
    Countered,
    /// Terms agreed; eligible for transaction handoff
    Accepted,
    /// Declined with a reason, by either side or by policy
    Declined { reason: DeclineReason },
    /// Offer TTL elapsed before a terminal decision
    Expired,
}

impl NegotiationState {
    /// Check if the negotiation is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NegotiationState::Accepted
                | NegotiationState::Declined { .. }
                | NegotiationState::Expired
        )
    }

    /// Check if the negotiation is active
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_terminal() {
        let declined = NegotiationState::Declined {
            reason: DeclineReason::NoInventory,
        };
        assert!(declined.is_terminal());
        assert!(!declined.is_active());

        let received = NegotiationState::Received;
        assert!(!received.is_terminal());
        assert!(received.is_active());

        assert!(NegotiationState::Accepted.is_terminal());
        assert!(NegotiationState::Expired.is_terminal());
        assert!(NegotiationState::Countered.is_active());
    }

    #[test]
    fn test_proposition_status_terminal() {
        assert!(!PropositionStatus::Offered.is_terminal());
        assert!(!PropositionStatus::Countered.is_terminal());
        assert!(PropositionStatus::Accepted.is_terminal());
        assert!(PropositionStatus::Declined.is_terminal());
        assert!(PropositionStatus::Expired.is_terminal());
    }

    #[test]
    fn test_terms_total() {
        let terms = Terms {
            sku: Sku("sku-1".to_string()),
            unit_price: 450,
            quantity: 3,
        };
        assert_eq!(terms.total(), 1350);
    }

    #[test]
    fn test_inquiry_serialization() {
        let inquiry = Inquiry {
            correlation_id: CorrelationId("corr_1".to_string()),
            counterparty: CounterpartyId("scout_1".to_string()),
            intent: Intent {
                query: "espresso grinder".to_string(),
                category: None,
                max_unit_price: Some(12000),
                quantity: 1,
            },
            received_at: 1234567890,
        };

        let serialized = serde_json::to_string(&inquiry).unwrap();
        let deserialized: Inquiry = serde_json::from_str(&serialized).unwrap();

        assert_eq!(inquiry.correlation_id, deserialized.correlation_id);
        assert_eq!(inquiry.intent.quantity, deserialized.intent.quantity);
    }
}
