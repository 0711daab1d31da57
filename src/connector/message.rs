//! Wire envelopes exchanged with the AURA Core
//!
//! Field layout stands in for the external AURA schema; kinds mirror the
//! protocol's registration, inquiry, proposition, counter-offer,
//! transaction and confirmation messages.

use crate::negotiation::{DeclineReason, Intent, Terms};
use crate::types::{BeaconId, CorrelationId, CounterpartyId};
use serde::{Deserialize, Serialize};

/// Message envelope for the session link
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Envelope {
    /// Beacon announces itself after (re)connecting
    Register(RegisterPayload),
    /// Counterparty asks whether the beacon can serve an intent
    Inquiry(InquiryPayload),
    /// Beacon offers (or re-offers) terms
    Proposition(PropositionPayload),
    /// Counterparty proposes a different price
    CounterOffer(CounterOfferPayload),
    /// Either side closes a negotiation without a sale
    Decline(DeclinePayload),
    /// Counterparty accepts the standing terms and requests execution
    Transaction(TransactionPayload),
    /// Beacon confirms a committed sale
    Confirmation(ConfirmationPayload),
}

impl Envelope {
    /// Correlation id carried by the envelope, if any
    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        match self {
            Envelope::Register(_) => None,
            Envelope::Inquiry(p) => Some(&p.correlation_id),
            Envelope::Proposition(p) => Some(&p.correlation_id),
            Envelope::CounterOffer(p) => Some(&p.correlation_id),
            Envelope::Decline(p) => Some(&p.correlation_id),
            Envelope::Transaction(p) => Some(&p.correlation_id),
            Envelope::Confirmation(p) => Some(&p.correlation_id),
        }
    }

    /// Envelope kind as a static label, for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Register(_) => "register",
            Envelope::Inquiry(_) => "inquiry",
            Envelope::Proposition(_) => "proposition",
            Envelope::CounterOffer(_) => "counter_offer",
            Envelope::Decline(_) => "decline",
            Envelope::Transaction(_) => "transaction",
            Envelope::Confirmation(_) => "confirmation",
        }
    }
}

/// Registration handshake payload
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegisterPayload {
    pub beacon_id: BeaconId,
    pub display_name: String,
    pub capabilities: Vec<String>,
}

/// Inbound inquiry payload
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InquiryPayload {
    pub correlation_id: CorrelationId,
    pub counterparty: CounterpartyId,
    pub intent: Intent,
}

/// Offered (or re-offered) terms
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PropositionPayload {
    pub correlation_id: CorrelationId,
    pub terms: Terms,
    /// Unix millis after which the offer no longer stands
    pub expires_at: u64,
}

/// Counter-offer against the standing proposition
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CounterOfferPayload {
    pub correlation_id: CorrelationId,
    pub unit_price: u64,
    pub quantity: u32,
}

/// Terminal notice without a sale
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeclinePayload {
    pub correlation_id: CorrelationId,
    pub reason: DeclineReason,
}

/// Request to execute the standing terms
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransactionPayload {
    pub correlation_id: CorrelationId,
}

/// Confirmation of a committed sale
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfirmationPayload {
    pub correlation_id: CorrelationId,
    pub terms: Terms,
    pub order_ref: String,
    /// Unix millis
    pub committed_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Sku;

    #[test]
    fn test_envelope_serialization() {
        let envelope = Envelope::Inquiry(InquiryPayload {
            correlation_id: CorrelationId("corr_1".to_string()),
            counterparty: CounterpartyId("scout_1".to_string()),
            intent: Intent {
                query: "grinder".to_string(),
                category: Some("kitchen".to_string()),
                max_unit_price: None,
                quantity: 2,
            },
        });

        let serialized = serde_json::to_string(&envelope).unwrap();
        let deserialized: Envelope = serde_json::from_str(&serialized).unwrap();

        match deserialized {
            Envelope::Inquiry(payload) => {
                assert_eq!(payload.correlation_id.0, "corr_1");
                assert_eq!(payload.intent.quantity, 2);
            }
            _ => panic!("Wrong envelope kind"),
        }
    }

    #[test]
    fn test_envelope_correlation_id() {
        let register = Envelope::Register(RegisterPayload {
            beacon_id: BeaconId("b1".to_string()),
            display_name: "beacon".to_string(),
            capabilities: vec![],
        });
        assert!(register.correlation_id().is_none());
        assert_eq!(register.kind(), "register");

        let decline = Envelope::Decline(DeclinePayload {
            correlation_id: CorrelationId("corr_9".to_string()),
            reason: DeclineReason::NoInventory,
        });
        assert_eq!(decline.correlation_id().unwrap().0, "corr_9");
        assert_eq!(decline.kind(), "decline");
    }

    #[test]
    fn test_confirmation_round_trip() {
        let envelope = Envelope::Confirmation(ConfirmationPayload {
            correlation_id: CorrelationId("corr_2".to_string()),
            terms: Terms {
                sku: Sku("sku-7".to_string()),
                unit_price: 90,
                quantity: 1,
            },
            order_ref: "ord_42".to_string(),
            committed_at: 1234567890,
        });

        let bytes = serde_json::to_vec(&envelope).unwrap();
        let back: Envelope = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back.kind(), "confirmation");
    }
}
