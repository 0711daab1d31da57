//! The negotiation aggregate: one correlation id's offer lineage and state

use crate::error::{BeaconError, Result};
use crate::transaction::AgreedSale;
use crate::types::{unix_millis, CorrelationId, CounterpartyId};

use super::types::{
    DeclineReason, Inquiry, Intent, NegotiationState, Offer, OfferOrigin, Proposition,
    PropositionStatus, Terms,
};

/// Mutable aggregate binding one proposition's lineage (original offer plus
/// the chain of counter-offers) to a single correlation id. Owns the
/// authoritative current terms; all transitions are monotonic and terminal
/// states absorb.
#[derive(Clone, Debug)]
pub struct Negotiation {
    correlation_id: CorrelationId,
    counterparty: CounterpartyId,
    intent: Intent,
    state: NegotiationState,
    offers: Vec<Offer>,
    /// Present from `Proposed` onward
    proposition: Option<Proposition>,
    /// Completed counter-offer rounds
    rounds: u32,
    created_at: u64,
}

impl Negotiation {
    /// Create from an inbound inquiry, in state `Received`
    pub fn from_inquiry(inquiry: Inquiry) -> Self {
        Self {
            correlation_id: inquiry.correlation_id,
            counterparty: inquiry.counterparty,
            intent: inquiry.intent,
            state: NegotiationState::Received,
            offers: Vec::new(),
            proposition: None,
            rounds: 0,
            created_at: inquiry.received_at,
        }
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn counterparty(&self) -> &CounterpartyId {
        &self.counterparty
    }

    pub fn intent(&self) -> &Intent {
        &self.intent
    }

    pub fn state(&self) -> &NegotiationState {
        &self.state
    }

    /// Offer lineage, oldest first
    pub fn offers(&self) -> &[Offer] {
        &self.offers
    }

    pub fn proposition(&self) -> Option<&Proposition> {
        self.proposition.as_ref()
    }

    pub fn current_terms(&self) -> Option<&Terms> {
        self.proposition.as_ref().map(|p| &p.terms)
    }

    /// Unix millis; zero before the first proposition
    pub fn expires_at(&self) -> u64 {
        self.proposition.as_ref().map(|p| p.expires_at).unwrap_or(0)
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    fn guard_active(&self, action: &str) -> Result<()> {
        if self.state.is_terminal() {
            return Err(BeaconError::InvalidStateTransition(format!(
                "{} on terminal negotiation {}",
                action, self.correlation_id
            )));
        }
        Ok(())
    }

    fn proposition_mut(&mut self, action: &str) -> Result<&mut Proposition> {
        let correlation_id = self.correlation_id.clone();
        self.proposition.as_mut().ok_or_else(|| {
            BeaconError::InvalidStateTransition(format!(
                "{} before proposition on {}",
                action, correlation_id
            ))
        })
    }

    /// `Received -> Proposed`: put the first offer on the table
    pub fn propose(&mut self, terms: Terms, expires_at: u64) -> Result<()> {
        if self.state != NegotiationState::Received {
            return Err(BeaconError::InvalidStateTransition(format!(
                "propose from {:?} on {}",
                self.state, self.correlation_id
            )));
        }

        self.offers.push(Offer {
            unit_price: terms.unit_price,
            origin: OfferOrigin::Beacon,
            at: unix_millis(),
        });
        self.proposition = Some(Proposition {
            correlation_id: self.correlation_id.clone(),
            terms,
            expires_at,
            status: PropositionStatus::Offered,
        });
        self.state = NegotiationState::Proposed;
        Ok(())
    }

    /// Record an inbound counter-offer; valid in `Proposed` or `Countered`
    pub fn record_counter(&mut self, unit_price: u64) -> Result<()> {
        self.guard_active("counter-offer")?;
        if self.state == NegotiationState::Received {
            return Err(BeaconError::InvalidStateTransition(format!(
                "counter-offer before proposition on {}",
                self.correlation_id
            )));
        }

        self.offers.push(Offer {
            unit_price,
            origin: OfferOrigin::Counterparty,
            at: unix_millis(),
        });
        self.rounds += 1;
        self.proposition_mut("counter-offer")?.status = PropositionStatus::Countered;
        self.state = NegotiationState::Countered;
        Ok(())
    }

    /// Re-offer at a new price after a counter-offer; stays `Countered`
    pub fn reoffer(&mut self, unit_price: u64, expires_at: u64) -> Result<()> {
        self.guard_active("re-offer")?;
        let proposition = self.proposition_mut("re-offer")?;
        proposition.terms.unit_price = unit_price;
        proposition.expires_at = expires_at;
        proposition.status = PropositionStatus::Countered;

        self.offers.push(Offer {
            unit_price,
            origin: OfferOrigin::Beacon,
            at: unix_millis(),
        });
        self.state = NegotiationState::Countered;
        Ok(())
    }

    /// Accept at the given price; valid in `Proposed` or `Countered`
    pub fn accept_at(&mut self, unit_price: u64) -> Result<()> {
        self.guard_active("accept")?;
        let proposition = self.proposition_mut("accept")?;
        proposition.terms.unit_price = unit_price;
        proposition.status = PropositionStatus::Accepted;
        self.state = NegotiationState::Accepted;
        Ok(())
    }

    /// Accept at the terms currently on the table
    pub fn accept_current(&mut self) -> Result<()> {
        let price = self
            .current_terms()
            .map(|t| t.unit_price)
            .ok_or_else(|| {
                BeaconError::InvalidStateTransition(format!(
                    "accept before proposition on {}",
                    self.correlation_id
                ))
            })?;
        self.accept_at(price)
    }

    /// Decline with a reason; valid from any non-terminal state
    pub fn decline(&mut self, reason: DeclineReason) -> Result<()> {
        self.guard_active("decline")?;
        if let Some(proposition) = self.proposition.as_mut() {
            proposition.status = PropositionStatus::Declined;
        }
        self.state = NegotiationState::Declined { reason };
        Ok(())
    }

    /// Offer TTL elapsed before a terminal decision
    pub fn expire(&mut self) -> Result<()> {
        self.guard_active("expire")?;
        if let Some(proposition) = self.proposition.as_mut() {
            proposition.status = PropositionStatus::Expired;
        }
        self.state = NegotiationState::Expired;
        Ok(())
    }

    /// Snapshot for the transaction handoff; only an accepted
    /// negotiation yields one.
    pub fn agreed_sale(&self) -> Result<AgreedSale> {
        if self.state != NegotiationState::Accepted {
            return Err(BeaconError::NotAccepted(self.correlation_id.0.clone()));
        }
        let terms = self.current_terms().cloned().ok_or_else(|| {
            BeaconError::Internal(format!("accepted without terms: {}", self.correlation_id))
        })?;

        Ok(AgreedSale {
            correlation_id: self.correlation_id.clone(),
            counterparty: self.counterparty.clone(),
            terms,
        })
    }
}
