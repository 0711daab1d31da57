//! Negotiation module: per-correlation-id price discovery

pub mod aggregate;
pub mod engine;
pub mod types;

pub use aggregate::Negotiation;
pub use engine::{ArchivedNegotiation, NegotiationEngine};
pub use types::{
    DeclineReason, Inquiry, Intent, NegotiationState, Offer, OfferOrigin, Proposition,
    PropositionStatus, Terms,
};
