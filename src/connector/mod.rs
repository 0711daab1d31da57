//! Session link to the AURA Core

pub mod link;
pub mod message;

pub use link::{LinkEvent, SessionConnector, SessionHandle};
pub use message::{
    ConfirmationPayload, CounterOfferPayload, DeclinePayload, Envelope, InquiryPayload,
    PropositionPayload, RegisterPayload, TransactionPayload,
};
