//! Collaborator capability interfaces consumed by the Beacon core
//!
//! The state machine depends on these narrow traits so inventory, pricing,
//! order commitment and diagnostics can be swapped without touching it.

use crate::error::{CommitFailure, Result};
use crate::negotiation::{Intent, Terms};
use crate::types::{CorrelationId, Sku};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One catalog item matching an intent
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InventoryMatch {
    pub sku: Sku,
    pub title: String,
    /// Units in stock
    pub available: u32,
    /// Listed unit price in minor currency units
    pub list_price: u64,
}

/// Inventory search collaborator
#[async_trait]
pub trait InventorySearch: Send + Sync {
    /// Return catalog items matching the intent, best match first.
    /// An empty result is a normal outcome, not an error.
    async fn search(&self, intent: &Intent) -> Result<Vec<InventoryMatch>>;
}

/// Context for a pricing decision
#[derive(Clone, Debug)]
pub struct QuoteRequest {
    pub sku: Sku,
    pub list_price: u64,
    pub quantity: u32,
    /// Counterparty's standing counter-offer, if this is a re-quote
    pub counter_price: Option<u64>,
}

/// A quotation: the price to offer and the floor below which the
/// beacon will not sell.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Quotation {
    pub ask: u64,
    pub floor: u64,
}

/// Pricing policy collaborator
#[async_trait]
pub trait PricingPolicy: Send + Sync {
    /// Price a request, or fail with `Unpriceable`
    async fn price_for(&self, request: QuoteRequest) -> Result<Quotation>;
}

/// Receipt for a committed order
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub order_ref: String,
    /// Unix millis
    pub committed_at: u64,
}

/// Order commit collaborator. The sale side effect lives here.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn commit_order(
        &self,
        terms: &Terms,
        correlation_id: &CorrelationId,
    ) -> std::result::Result<OrderReceipt, CommitFailure>;
}

/// A structured diagnostic event emitted by the core
#[derive(Clone, Debug)]
pub enum DiagnosticRecord {
    EnvelopeSent { kind: &'static str },
    EnvelopeReceived { kind: &'static str },
    EnvelopeDropped { kind: &'static str },
    StateTransition {
        correlation_id: CorrelationId,
        state: String,
    },
    CommitAttempt {
        correlation_id: CorrelationId,
        attempt: u32,
    },
}

/// Diagnostic sink collaborator. Must never block the core.
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, record: DiagnosticRecord);
}

/// Sink that discards everything
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn record(&self, _record: DiagnosticRecord) {}
}
