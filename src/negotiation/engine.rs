//! Negotiation engine: one actor task per live correlation id
//!
//! The engine owns two maps: live actor handles and archived outcomes.
//! Envelope dispatch is a map lookup plus a mailbox push, so inbound
//! arrival order is preserved per correlation id while distinct ids never
//! wait on each other. Each actor owns its negotiation aggregate, its
//! expiry timer and the transaction handoff; the timer dies with the
//! actor, so it cannot fire after the negotiation is archived.

use crate::capabilities::{
    DiagnosticRecord, DiagnosticSink, InventorySearch, PricingPolicy, QuoteRequest,
};
use crate::config::NegotiationConfig;
use crate::connector::message::{
    ConfirmationPayload, CounterOfferPayload, DeclinePayload, Envelope, InquiryPayload,
    PropositionPayload, TransactionPayload,
};
use crate::transaction::{TransactionProcessor, TransactionStatus};
use crate::types::{unix_millis, CorrelationId, CounterpartyId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};

use super::aggregate::Negotiation;
use super::types::{DeclineReason, Inquiry, NegotiationState, Terms};

/// Inputs delivered to a negotiation actor, in arrival order
enum ActorInput {
    CounterOffer(CounterOfferPayload),
    /// Counterparty accepts the standing terms and requests execution
    Execute,
    /// Counterparty walked away
    CounterpartyDeclined,
    /// Local cancellation (session closed, shutdown); no outbound notice
    Cancel(DeclineReason),
}

struct ActorHandle {
    mailbox: mpsc::UnboundedSender<ActorInput>,
}

/// Terminal outcome kept after the actor is gone
#[derive(Clone, Debug)]
pub struct ArchivedNegotiation {
    pub correlation_id: CorrelationId,
    pub counterparty: CounterpartyId,
    pub state: NegotiationState,
    pub terms: Option<Terms>,
    pub rounds: u32,
    /// Unix millis
    pub closed_at: u64,
}

struct EngineInner {
    active: Mutex<HashMap<CorrelationId, ActorHandle>>,
    archive: Mutex<HashMap<CorrelationId, ArchivedNegotiation>>,
    inventory: Arc<dyn InventorySearch>,
    pricing: Arc<dyn PricingPolicy>,
    processor: Arc<TransactionProcessor>,
    outbound: mpsc::UnboundedSender<Envelope>,
    sink: Arc<dyn DiagnosticSink>,
    config: NegotiationConfig,
}

impl EngineInner {
    fn send(&self, envelope: Envelope) {
        // Receiver gone means the app is shutting down
        let _ = self.outbound.send(envelope);
    }

    fn record_state(&self, negotiation: &Negotiation) {
        tracing::debug!(
            correlation_id = %negotiation.correlation_id(),
            state = ?negotiation.state(),
            "negotiation transition"
        );
        self.sink.record(DiagnosticRecord::StateTransition {
            correlation_id: negotiation.correlation_id().clone(),
            state: format!("{:?}", negotiation.state()),
        });
    }

    fn archive(&self, negotiation: &Negotiation) {
        let archived = ArchivedNegotiation {
            correlation_id: negotiation.correlation_id().clone(),
            counterparty: negotiation.counterparty().clone(),
            state: negotiation.state().clone(),
            terms: negotiation.current_terms().cloned(),
            rounds: negotiation.rounds(),
            closed_at: unix_millis(),
        };

        self.archive
            .lock()
            .expect("archive map poisoned")
            .insert(archived.correlation_id.clone(), archived);
        self.active
            .lock()
            .expect("active map poisoned")
            .remove(negotiation.correlation_id());
    }
}

/// Negotiation engine managing all live negotiations
#[derive(Clone)]
pub struct NegotiationEngine {
    inner: Arc<EngineInner>,
}

impl NegotiationEngine {
    /// Create an engine. The returned receiver carries every envelope the
    /// engine wants sent to the counterparty.
    pub fn new(
        inventory: Arc<dyn InventorySearch>,
        pricing: Arc<dyn PricingPolicy>,
        processor: Arc<TransactionProcessor>,
        sink: Arc<dyn DiagnosticSink>,
        config: NegotiationConfig,
    ) -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let engine = Self {
            inner: Arc::new(EngineInner {
                active: Mutex::new(HashMap::new()),
                archive: Mutex::new(HashMap::new()),
                inventory,
                pricing,
                processor,
                outbound: outbound_tx,
                sink,
                config,
            }),
        };

        (engine, outbound_rx)
    }

    /// Dispatch one inbound envelope to the owning actor
    pub fn handle_envelope(&self, envelope: Envelope) {
        match envelope {
            Envelope::Inquiry(payload) => self.handle_inquiry(payload),
            Envelope::CounterOffer(payload) => self.handle_counter_offer(payload),
            Envelope::Transaction(payload) => self.handle_transaction(payload),
            Envelope::Decline(payload) => self.handle_decline(payload),
            other => {
                tracing::warn!(kind = other.kind(), "unexpected inbound envelope kind");
            }
        }
    }

    /// Start a negotiation for a new inquiry. A correlation id already
    /// live or archived is treated as a redelivery and ignored.
    pub fn handle_inquiry(&self, payload: InquiryPayload) {
        let correlation_id = payload.correlation_id.clone();

        {
            let active = self.inner.active.lock().expect("active map poisoned");
            if active.contains_key(&correlation_id) {
                tracing::debug!(%correlation_id, "redelivered inquiry for live negotiation, ignoring");
                return;
            }
        }
        {
            let archive = self.inner.archive.lock().expect("archive map poisoned");
            if archive.contains_key(&correlation_id) {
                tracing::debug!(%correlation_id, "redelivered inquiry for closed negotiation, ignoring");
                return;
            }
        }

        let inquiry = Inquiry {
            correlation_id: correlation_id.clone(),
            counterparty: payload.counterparty,
            intent: payload.intent,
            received_at: unix_millis(),
        };

        let (mailbox_tx, mailbox_rx) = mpsc::unbounded_channel();
        self.inner
            .active
            .lock()
            .expect("active map poisoned")
            .insert(correlation_id.clone(), ActorHandle { mailbox: mailbox_tx });

        let inner = self.inner.clone();
        tokio::spawn(async move {
            run_actor(inner, inquiry, mailbox_rx).await;
        });
    }

    pub fn handle_counter_offer(&self, payload: CounterOfferPayload) {
        let correlation_id = payload.correlation_id.clone();
        if !self.route(&correlation_id, ActorInput::CounterOffer(payload)) {
            self.reject_unknown(&correlation_id, "counter-offer");
        }
    }

    pub fn handle_transaction(&self, payload: TransactionPayload) {
        let correlation_id = payload.correlation_id;
        if !self.route(&correlation_id, ActorInput::Execute) {
            self.reject_unknown(&correlation_id, "transaction");
        }
    }

    pub fn handle_decline(&self, payload: DeclinePayload) {
        let correlation_id = payload.correlation_id;
        if !self.route(&correlation_id, ActorInput::CounterpartyDeclined) {
            // Nothing to do for a decline against a closed negotiation
            tracing::debug!(%correlation_id, "decline for unknown or closed negotiation");
        }
    }

    /// Cancel every live negotiation, e.g. when the owning session
    /// disconnects. No outbound notices are produced.
    pub fn cancel_all(&self, reason: DeclineReason) {
        let active = self.inner.active.lock().expect("active map poisoned");
        tracing::info!(count = active.len(), ?reason, "cancelling live negotiations");
        for handle in active.values() {
            let _ = handle.mailbox.send(ActorInput::Cancel(reason));
        }
    }

    /// Number of live negotiations
    pub fn active_count(&self) -> usize {
        self.inner.active.lock().expect("active map poisoned").len()
    }

    /// Terminal outcome for a closed negotiation, if known
    pub fn archived(&self, correlation_id: &CorrelationId) -> Option<ArchivedNegotiation> {
        self.inner
            .archive
            .lock()
            .expect("archive map poisoned")
            .get(correlation_id)
            .cloned()
    }

    /// Push an input to the owning actor. Returns false when the
    /// correlation id has no live actor.
    fn route(&self, correlation_id: &CorrelationId, input: ActorInput) -> bool {
        let active = self.inner.active.lock().expect("active map poisoned");
        match active.get(correlation_id) {
            // A send error means the actor just finished; treat as closed
            Some(handle) => handle.mailbox.send(input).is_ok(),
            None => false,
        }
    }

    /// Per-message protocol error: answer with a decline, never crash
    fn reject_unknown(&self, correlation_id: &CorrelationId, kind: &str) {
        let archived = self
            .inner
            .archive
            .lock()
            .expect("archive map poisoned")
            .contains_key(correlation_id);

        if archived {
            // Already handled once; repeated handoff attempts are a no-op
            tracing::debug!(%correlation_id, kind, "message for closed negotiation, ignoring");
            return;
        }

        tracing::warn!(%correlation_id, kind, "message for unknown correlation id");
        self.inner.send(Envelope::Decline(DeclinePayload {
            correlation_id: correlation_id.clone(),
            reason: DeclineReason::UnknownCorrelation,
        }));
    }
}

/// One negotiation's lifecycle, from inquiry to archive
async fn run_actor(
    inner: Arc<EngineInner>,
    inquiry: Inquiry,
    mut mailbox: mpsc::UnboundedReceiver<ActorInput>,
) {
    let mut negotiation = Negotiation::from_inquiry(inquiry);
    inner.record_state(&negotiation);

    // Inventory search; zero matches declines without ever proposing
    let matches = match inner.inventory.search(negotiation.intent()).await {
        Ok(matches) => matches,
        Err(e) => {
            tracing::error!(
                correlation_id = %negotiation.correlation_id(),
                error = %e,
                "inventory search failed"
            );
            Vec::new()
        }
    };

    let quantity = negotiation.intent().quantity;
    let pick = matches.into_iter().find(|m| m.available >= quantity);

    let Some(item) = pick else {
        decline_and_close(&inner, &mut negotiation, DeclineReason::NoInventory);
        inner.archive(&negotiation);
        return;
    };

    // Catalog price stays the pricing base across counter rounds
    let list_price = item.list_price;

    // Initial quote
    let quote = match inner
        .pricing
        .price_for(QuoteRequest {
            sku: item.sku.clone(),
            list_price,
            quantity,
            counter_price: None,
        })
        .await
    {
        Ok(quote) => quote,
        Err(e) => {
            tracing::warn!(
                correlation_id = %negotiation.correlation_id(),
                error = %e,
                "pricing failed"
            );
            decline_and_close(&inner, &mut negotiation, DeclineReason::Unpriceable);
            inner.archive(&negotiation);
            return;
        }
    };

    let ttl = inner.config.offer_ttl();
    let terms = Terms {
        sku: item.sku,
        unit_price: quote.ask,
        quantity,
    };

    if let Err(e) = negotiation.propose(terms, unix_millis() + inner.config.offer_ttl_ms) {
        tracing::error!(correlation_id = %negotiation.correlation_id(), error = %e, "propose failed");
        inner.archive(&negotiation);
        return;
    }
    inner.record_state(&negotiation);
    send_proposition(&inner, &negotiation);

    let mut deadline = Instant::now() + ttl;

    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {
                // Timeout, not a transport failure; fires even if no
                // further messages ever arrive
                if negotiation.expire().is_ok() {
                    inner.record_state(&negotiation);
                    inner.send(Envelope::Decline(DeclinePayload {
                        correlation_id: negotiation.correlation_id().clone(),
                        reason: DeclineReason::Expired,
                    }));
                }
                break;
            }
            input = mailbox.recv() => {
                let Some(input) = input else { break };
                match input {
                    ActorInput::CounterOffer(payload) => {
                        match on_counter_offer(&inner, &mut negotiation, payload, list_price, ttl)
                            .await
                        {
                            CounterStep::Continue(next_deadline) => deadline = next_deadline,
                            CounterStep::Closed => break,
                        }
                    }
                    ActorInput::Execute => {
                        if let Err(e) = negotiation.accept_current() {
                            tracing::warn!(
                                correlation_id = %negotiation.correlation_id(),
                                error = %e,
                                "execute request in invalid state"
                            );
                            continue;
                        }
                        inner.record_state(&negotiation);
                        hand_off(&inner, &negotiation).await;
                        break;
                    }
                    ActorInput::CounterpartyDeclined => {
                        // Counterparty initiated; no echo back
                        if negotiation.decline(DeclineReason::CounterpartyDeclined).is_ok() {
                            inner.record_state(&negotiation);
                        }
                        break;
                    }
                    ActorInput::Cancel(reason) => {
                        if negotiation.decline(reason).is_ok() {
                            inner.record_state(&negotiation);
                        }
                        break;
                    }
                }
            }
        }
    }

    inner.archive(&negotiation);
}

enum CounterStep {
    Continue(Instant),
    Closed,
}

/// Evaluate one counter-offer: accept at or above the policy floor,
/// otherwise re-offer until the round budget runs out.
async fn on_counter_offer(
    inner: &Arc<EngineInner>,
    negotiation: &mut Negotiation,
    payload: CounterOfferPayload,
    list_price: u64,
    ttl: Duration,
) -> CounterStep {
    let current_quantity = negotiation
        .current_terms()
        .map(|t| t.quantity)
        .unwrap_or_default();

    // Terms outside policy bounds are declined, never crash the engine
    if payload.unit_price == 0 || payload.quantity != current_quantity {
        decline_and_close(inner, negotiation, DeclineReason::InvalidTerms);
        return CounterStep::Closed;
    }

    if let Err(e) = negotiation.record_counter(payload.unit_price) {
        tracing::warn!(
            correlation_id = %negotiation.correlation_id(),
            error = %e,
            "counter-offer rejected"
        );
        decline_and_close(inner, negotiation, DeclineReason::InvalidTerms);
        return CounterStep::Closed;
    }
    inner.record_state(negotiation);

    let sku = negotiation
        .current_terms()
        .expect("countered without terms")
        .sku
        .clone();

    let quote = match inner
        .pricing
        .price_for(QuoteRequest {
            sku,
            list_price,
            quantity: current_quantity,
            counter_price: Some(payload.unit_price),
        })
        .await
    {
        Ok(quote) => quote,
        Err(e) => {
            tracing::warn!(
                correlation_id = %negotiation.correlation_id(),
                error = %e,
                "re-pricing failed"
            );
            decline_and_close(inner, negotiation, DeclineReason::Unpriceable);
            return CounterStep::Closed;
        }
    };

    if payload.unit_price >= quote.floor {
        if let Err(e) = negotiation.accept_at(payload.unit_price) {
            tracing::error!(
                correlation_id = %negotiation.correlation_id(),
                error = %e,
                "accept failed"
            );
            return CounterStep::Closed;
        }
        inner.record_state(negotiation);
        hand_off(inner, negotiation).await;
        return CounterStep::Closed;
    }

    if negotiation.rounds() >= inner.config.max_rounds {
        decline_and_close(inner, negotiation, DeclineReason::OutOfPolicy);
        return CounterStep::Closed;
    }

    if let Err(e) = negotiation.reoffer(quote.ask, unix_millis() + inner.config.offer_ttl_ms) {
        tracing::error!(
            correlation_id = %negotiation.correlation_id(),
            error = %e,
            "re-offer failed"
        );
        return CounterStep::Closed;
    }
    inner.record_state(negotiation);
    send_proposition(inner, negotiation);

    CounterStep::Continue(Instant::now() + ttl)
}

/// Hand an accepted negotiation to the transaction processor, exactly
/// once. The caller breaks its loop afterwards, so no second handoff can
/// happen for this correlation id.
async fn hand_off(inner: &Arc<EngineInner>, negotiation: &Negotiation) {
    let sale = match negotiation.agreed_sale() {
        Ok(sale) => sale,
        Err(e) => {
            tracing::error!(
                correlation_id = %negotiation.correlation_id(),
                error = %e,
                "handoff without accepted terms"
            );
            return;
        }
    };

    match inner.processor.commit(&sale).await {
        Ok(outcome) if outcome.replayed => {
            // Terminal notice already went out the first time
            tracing::debug!(
                correlation_id = %negotiation.correlation_id(),
                "commit replayed, no notice"
            );
        }
        Ok(outcome) => match outcome.transaction.status {
            TransactionStatus::Committed => {
                inner.send(Envelope::Confirmation(ConfirmationPayload {
                    correlation_id: sale.correlation_id.clone(),
                    terms: sale.terms.clone(),
                    order_ref: outcome.transaction.order_ref.unwrap_or_default(),
                    committed_at: outcome.transaction.updated_at,
                }));
            }
            TransactionStatus::Failed => {
                inner.send(Envelope::Decline(DeclinePayload {
                    correlation_id: sale.correlation_id.clone(),
                    reason: DeclineReason::CommitFailed,
                }));
            }
            TransactionStatus::Pending => {
                tracing::error!(
                    correlation_id = %sale.correlation_id,
                    "commit returned non-terminal status"
                );
            }
        },
        Err(e) => {
            // Unrecoverable internal failure: no reply at all rather than
            // a partial one
            tracing::error!(
                correlation_id = %sale.correlation_id,
                error = %e,
                "commit errored"
            );
        }
    }
}

fn send_proposition(inner: &Arc<EngineInner>, negotiation: &Negotiation) {
    let Some(terms) = negotiation.current_terms() else {
        return;
    };
    inner.send(Envelope::Proposition(PropositionPayload {
        correlation_id: negotiation.correlation_id().clone(),
        terms: terms.clone(),
        expires_at: negotiation.expires_at(),
    }));
}

fn decline_and_close(inner: &Arc<EngineInner>, negotiation: &mut Negotiation, reason: DeclineReason) {
    if negotiation.decline(reason).is_err() {
        return;
    }
    inner.record_state(negotiation);
    inner.send(Envelope::Decline(DeclinePayload {
        correlation_id: negotiation.correlation_id().clone(),
        reason,
    }));
}
