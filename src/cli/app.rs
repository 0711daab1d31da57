//! Beacon application integrating all components

use crate::capabilities::{DiagnosticSink, InventorySearch, OrderGateway, PricingPolicy};
use crate::config::BeaconConfig;
use crate::connector::{
    Envelope, LinkEvent, RegisterPayload, SessionConnector, SessionHandle,
};
use crate::error::{BeaconError, Result};
use crate::negotiation::{DeclineReason, NegotiationEngine};
use crate::transaction::{TransactionProcessor, TransactionStore};
use crate::types::BeaconId;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A running beacon: session connector, negotiation engine and
/// transaction processor wired together.
pub struct BeaconApp {
    engine: NegotiationEngine,
    handle: SessionHandle,
    events: mpsc::UnboundedReceiver<LinkEvent>,
    outbound: mpsc::UnboundedReceiver<Envelope>,
    register: RegisterPayload,
}

impl BeaconApp {
    /// Wire the components and start the connector
    pub fn new(
        config: BeaconConfig,
        inventory: Arc<dyn InventorySearch>,
        pricing: Arc<dyn PricingPolicy>,
        gateway: Arc<dyn OrderGateway>,
        store: Arc<dyn TransactionStore>,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Result<Self> {
        config.validate()?;

        let pubkey = hex::decode(&config.identity.pubkey_hex)
            .map_err(|e| BeaconError::InvalidConfig(format!("identity.pubkey_hex: {}", e)))?;
        let register = RegisterPayload {
            beacon_id: BeaconId::from_pubkey(&pubkey),
            display_name: config.identity.display_name.clone(),
            capabilities: config.identity.capabilities.clone(),
        };

        let processor = Arc::new(TransactionProcessor::new(
            store,
            gateway,
            config.commit.clone(),
            sink.clone(),
        ));

        let (engine, outbound) = NegotiationEngine::new(
            inventory,
            pricing,
            processor,
            sink.clone(),
            config.negotiation.clone(),
        );

        let (handle, events) = SessionConnector::spawn(config.connector.clone(), sink);

        Ok(Self {
            engine,
            handle,
            events,
            outbound,
            register,
        })
    }

    /// Engine view for status queries; usable while `run` owns the app
    pub fn engine(&self) -> NegotiationEngine {
        self.engine.clone()
    }

    pub fn session(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Run the event loop until the link goes down for good or the
    /// connector stops.
    pub async fn run(mut self) -> Result<()> {
        loop {
            tokio::select! {
                event = self.events.recv() => {
                    match event {
                        None => return Ok(()),
                        Some(LinkEvent::Connected) => {
                            tracing::info!(beacon_id = %self.register.beacon_id, "registering with core");
                            self.handle
                                .send(Envelope::Register(self.register.clone()))?;
                        }
                        Some(LinkEvent::Disconnected) => {
                            // Open negotiations die with the session, even
                            // if it comes back
                            self.engine.cancel_all(DeclineReason::SessionClosed);
                        }
                        Some(LinkEvent::Envelope(envelope)) => {
                            self.engine.handle_envelope(envelope);
                        }
                        Some(LinkEvent::LinkDown { attempts }) => {
                            self.engine.cancel_all(DeclineReason::SessionClosed);
                            return Err(BeaconError::LinkDown(attempts));
                        }
                    }
                }
                envelope = self.outbound.recv() => {
                    let Some(envelope) = envelope else { return Ok(()) };
                    if let Err(e) = self.handle.send(envelope) {
                        tracing::warn!(error = %e, "failed to queue outbound envelope");
                    }
                }
            }
        }
    }
}
