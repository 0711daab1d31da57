//! Session connector: one persistent link to the AURA Core
//!
//! Frames are length-prefixed JSON. The connector owns the dial loop and
//! reconnects with exponential backoff; after the retry budget is spent it
//! surfaces `LinkDown` and stops. Outbound envelopes go through a bounded
//! queue that survives reconnects.

use crate::capabilities::{DiagnosticRecord, DiagnosticSink};
use crate::config::{ConnectorConfig, OverflowPolicy};
use crate::error::{BeaconError, Result};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use super::message::Envelope;

/// Link events delivered to the connector's owner, in arrival order
#[derive(Debug)]
pub enum LinkEvent {
    /// Session established (also after a reconnect)
    Connected,
    /// Session lost; the connector is retrying
    Disconnected,
    /// Inbound envelope
    Envelope(Envelope),
    /// Retry budget exhausted; the connector has stopped
    LinkDown { attempts: u32 },
}

/// Bounded outbound queue shared between handle and writer task
struct OutboundQueue {
    inner: Mutex<VecDeque<Envelope>>,
    notify: Notify,
    capacity: usize,
    overflow: OverflowPolicy,
    connected: AtomicBool,
}

impl OutboundQueue {
    fn new(capacity: usize, overflow: OverflowPolicy) -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            capacity,
            overflow,
            connected: AtomicBool::new(false),
        }
    }

    /// Enqueue per policy. Envelopes queued while disconnected are kept
    /// for the next session; a full queue with no session is an error.
    fn push(&self, envelope: Envelope) -> Result<Option<Envelope>> {
        let mut queue = self.inner.lock().expect("outbound queue poisoned");

        let mut dropped = None;
        if queue.len() >= self.capacity {
            if !self.connected.load(Ordering::SeqCst) {
                return Err(BeaconError::NotConnected);
            }
            match self.overflow {
                OverflowPolicy::Reject => return Err(BeaconError::QueueFull),
                OverflowPolicy::DropOldest => {
                    dropped = queue.pop_front();
                }
            }
        }

        queue.push_back(envelope);
        drop(queue);
        self.notify.notify_one();
        Ok(dropped)
    }

    fn try_pop(&self) -> Option<Envelope> {
        self.inner.lock().expect("outbound queue poisoned").pop_front()
    }

    async fn pop_wait(&self) -> Envelope {
        loop {
            if let Some(envelope) = self.try_pop() {
                return envelope;
            }
            self.notify.notified().await;
        }
    }

    /// Put an envelope back at the head after a failed write
    fn push_front(&self, envelope: Envelope) {
        self.inner
            .lock()
            .expect("outbound queue poisoned")
            .push_front(envelope);
        self.notify.notify_one();
    }

    fn len(&self) -> usize {
        self.inner.lock().expect("outbound queue poisoned").len()
    }
}

/// Sending side of the session connector
#[derive(Clone)]
pub struct SessionHandle {
    queue: Arc<OutboundQueue>,
    sink: Arc<dyn DiagnosticSink>,
}

impl SessionHandle {
    /// Enqueue an outbound envelope
    pub fn send(&self, envelope: Envelope) -> Result<()> {
        let dropped = self.queue.push(envelope)?;
        if let Some(old) = dropped {
            tracing::warn!(kind = old.kind(), "outbound queue full, dropped oldest");
            self.sink
                .record(DiagnosticRecord::EnvelopeDropped { kind: old.kind() });
        }
        Ok(())
    }

    /// True while a session is established
    pub fn is_connected(&self) -> bool {
        self.queue.connected.load(Ordering::SeqCst)
    }

    /// Envelopes currently waiting to be written
    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}

/// Session connector; owns the dial/reconnect task
pub struct SessionConnector;

impl SessionConnector {
    /// Spawn the connector task. Returns the sending handle and the
    /// ordered stream of link events.
    pub fn spawn(
        config: ConnectorConfig,
        sink: Arc<dyn DiagnosticSink>,
    ) -> (SessionHandle, mpsc::UnboundedReceiver<LinkEvent>) {
        let queue = Arc::new(OutboundQueue::new(config.queue_capacity, config.overflow));
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let handle = SessionHandle {
            queue: queue.clone(),
            sink: sink.clone(),
        };

        tokio::spawn(async move {
            Self::dial_loop(config, queue, event_tx, sink).await;
        });

        (handle, event_rx)
    }

    async fn dial_loop(
        config: ConnectorConfig,
        queue: Arc<OutboundQueue>,
        event_tx: mpsc::UnboundedSender<LinkEvent>,
        sink: Arc<dyn DiagnosticSink>,
    ) {
        let mut failures: u32 = 0;

        loop {
            match TcpStream::connect(&config.remote_addr).await {
                Ok(stream) => {
                    failures = 0;
                    queue.connected.store(true, Ordering::SeqCst);
                    tracing::info!(remote = %config.remote_addr, "session established");
                    if event_tx.send(LinkEvent::Connected).is_err() {
                        return;
                    }

                    Self::run_session(stream, &queue, &event_tx, &sink).await;

                    queue.connected.store(false, Ordering::SeqCst);
                    tracing::warn!(remote = %config.remote_addr, "session lost");
                    if event_tx.send(LinkEvent::Disconnected).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    failures += 1;
                    if failures > config.backoff.max_retries {
                        tracing::error!(
                            remote = %config.remote_addr,
                            attempts = failures,
                            "giving up on session link"
                        );
                        let _ = event_tx.send(LinkEvent::LinkDown { attempts: failures });
                        return;
                    }

                    let delay = config.backoff.delay(failures);
                    tracing::debug!(
                        remote = %config.remote_addr,
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "dial failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Pump one established session until it errors or closes
    async fn run_session(
        stream: TcpStream,
        queue: &OutboundQueue,
        event_tx: &mpsc::UnboundedSender<LinkEvent>,
        sink: &Arc<dyn DiagnosticSink>,
    ) {
        let mut framed = Framed::new(stream, LengthDelimitedCodec::new());

        loop {
            tokio::select! {
                inbound = framed.next() => {
                    match inbound {
                        Some(Ok(frame)) => {
                            match serde_json::from_slice::<Envelope>(&frame) {
                                Ok(envelope) => {
                                    sink.record(DiagnosticRecord::EnvelopeReceived {
                                        kind: envelope.kind(),
                                    });
                                    if event_tx.send(LinkEvent::Envelope(envelope)).is_err() {
                                        return;
                                    }
                                }
                                // Per-frame protocol error, never fatal
                                Err(e) => {
                                    tracing::warn!(error = %e, "undecodable inbound frame, skipping");
                                }
                            }
                        }
                        Some(Err(e)) => {
                            tracing::debug!(error = %e, "session read error");
                            return;
                        }
                        None => return,
                    }
                }
                outbound = queue.pop_wait() => {
                    let bytes = match serde_json::to_vec(&outbound) {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            tracing::error!(error = %e, kind = outbound.kind(), "failed to encode envelope");
                            continue;
                        }
                    };

                    let kind = outbound.kind();
                    if let Err(e) = framed.send(Bytes::from(bytes)).await {
                        tracing::debug!(error = %e, "session write error");
                        // Keep the envelope for the next session
                        queue.push_front(outbound);
                        return;
                    }
                    sink.record(DiagnosticRecord::EnvelopeSent { kind });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::NullSink;
    use crate::config::BackoffConfig;
    use crate::connector::message::{DeclinePayload, RegisterPayload};
    use crate::negotiation::DeclineReason;
    use tokio_test::assert_ok;
    use crate::types::{BeaconId, CorrelationId};
    use tokio::net::TcpListener;

    fn register_envelope(name: &str) -> Envelope {
        Envelope::Register(RegisterPayload {
            beacon_id: BeaconId("b1".to_string()),
            display_name: name.to_string(),
            capabilities: vec![],
        })
    }

    fn test_config(remote_addr: String) -> ConnectorConfig {
        ConnectorConfig {
            remote_addr,
            queue_capacity: 4,
            overflow: OverflowPolicy::Reject,
            backoff: BackoffConfig {
                base_ms: 5,
                multiplier: 2.0,
                cap_ms: 20,
                max_retries: 2,
            },
        }
    }

    #[test]
    fn test_queue_reject_policy() {
        let queue = OutboundQueue::new(2, OverflowPolicy::Reject);
        queue.connected.store(true, Ordering::SeqCst);

        queue.push(register_envelope("a")).unwrap();
        queue.push(register_envelope("b")).unwrap();

        let result = queue.push(register_envelope("c"));
        assert!(matches!(result, Err(BeaconError::QueueFull)));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_queue_drop_oldest_policy() {
        let queue = OutboundQueue::new(2, OverflowPolicy::DropOldest);
        queue.connected.store(true, Ordering::SeqCst);

        queue.push(register_envelope("a")).unwrap();
        queue.push(register_envelope("b")).unwrap();
        let dropped = queue.push(register_envelope("c")).unwrap();

        // Oldest envelope was evicted to make room
        match dropped.unwrap() {
            Envelope::Register(payload) => assert_eq!(payload.display_name, "a"),
            _ => panic!("Wrong envelope kind"),
        }
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_queue_full_while_disconnected() {
        let queue = OutboundQueue::new(1, OverflowPolicy::DropOldest);

        // Disconnected with capacity left: queued for the next session
        queue.push(register_envelope("a")).unwrap();

        // Disconnected and full: refused regardless of overflow policy
        let result = queue.push(register_envelope("b"));
        assert!(matches!(result, Err(BeaconError::NotConnected)));
    }

    #[tokio::test]
    async fn test_connect_and_exchange() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (handle, mut events) =
            SessionConnector::spawn(test_config(addr.to_string()), Arc::new(NullSink));

        let (peer, _) = listener.accept().await.unwrap();
        let mut peer = Framed::new(peer, LengthDelimitedCodec::new());

        assert!(matches!(events.recv().await, Some(LinkEvent::Connected)));

        // Outbound: handle -> remote
        assert_ok!(handle.send(register_envelope("hello")));
        let frame = peer.next().await.unwrap().unwrap();
        let envelope: Envelope = serde_json::from_slice(&frame).unwrap();
        assert_eq!(envelope.kind(), "register");

        // Inbound: remote -> events, arrival order preserved
        for id in ["corr_1", "corr_2"] {
            let decline = Envelope::Decline(DeclinePayload {
                correlation_id: CorrelationId(id.to_string()),
                reason: DeclineReason::NoInventory,
            });
            let bytes = serde_json::to_vec(&decline).unwrap();
            peer.send(Bytes::from(bytes)).await.unwrap();
        }

        for expected in ["corr_1", "corr_2"] {
            match events.recv().await {
                Some(LinkEvent::Envelope(envelope)) => {
                    assert_eq!(envelope.correlation_id().unwrap().0, expected);
                }
                other => panic!("Expected envelope, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_undecodable_frame_skipped() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (_handle, mut events) =
            SessionConnector::spawn(test_config(addr.to_string()), Arc::new(NullSink));

        let (peer, _) = listener.accept().await.unwrap();
        let mut peer = Framed::new(peer, LengthDelimitedCodec::new());
        assert!(matches!(events.recv().await, Some(LinkEvent::Connected)));

        // Garbage frame, then a valid one; only the valid one surfaces
        peer.send(Bytes::from_static(b"not json")).await.unwrap();
        let valid = serde_json::to_vec(&register_envelope("ok")).unwrap();
        peer.send(Bytes::from(valid)).await.unwrap();

        match events.recv().await {
            Some(LinkEvent::Envelope(envelope)) => assert_eq!(envelope.kind(), "register"),
            other => panic!("Expected envelope, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_link_down_after_retry_budget() {
        // Bind then drop to get an address nobody is listening on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (handle, mut events) =
            SessionConnector::spawn(test_config(addr.to_string()), Arc::new(NullSink));

        match events.recv().await {
            Some(LinkEvent::LinkDown { attempts }) => assert_eq!(attempts, 3),
            other => panic!("Expected LinkDown, got {:?}", other),
        }
        assert!(!handle.is_connected());
    }

    #[tokio::test]
    async fn test_queued_envelopes_flush_on_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (handle, mut events) =
            SessionConnector::spawn(test_config(addr.to_string()), Arc::new(NullSink));

        // Queue before the session is up
        handle.send(register_envelope("early")).unwrap();

        let (peer, _) = listener.accept().await.unwrap();
        let mut peer = Framed::new(peer, LengthDelimitedCodec::new());
        assert!(matches!(events.recv().await, Some(LinkEvent::Connected)));

        let frame = peer.next().await.unwrap().unwrap();
        let envelope: Envelope = serde_json::from_slice(&frame).unwrap();
        match envelope {
            Envelope::Register(payload) => assert_eq!(payload.display_name, "early"),
            _ => panic!("Wrong envelope kind"),
        }
    }
}
