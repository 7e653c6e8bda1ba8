//! Connection registry: the endpoint roster and reply routing.
//!
//! The `Registry` is the hub between connections and stages. Each registered
//! connection gets a bounded `mpsc` mailbox for outbound lines; stages
//! install reply sinks through the `Transport` impl and inbound replies are
//! routed to whichever sink is bound for the producing endpoint.

use std::sync::atomic::{AtomicU32, Ordering};

use cadence_core::transport::{BindOutcome, ReplySink, Transport};
use cadence_types::endpoint::EndpointId;
use cadence_types::reply::Reply;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Buffer size for per-connection outbound mailboxes (mpsc).
const OUTBOUND_BUFFER: usize = 64;

/// A connected endpoint as the registry sees it.
#[derive(Debug, Clone)]
struct Peer {
    /// Display name announced on the first line after connect.
    name: String,
    /// Sender half of the connection's outbound mailbox.
    outbound: mpsc::Sender<String>,
}

/// Endpoint roster and reply bindings.
///
/// The roster is append-only: identities are handed out in registration
/// order starting at 1 and survive disconnects. One registry exists per
/// listener, so tests can run several independent instances side by side.
pub struct Registry {
    peers: DashMap<EndpointId, Peer>,
    bindings: DashMap<EndpointId, ReplySink>,
    next_id: AtomicU32,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            peers: DashMap::new(),
            bindings: DashMap::new(),
            next_id: AtomicU32::new(1),
        }
    }

    /// Registers a connection under the next identity.
    ///
    /// Returns the assigned id and the receiving half of the connection's
    /// outbound mailbox.
    pub(crate) fn register(&self, name: &str) -> (EndpointId, mpsc::Receiver<String>) {
        let id = EndpointId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        self.peers.insert(
            id,
            Peer {
                name: name.to_string(),
                outbound: tx,
            },
        );
        (id, rx)
    }

    /// Display name for an endpoint, if it ever registered.
    pub fn peer_name(&self, endpoint: EndpointId) -> Option<String> {
        self.peers.get(&endpoint).map(|peer| peer.name.clone())
    }

    /// Snapshot of the roster in identity order.
    pub fn peers(&self) -> Vec<(EndpointId, String)> {
        let mut all: Vec<_> = self
            .peers
            .iter()
            .map(|entry| (*entry.key(), entry.value().name.clone()))
            .collect();
        all.sort_by_key(|(id, _)| *id);
        all
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Routes an inbound reply to the endpoint's bound listener.
    ///
    /// With no listener installed (no stage is waiting on this endpoint)
    /// the reply is dropped.
    pub fn deliver(&self, reply: Reply) {
        let endpoint = reply.endpoint();
        match self.bindings.get(&endpoint) {
            Some(sink) => {
                if !sink.deliver(reply) {
                    debug!(%endpoint, "reply listener gone, reply dropped");
                }
            }
            None => {
                debug!(%endpoint, "no reply listener bound, reply dropped");
            }
        }
    }
}

impl Transport for Registry {
    async fn send_line(&self, endpoint: EndpointId, text: &str) {
        let Some(peer) = self.peers.get(&endpoint) else {
            warn!(%endpoint, "send to unknown endpoint dropped");
            return;
        };
        match peer.outbound.try_send(text.to_string()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(%endpoint, "outbound mailbox full, line dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(%endpoint, "connection closed, line dropped");
            }
        }
    }

    fn bind(&self, endpoint: EndpointId, sink: ReplySink) -> BindOutcome {
        match self.bindings.insert(endpoint, sink) {
            Some(_) => BindOutcome::Replaced,
            None => BindOutcome::Fresh,
        }
    }

    fn release(&self, endpoint: EndpointId, sink: &ReplySink) {
        self.bindings
            .remove_if(&endpoint, |_, current| current.same_channel(sink));
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("peers", &self.peers.len())
            .field("bindings", &self.bindings.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
