//! Transport port: outbound sends and reply routing, as seen by the engine.
//!
//! The engine never touches sockets. It talks to a `Transport`, which the
//! connection layer implements over real TCP and tests implement in memory.
//! The reply handoff is a bounded `mpsc` channel per in-flight step: the
//! stage installs a `ReplySink` before dispatching, the connection layer
//! pushes every inbound reply through it, and the stage awaits the receiving
//! half under a deadline.

use cadence_types::endpoint::EndpointId;
use cadence_types::reply::Reply;
use tokio::sync::mpsc;
use tracing::debug;

/// Buffer size for per-step reply sinks (mpsc).
pub const REPLY_BUFFER: usize = 16;

/// Sending half of a stage's reply channel.
///
/// Clones refer to the same underlying channel; `same_channel` lets the
/// owner of a binding check that a release matches the sink it installed.
#[derive(Debug, Clone)]
pub struct ReplySink {
    tx: mpsc::Sender<Reply>,
}

impl ReplySink {
    /// Creates a connected sink/receiver pair for one dispatched step.
    pub fn channel() -> (Self, mpsc::Receiver<Reply>) {
        let (tx, rx) = mpsc::channel(REPLY_BUFFER);
        (Self { tx }, rx)
    }

    /// Pushes a reply toward the waiting stage without blocking.
    ///
    /// Returns `false` when nothing is listening any more or the buffer is
    /// full; the reply is dropped in that case.
    pub fn deliver(&self, reply: Reply) -> bool {
        match self.tx.try_send(reply) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(reply)) => {
                debug!(endpoint = %reply.endpoint(), "reply sink full, dropping reply");
                false
            }
            Err(mpsc::error::TrySendError::Closed(reply)) => {
                debug!(endpoint = %reply.endpoint(), "reply sink closed, dropping reply");
                false
            }
        }
    }

    /// Whether `other` refers to the same channel as `self`.
    pub fn same_channel(&self, other: &ReplySink) -> bool {
        self.tx.same_channel(&other.tx)
    }
}

/// Result of installing a reply sink for an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// No listener was installed before.
    Fresh,
    /// An existing listener was replaced. Under the single-listener
    /// contract this means two stages overlapped on one endpoint.
    Replaced,
}

/// Outbound transport and reply routing.
///
/// Uses RPITIT (return-position `impl Trait` in traits) for async methods,
/// consistent with the project's Rust 2024 edition approach. Implemented by
/// the connection registry; engine tests use a scripted in-memory
/// implementation.
pub trait Transport: Send + Sync {
    /// Sends one line of text to an endpoint, best effort.
    ///
    /// Unknown endpoints, closed connections, and full outbound buffers are
    /// logged and dropped; the caller never observes a failure.
    fn send_line(
        &self,
        endpoint: EndpointId,
        text: &str,
    ) -> impl std::future::Future<Output = ()> + Send;

    /// Installs `sink` as the single reply listener for `endpoint`.
    fn bind(&self, endpoint: EndpointId, sink: ReplySink) -> BindOutcome;

    /// Removes the listener for `endpoint`, but only if it still is `sink`.
    ///
    /// A stage whose binding was replaced must not clobber the replacement
    /// when it releases.
    fn release(&self, endpoint: EndpointId, sink: &ReplySink);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deliver_buffers_until_received() {
        let (sink, mut rx) = ReplySink::channel();
        assert!(sink.deliver(Reply::new(EndpointId::new(1), "a")));
        assert!(sink.deliver(Reply::new(EndpointId::new(1), "b")));
        assert_eq!(rx.try_recv().unwrap().text(), "a");
        assert_eq!(rx.try_recv().unwrap().text(), "b");
    }

    #[test]
    fn deliver_after_receiver_dropped_reports_false() {
        let (sink, rx) = ReplySink::channel();
        drop(rx);
        assert!(!sink.deliver(Reply::new(EndpointId::new(1), "late")));
    }

    #[test]
    fn same_channel_distinguishes_sinks() {
        let (a, _rx_a) = ReplySink::channel();
        let (b, _rx_b) = ReplySink::channel();
        assert!(a.same_channel(&a.clone()));
        assert!(!a.same_channel(&b));
    }
}
