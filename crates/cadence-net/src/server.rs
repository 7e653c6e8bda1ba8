//! TCP listener and accept loop.
//!
//! `Listener::bind` owns the whole transport side: it binds the socket,
//! spawns the accept loop, and hands out the registry that stages use as
//! their transport. Accept failures are logged and the loop keeps going;
//! cancellation stops the loop and every connection task spawned under it.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::connection;
use crate::registry::Registry;

/// A running TCP listener with its registry.
///
/// Dropping the listener cancels the accept loop and all of its connection
/// tasks, so tests can run several instances on ephemeral ports without
/// leaking.
pub struct Listener {
    registry: Arc<Registry>,
    local_addr: SocketAddr,
    cancel: CancellationToken,
}

impl Listener {
    /// Binds `addr` and starts accepting endpoint connections.
    pub async fn bind(addr: &str) -> io::Result<Self> {
        let tcp = TcpListener::bind(addr).await?;
        let local_addr = tcp.local_addr()?;
        let registry = Arc::new(Registry::new());
        let cancel = CancellationToken::new();

        tokio::spawn(accept_loop(
            tcp,
            Arc::clone(&registry),
            cancel.clone(),
        ));

        info!(%local_addr, "listening for endpoint connections");
        Ok(Self {
            registry,
            local_addr,
            cancel,
        })
    }

    /// The registry backing this listener. Stages use it as their transport.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The bound address, useful when binding port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops the accept loop and tears down every connection task.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn accept_loop(tcp: TcpListener, registry: Arc<Registry>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("accept loop stopped");
                break;
            }
            accepted = tcp.accept() => {
                match accepted {
                    Ok((socket, peer_addr)) => {
                        let registry = Arc::clone(&registry);
                        let child = cancel.child_token();
                        tokio::spawn(connection::handle(socket, peer_addr, registry, child));
                    }
                    Err(err) => {
                        warn!(error = %err, "accept failed");
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
