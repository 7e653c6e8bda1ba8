//! Per-connection handler.
//!
//! The first non-blank inbound line is the endpoint's display name; the
//! connection registers once it arrives, so a silent client delays only
//! itself, never the accept loop. After registration a single task
//! multiplexes outbound lines from the registry mailbox with inbound reply
//! lines until EOF, an IO error, or shutdown. Replies carry the line exactly
//! as received (terminator stripped); whitespace-only lines are dropped.
//! The roster entry is never removed: identities outlive their connections.

use std::net::SocketAddr;
use std::sync::Arc;

use cadence_types::reply::Reply;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::registry::Registry;

/// Drives one endpoint connection to completion.
pub(crate) async fn handle(
    socket: TcpStream,
    peer_addr: SocketAddr,
    registry: Arc<Registry>,
    cancel: CancellationToken,
) {
    let (read_half, mut write_half) = socket.into_split();
    let mut lines = BufReader::new(read_half).lines();

    let name = loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            line = lines.next_line() => match line {
                Ok(Some(line)) if !line.trim().is_empty() => break line.trim().to_string(),
                // blank noise ahead of the name, keep waiting
                Ok(Some(_)) => {}
                Ok(None) => {
                    debug!(%peer_addr, "connection closed before announcing a name");
                    return;
                }
                Err(err) => {
                    debug!(%peer_addr, error = %err, "failed reading name line");
                    return;
                }
            },
        }
    };

    let (endpoint, mut outbound) = registry.register(&name);
    info!(%endpoint, name = name.as_str(), %peer_addr, "endpoint registered");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(%endpoint, "connection task cancelled");
                break;
            }

            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        debug!(%endpoint, reply = line.as_str(), "reply received");
                        registry.deliver(Reply::new(endpoint, line));
                    }
                    Ok(None) => {
                        info!(%endpoint, name = name.as_str(), "endpoint disconnected");
                        break;
                    }
                    Err(err) => {
                        warn!(%endpoint, error = %err, "read failed, closing connection");
                        break;
                    }
                }
            }

            outgoing = outbound.recv() => {
                match outgoing {
                    Some(text) => {
                        if let Err(err) = write_line(&mut write_half, &text).await {
                            warn!(%endpoint, error = %err, "write failed, closing connection");
                            break;
                        }
                        debug!(%endpoint, line = text.as_str(), "line sent");
                    }
                    // the registry holds the sender for as long as the
                    // roster entry exists, which is forever
                    None => break,
                }
            }
        }
    }
}

async fn write_line(write_half: &mut OwnedWriteHalf, text: &str) -> std::io::Result<()> {
    write_half.write_all(text.as_bytes()).await?;
    write_half.write_all(b"\n").await?;
    write_half.flush().await
}
