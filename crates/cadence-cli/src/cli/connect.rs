//! The `connect` command: a line-oriented endpoint client.
//!
//! Connects to a campaign server, announces the display name, then bridges
//! the socket and the terminal: inbound lines print to stdout, stdin lines
//! go back as replies.

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

pub async fn connect(addr: &str, name: &str) -> anyhow::Result<()> {
    let socket = TcpStream::connect(addr)
        .await
        .with_context(|| format!("connecting to {addr}"))?;
    let (read_half, mut write_half) = socket.into_split();

    write_half.write_all(format!("{name}\n").as_bytes()).await?;
    write_half.flush().await?;

    println!(
        "  {} Connected to {} as {}",
        console::style("⚡").bold(),
        console::style(addr).cyan(),
        console::style(name).cyan()
    );
    println!(
        "  {}",
        console::style("Type a reply and press Enter. Ctrl+C quits.").dim()
    );

    let mut inbound = BufReader::new(read_half).lines();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = inbound.next_line() => match line? {
                Some(line) => {
                    println!("{} {}", console::style("<").dim(), line);
                }
                None => {
                    println!("\n  Server closed the connection.");
                    break;
                }
            },
            line = stdin.next_line() => match line? {
                Some(line) => {
                    write_half.write_all(line.as_bytes()).await?;
                    write_half.write_all(b"\n").await?;
                    write_half.flush().await?;
                    debug!(line = line.as_str(), "reply sent");
                }
                None => {
                    debug!("stdin closed");
                    break;
                }
            },
        }
    }

    Ok(())
}
