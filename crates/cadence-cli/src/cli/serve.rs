//! The `serve` command: accept endpoints, then run the campaign against
//! every connected one.
//!
//! # Execution flow
//!
//! 1. Load the campaign definition and the server config.
//! 2. Bind the listener and hold the connect grace window open.
//! 3. Snapshot the roster; build one chain per connected endpoint.
//! 4. Run all chains concurrently on a `JoinSet`.
//! 5. Print the per-endpoint run summary (styled or JSON).

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use cadence_core::chain::ChainReport;
use cadence_core::stage::StageOutcome;
use cadence_net::server::Listener;
use cadence_types::config::ServerConfig;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::campaign;

pub async fn serve(
    campaign_path: &Path,
    config_path: Option<&Path>,
    port: Option<u16>,
    connect_grace: Option<u64>,
    json: bool,
) -> anyhow::Result<()> {
    let definition = campaign::load_campaign(campaign_path)
        .with_context(|| format!("loading campaign from {}", campaign_path.display()))?;

    let mut config = match config_path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config from {}", path.display()))?;
            toml::from_str::<ServerConfig>(&raw)
                .with_context(|| format!("parsing config from {}", path.display()))?
        }
        None => ServerConfig::default(),
    };
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(grace) = connect_grace {
        config.connect_grace_secs = grace;
    }

    let listener = Listener::bind(&format!("0.0.0.0:{}", config.port)).await?;

    println!(
        "  {} Cadence listening on {}",
        console::style("⚡").bold(),
        console::style(listener.local_addr()).cyan()
    );
    println!(
        "  {}",
        console::style(format!(
            "Waiting {}s for endpoints to connect...",
            config.connect_grace_secs
        ))
        .dim()
    );

    tokio::time::sleep(Duration::from_secs(config.connect_grace_secs)).await;

    let registry = Arc::clone(listener.registry());
    let peers = registry.peers();
    if peers.is_empty() {
        warn!("no endpoints connected, nothing to run");
        println!("  {} No endpoints connected.", console::style("✗").red());
        return Ok(());
    }

    println!(
        "  {} Running campaign '{}' against {} endpoint(s)",
        console::style("▶").bold(),
        console::style(&definition.name).cyan(),
        peers.len()
    );
    println!("  {}", console::style("Press Ctrl+C to stop").dim());

    let mut runs = JoinSet::new();
    for (endpoint, name) in peers {
        let chain = campaign::build_chain(&definition, endpoint, &name)?;
        let registry = Arc::clone(&registry);
        let campaign_name = definition.name.clone();
        runs.spawn(async move {
            info!(
                campaign = campaign_name.as_str(),
                %endpoint,
                endpoint_name = name.as_str(),
                "chain started"
            );
            let report = chain.run(registry.as_ref()).await;
            (endpoint, name, report)
        });
    }

    let mut reports: Vec<(String, ChainReport)> = Vec::new();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            joined = runs.join_next() => match joined {
                Some(Ok((endpoint, name, Ok(report)))) => {
                    info!(
                        %endpoint,
                        endpoint_name = name.as_str(),
                        run_id = %report.run_id,
                        "chain finished"
                    );
                    reports.push((name, report));
                }
                Some(Ok((endpoint, name, Err(err)))) => {
                    warn!(
                        %endpoint,
                        endpoint_name = name.as_str(),
                        error = %err,
                        "chain did not run"
                    );
                }
                Some(Err(err)) => {
                    warn!(error = %err, "chain task panicked");
                }
                None => break,
            },
            _ = &mut shutdown => {
                println!("\n  Interrupted, shutting down.");
                break;
            }
        }
    }

    listener.shutdown();
    print_summary(&reports, json)?;
    Ok(())
}

fn print_summary(reports: &[(String, ChainReport)], json: bool) -> anyhow::Result<()> {
    if json {
        let entries: Vec<_> = reports
            .iter()
            .map(|(name, report)| {
                serde_json::json!({
                    "endpoint": name,
                    "run_id": report.run_id,
                    "stages": report.stages,
                    "final_reply": report.final_reply.as_ref().map(|r| r.text()),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!();
    for (name, report) in reports {
        println!(
            "  {} {}",
            console::style("●").bold(),
            console::style(name).cyan()
        );
        for stage in &report.stages {
            let mark = match stage.outcome {
                StageOutcome::Succeeded => format!("{}", console::style("✓").green()),
                StageOutcome::Exhausted => format!("{}", console::style("✗").red()),
            };
            match &stage.reply {
                Some(reply) => println!("    {mark} {} -> {}", stage.name, reply.text()),
                None => println!("    {mark} {} -> no reply", stage.name),
            }
        }
    }
    println!();
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
