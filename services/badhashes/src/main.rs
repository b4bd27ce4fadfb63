mod config;
mod report;

use anyhow::{Context, Result};
use clap::Parser;
use hierarchy::{CallGuard, Connector, Hash, HierarchyWalker, RpcDialer};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::AppConfig;

/// Find the replacement block on every region and zone chain once a top-tier
/// block has been declared bad.
#[derive(Parser, Debug)]
#[command(name = "badhashes", version, about)]
struct Cli {
    /// Hash of the bad top-tier block (hex, 0x prefix optional)
    bad_hash: Hash,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // stdout carries only the report
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = AppConfig::load().context("Failed to load configuration")?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            on_interrupt.cancel();
        }
    });

    let connector = Connector::new(RpcDialer::new(cfg.call_timeout), cfg.retry.clone());
    let mut progress = connector.subscribe();
    tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let state = progress.borrow_and_update().clone();
            debug!(
                sweep = state.sweeps,
                top = state.top,
                regions = ?state.regions,
                zones = ?state.zones,
                "connectivity"
            );
        }
    });

    info!(
        branching = cfg.endpoints.branching(),
        endpoints = cfg.endpoints.total(),
        "connecting to hierarchy"
    );
    let pool = connector
        .establish(&cfg.endpoints, &cancel)
        .await
        .context("Failed to connect to hierarchy nodes")?;

    let walker = HierarchyWalker::new(&pool, cfg.genesis, cfg.max_walk_steps)
        .with_guard(CallGuard::new(cfg.call_timeout, cancel.clone()));
    let propagation = walker
        .propagate(cli.bad_hash)
        .await
        .with_context(|| format!("Failed to propagate bad hash {}", cli.bad_hash))?;

    let out = report::render(&propagation, cfg.output).context("Failed to render report")?;
    print!("{out}");
    Ok(())
}
