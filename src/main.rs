#![allow(dead_code)]

mod api;
mod config;
mod exchanges;
mod execution;
mod models;
mod momentum;
mod persistence;
mod signals;
mod telemetry;
mod triarb;

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::Config;
use crate::execution::{ExecutionRateLimiter, OrderExecutor};
use crate::momentum::MomentumWorker;
use crate::persistence::{InMemoryStore, Store};
use crate::telemetry::{AlertManager, LatencyTracker, PnlTracker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(true)
        .init();

    info!("================================================");
    info!("  quantflow — momentum + triangular-arbitrage engine");
    info!("================================================");

    let config = Config::load_or_default();
    if let Err(err) = config.validate() {
        error!(%err, "config validation failed, running in dry-run / analysis mode");
    }
    if config.worker.dry_run {
        warn!("DRY_RUN active — no live orders will be submitted");
    }

    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let rate_limiter = Arc::new(ExecutionRateLimiter::with_cooldown_overrides(config.cooldown_overrides.clone()));
    let executor = Arc::new(OrderExecutor::new(rate_limiter));

    let worker = Arc::new(MomentumWorker::new(store.clone(), executor.clone(), config.worker.clone(), config.exchanges.clone()));

    let pnl_tracker = Arc::new(PnlTracker::new(rust_decimal::Decimal::ZERO));
    let latency_tracker = Arc::new(LatencyTracker::new(1000));
    let alert_mgr = Arc::new(AlertManager::new(config.telemetry.clone()));

    // Momentum scheduler: the 60s tick loop driving entry/exit evaluation
    // across every active strategy (spec §4.3).
    {
        let worker = worker.clone();
        tokio::spawn(async move {
            worker.run().await;
        });
    }

    // Telemetry loop: periodic P&L and latency summaries (teacher precedent:
    // `PnlTracker`/`LatencyTracker` logged on a fixed interval).
    {
        let pnl = pnl_tracker.clone();
        let latency = latency_tracker.clone();
        let alerts = alert_mgr.clone();
        let worker = worker.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(30));
            loop {
                interval.tick().await;
                pnl.log_summary().await;
                latency.log_summary();
                let errors = worker.cycle_error_count();
                if errors > 0 {
                    warn!(errors, "momentum worker has accumulated cycle errors");
                    alerts.on_error(&format!("{errors} momentum cycle errors so far")).await;
                }
            }
        });
    }

    info!("=== quantflow running ===");
    info!("Momentum worker ticking every {}s. Press Ctrl+C to shut down.", config.worker.tick_interval_secs);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, finishing in-flight cycle and exiting.");
    pnl_tracker.log_summary().await;
    latency_tracker.log_summary();

    Ok(())
}
