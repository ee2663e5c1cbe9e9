//! RealLive SEI monitor daemon.
//!
//! - Pulls live FLV from the media server for each monitored stream
//! - Decodes embedded telemetry SEI into the in-memory cache
//! - Optionally follows SRS publish state to start and stop monitors
//! - Logs person detections and streams going offline

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::{broadcast, watch};
use tracing_subscriber::EnvFilter;

use reallive_common::events::CacheEvent;
use reallive_monitor::config::{MonitorConfigInput, StreamConfigInput};
use reallive_monitor::poller::LivePoller;
use reallive_monitor::{sweep, MonitorRegistry, TelemetryCache};

/// RealLive SEI telemetry monitor.
#[derive(Parser, Debug)]
#[command(name = "reallive-monitor", about = "RealLive SEI telemetry monitor")]
struct Cli {
    /// TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Live FLV base URL (overrides config and SRS_FLV_BASE).
    #[arg(long)]
    flv_base: Option<String>,

    /// SRS HTTP API URL; enables the live-status poller.
    #[arg(long)]
    srs_api: Option<String>,

    /// Stream to monitor from startup. Repeatable.
    #[arg(long = "stream", value_name = "KEY[@NAMESPACE]")]
    streams: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut input = match &cli.config {
        Some(path) => MonitorConfigInput::from_file(path)?,
        None => MonitorConfigInput::default(),
    }
    .with_env(|key| std::env::var(key).ok());
    if let Some(base) = cli.flv_base {
        input.flv_base_url = Some(base);
    }
    if let Some(api) = cli.srs_api {
        input.srs_api = Some(api);
    }
    input
        .streams
        .extend(cli.streams.iter().map(|s| StreamConfigInput::parse(s)));
    let config = input.resolve()?;

    tracing::info!(
        flv_base = %config.flv_base,
        stale_after_ms = config.stale_after.as_millis() as u64,
        streams = config.streams.len(),
        srs_api = config.srs_api.as_ref().map(|u| u.as_str()).unwrap_or("-"),
        "reallive-monitor starting"
    );

    let cache = Arc::new(TelemetryCache::new(config.stale_after));

    // ── Event fan-out ───────────────────────────────────────────
    let (event_tx, mut event_rx) = broadcast::channel::<CacheEvent>(256);
    let tx = event_tx.clone();
    cache.subscribe(move |event: CacheEvent| {
        // Ignore send errors (no subscribers).
        let _ = tx.send(event);
    });
    let event_log = tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(CacheEvent::PersonDetected { stream_id, event }) => {
                    tracing::info!(
                        stream_id = %stream_id,
                        ts = event.ts,
                        score = event.score,
                        x = event.bbox.x,
                        y = event.bbox.y,
                        w = event.bbox.w,
                        h = event.bbox.h,
                        "person detected"
                    );
                }
                Ok(CacheEvent::Offline { stream_id }) => {
                    tracing::info!(stream_id = %stream_id, "stream offline");
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "event log lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let registry = MonitorRegistry::new(cache.clone(), &config)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Task 1: Stale sweep ─────────────────────────────────────
    let sweep_handle = tokio::spawn(sweep::run(
        cache.clone(),
        config.sweep_interval,
        shutdown_rx.clone(),
    ));

    // ── Task 2: Live-status poller ──────────────────────────────
    let poller_handle = match &config.srs_api {
        Some(api) => {
            let poller = LivePoller::new(registry.clone(), api, config.poll_interval)?;
            Some(tokio::spawn(poller.run(shutdown_rx.clone())))
        }
        None => None,
    };

    // ── Static streams ──────────────────────────────────────────
    for target in &config.streams {
        registry.start(&target.stream_id, &target.namespace).await;
    }
    if config.streams.is_empty() && poller_handle.is_none() {
        tracing::warn!("no streams configured and no SRS API set; nothing to monitor");
    }

    // ── Shutdown handling ───────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    tracing::info!("received SIGINT, shutting down");
    let _ = shutdown_tx.send(true);

    if let Some(handle) = poller_handle {
        let _ = handle.await;
    }
    registry.stop_all().await;
    let _ = sweep_handle.await;

    cache.unsubscribe();
    drop(event_tx);
    let _ = event_log.await;

    tracing::info!("reallive-monitor stopped");
    Ok(())
}
