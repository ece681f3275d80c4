//! main.rs — Fieldlapse backend entry point
//!
//! Two-phase tool: `fetch` walks the comm feed backwards into the history
//! store, `replay` drives the stored history through the world simulator and
//! streams frames to the external renderer. `status` reports what the store
//! currently covers.

mod config;
mod feed;
mod normalizer;
mod replay;
mod store;

use std::fs::File;
use std::io::{self, BufWriter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use config::Config;
use feed::{run_ingest, FeedClient, IngestOptions};
use replay::{run_replay, JsonFrameSink, ReplayOptions};
use store::HistoryStore;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "fieldlapse",
    about = "Territorial timelapse reconstruction from the intel comm feed"
)]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "fieldlapse.toml")]
    config: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest feed history back to the configured lookback floor
    Fetch {
        /// Override the lookback floor (epoch milliseconds)
        #[arg(long)]
        until_ms: Option<i64>,
    },
    /// Replay stored history into timelapse frames
    Replay {
        /// Write frames to this file instead of stdout
        #[arg(long)]
        frames: Option<String>,
    },
    /// Show history store coverage
    Status,
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

fn format_ms(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ms.to_string())
}

// ── Commands ──────────────────────────────────────────────────────────────────

async fn fetch(cfg: &Config, until_ms: Option<i64>) -> Result<()> {
    let store = HistoryStore::open(&cfg.store.database)
        .await
        .with_context(|| format!("opening history store {}", cfg.store.database))?;
    let base_payload = cfg.feed.load_payload()?;
    let client = FeedClient::new(cfg.feed.url.clone(), base_payload, cfg.feed.cookie.clone());

    let stop_before_ms = match until_ms {
        Some(ms) => ms,
        None => cfg.replay.fetch_floor_ms()?,
    };
    info!("fetching feed history back to {}", format_ms(stop_before_ms));

    let stop = Arc::new(AtomicBool::new(false));
    let stop_signal = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing current page");
            stop_signal.store(true, Ordering::Relaxed);
        }
    });

    let options = IngestOptions {
        stop_before_ms,
        start_cursor_ms: now_ms(),
        page_delay: Duration::from_millis(cfg.feed.page_delay_ms),
    };
    let summary = run_ingest(&client, &store, &options, &stop).await?;
    info!(
        "ingest done: {} page(s), {} record(s) seen, {} action(s) kept, oldest {}",
        summary.pages,
        summary.records,
        summary.stored,
        summary.oldest_ms.map(format_ms).unwrap_or_else(|| "-".into())
    );
    Ok(())
}

async fn replay_history(cfg: &Config, frames: Option<String>) -> Result<()> {
    let store = HistoryStore::open(&cfg.store.database)
        .await
        .with_context(|| format!("opening history store {}", cfg.store.database))?;
    let portals = store.load_portals().await?;
    let actions = store.load_actions().await?;
    info!(
        "replaying {} action(s) over {} portal(s)",
        actions.len(),
        portals.len()
    );

    let options = ReplayOptions {
        simulation_start_ms: cfg.replay.simulation_start_ms()?,
        recording_start_ms: cfg.replay.recording_start_ms()?,
        step_seconds: cfg.replay.step_seconds,
        per_action: cfg.replay.per_action,
    };
    let stop = AtomicBool::new(false);

    let summary = match frames {
        Some(path) => {
            let file = File::create(&path).with_context(|| format!("creating {path}"))?;
            let mut sink = JsonFrameSink::new(BufWriter::new(file));
            run_replay(&portals, &actions, &options, &mut sink, &stop)?
        }
        None => {
            let mut sink = JsonFrameSink::new(io::stdout().lock());
            run_replay(&portals, &actions, &options, &mut sink, &stop)?
        }
    };
    info!("replay done: {} frame(s) emitted", summary.frames);
    Ok(())
}

async fn status(cfg: &Config) -> Result<()> {
    let store = HistoryStore::open(&cfg.store.database)
        .await
        .with_context(|| format!("opening history store {}", cfg.store.database))?;
    let stats = store.stats().await?;
    info!(
        "history: {} portal(s), {} action(s)",
        stats.portals, stats.actions
    );
    if let (Some(oldest), Some(newest)) = (stats.oldest_ms, stats.newest_ms) {
        info!("covered window: {} … {}", format_ms(oldest), format_ms(newest));
    }
    Ok(())
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fieldlapse_backend=info".into()),
        )
        .init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;
    info!(
        "Fieldlapse backend v{} — config {}",
        env!("CARGO_PKG_VERSION"),
        args.config
    );

    match args.command {
        Command::Fetch { until_ms } => fetch(&cfg, until_ms).await,
        Command::Replay { frames } => replay_history(&cfg, frames).await,
        Command::Status => status(&cfg).await,
    }
}
