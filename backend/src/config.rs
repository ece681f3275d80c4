//! config.rs — Project settings for one timelapse run
//!
//! Written by the (external) configuration wizard, read here. The replay
//! window is given as RFC 3339 timestamps for the humans editing the file;
//! everything past this module speaks epoch milliseconds.

use anyhow::{Context, Result};
use chrono::DateTime;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub feed: FeedConfig,
    pub store: StoreConfig,
    pub replay: ReplayConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub url: String,
    /// Captured base request body (JSON) the wizard saved; the ingester only
    /// overrides the paging fields.
    pub payload: String,
    /// Session cookie attached verbatim to feed requests
    pub cookie: Option<String>,
    /// Politeness delay between pages
    pub page_delay_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: "https://intel.ingress.com/r/getPlexts".to_string(),
            payload: "payload.json".to_string(),
            cookie: None,
            page_delay_ms: 1500,
        }
    }
}

impl FeedConfig {
    pub fn load_payload(&self) -> Result<Value> {
        let raw = std::fs::read_to_string(&self.payload)
            .with_context(|| format!("reading feed payload {}", self.payload))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing feed payload {}", self.payload))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: "history.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Earliest event replayed into the simulator (RFC 3339)
    pub simulation_start: Option<String>,
    /// Earliest timestamp that produces emitted frames (RFC 3339).
    /// Defaults to `simulation_start`.
    pub recording_start: Option<String>,
    /// Frame step for time-stepped replay
    pub step_seconds: f64,
    /// Emit one frame per visible change instead of fixed time steps
    pub per_action: bool,
    /// Pre-recording lookback the ingester covers beyond `recording_start`
    pub history_context_ms: i64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            simulation_start: None,
            recording_start: None,
            step_seconds: 60.0,
            per_action: false,
            history_context_ms: 3_600_000,
        }
    }
}

impl ReplayConfig {
    pub fn simulation_start_ms(&self) -> Result<i64> {
        let raw = self
            .simulation_start
            .as_deref()
            .context("replay.simulation_start is not set")?;
        parse_ms(raw).context("parsing replay.simulation_start")
    }

    pub fn recording_start_ms(&self) -> Result<i64> {
        match self.recording_start.as_deref() {
            Some(raw) => parse_ms(raw).context("parsing replay.recording_start"),
            None => self.simulation_start_ms(),
        }
    }

    /// The ingest lookback floor: enough history to seed the simulation and
    /// to give the first recorded frame its context window.
    pub fn fetch_floor_ms(&self) -> Result<i64> {
        let simulation = self.simulation_start_ms()?;
        let recording = self.recording_start_ms()?;
        Ok(simulation.min(recording - self.history_context_ms))
    }
}

fn parse_ms(raw: &str) -> Result<i64> {
    Ok(DateTime::parse_from_rfc3339(raw)?.timestamp_millis())
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            anyhow::bail!("config file {path} not found");
        }
        let raw = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
        toml::from_str(&raw).with_context(|| format!("parsing {path}"))
    }
}
