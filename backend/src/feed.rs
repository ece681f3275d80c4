//! feed.rs — paginated ingest of the newest-first comm feed
//!
//! The feed endpoint returns up to one page of events at a time, newest
//! first, bounded above by `maxTimestampMs`. The ingester walks backwards
//! from "now" until it reaches the caller's lookback floor, pushing each
//! page through the normalizer into the history store. Page overlap is
//! expected and harmless — the store ignores duplicates — so any error
//! simply terminates the run with whatever is already committed, and the
//! next run re-covers the window.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::normalizer::{normalize_record, FeedRecord, NormalizedEvent};
use crate::store::HistoryStore;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("feed payload malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct FeedResponse {
    #[serde(default)]
    result: Vec<FeedRecord>,
}

// ── Client ────────────────────────────────────────────────────────────────────

pub struct FeedClient {
    http: reqwest::Client,
    url: String,
    base_payload: Value,
    cookie: Option<String>,
}

impl FeedClient {
    pub fn new(url: String, base_payload: Value, cookie: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url,
            base_payload,
            cookie,
        }
    }

    /// One page of events older than `max_timestamp_ms`, newest first.
    async fn fetch_page(&self, max_timestamp_ms: i64) -> Result<Vec<FeedRecord>, FeedError> {
        let payload = page_payload(&self.base_payload, max_timestamp_ms);
        let mut request = self.http.post(&self.url).json(&payload);
        if let Some(cookie) = &self.cookie {
            request = request.header(reqwest::header::COOKIE, cookie);
        }
        let response = request.send().await?.error_for_status()?;
        let raw = response.bytes().await?;
        let body: FeedResponse = serde_json::from_slice(&raw)?;
        Ok(body.result)
    }
}

/// The request body echoes the captured base payload with only the paging
/// window overridden.
pub fn page_payload(base: &Value, max_timestamp_ms: i64) -> Value {
    let mut payload = base.clone();
    if let Some(map) = payload.as_object_mut() {
        map.insert("minTimestampMs".to_string(), Value::from(-1));
        map.insert("maxTimestampMs".to_string(), Value::from(max_timestamp_ms));
        map.insert("plextContinuationGuid".to_string(), Value::from(""));
    }
    payload
}

// ── Ingest loop ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    /// Walk pages until the oldest record falls before this floor
    pub stop_before_ms: i64,
    /// First page upper bound, usually "now"
    pub start_cursor_ms: i64,
    /// Politeness delay between pages
    pub page_delay: Duration,
}

#[derive(Debug, Default)]
pub struct IngestSummary {
    pub pages: u32,
    pub records: u64,
    pub stored: u64,
    pub oldest_ms: Option<i64>,
}

/// Drive the paginated fetch until the lookback floor, the end of the feed,
/// a page error, or a stop request. Storage errors propagate; feed errors
/// terminate cleanly.
pub async fn run_ingest(
    client: &FeedClient,
    store: &HistoryStore,
    options: &IngestOptions,
    stop: &AtomicBool,
) -> anyhow::Result<IngestSummary> {
    let mut summary = IngestSummary::default();
    let mut cursor = options.start_cursor_ms;

    loop {
        if stop.load(Ordering::Relaxed) {
            info!("ingest: stop requested after {} page(s)", summary.pages);
            break;
        }

        let page = match client.fetch_page(cursor).await {
            Ok(page) => page,
            Err(e) => {
                // Committed pages stay; the next run re-covers this window
                warn!("ingest: page fetch failed ({e}), terminating");
                break;
            }
        };
        if page.is_empty() {
            info!("ingest: feed exhausted at cursor {cursor}");
            break;
        }

        let events: Vec<NormalizedEvent> = page.iter().filter_map(normalize_record).collect();
        store.write_page(&events).await?;

        summary.pages += 1;
        summary.records += page.len() as u64;
        summary.stored += events.len() as u64;

        // Newest-first: the last record of the page is the oldest
        let oldest = page.last().map(|r| r.timestamp()).unwrap_or(cursor);
        summary.oldest_ms = Some(oldest);
        debug!(
            "ingest: page {} — {} record(s), {} kept, oldest {}",
            summary.pages,
            page.len(),
            events.len(),
            oldest
        );

        if oldest < options.stop_before_ms {
            info!("ingest: reached lookback floor at {oldest}");
            break;
        }
        cursor = oldest - 1;
        tokio::time::sleep(options.page_delay).await;
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn page_payload_overrides_only_the_window_fields() {
        let base = json!({
            "minLatE6": 52_000_000,
            "maxLatE6": 53_000_000,
            "minLngE6": 13_000_000,
            "maxLngE6": 14_000_000,
            "minTimestampMs": 123,
            "maxTimestampMs": 456,
            "plextContinuationGuid": "stale-guid",
            "tab": "all",
            "zoom": 15
        });
        let payload = page_payload(&base, 1_700_000_000_000);

        assert_eq!(payload["minTimestampMs"], -1);
        assert_eq!(payload["maxTimestampMs"], 1_700_000_000_000i64);
        assert_eq!(payload["plextContinuationGuid"], "");
        // Everything else echoes the captured request untouched
        assert_eq!(payload["minLatE6"], 52_000_000);
        assert_eq!(payload["tab"], "all");
        assert_eq!(payload["zoom"], 15);
    }

    #[test]
    fn feed_response_tolerates_missing_result() {
        let empty: FeedResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.result.is_empty());

        let full: FeedResponse = serde_json::from_value(json!({
            "result": [[
                "ev-1",
                1_700_000_000_000i64,
                { "plext": { "text": "agentX captured X", "markup": [] } }
            ]]
        }))
        .unwrap();
        assert_eq!(full.result.len(), 1);
        assert_eq!(full.result[0].id(), "ev-1");
    }
}
