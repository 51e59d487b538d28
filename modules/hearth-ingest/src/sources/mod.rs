//! Source adapters: fetch raw items from an external backend and normalize
//! them into canonical events plus host context.

pub mod calendar;
pub mod feed;

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use hearth_common::ids::host_id;
use hearth_common::slug::slugify;
use hearth_common::time::Window;
use hearth_common::types::CanonicalEvent;

pub use calendar::CalendarAdapter;
pub use feed::FeedApiAdapter;

/// Retry schedule for outbound fetches: linear backoff, bounded attempts.
const FETCH_ATTEMPTS: u32 = 3;
const FETCH_BACKOFF_MS: u64 = 250;
/// Pagination bound per fetch.
pub(crate) const MAX_PAGES: usize = 25;
/// Per-request timeout.
const FETCH_TIMEOUT_SECS: u64 = 30;

/// The time range a fetch covers.
#[derive(Debug, Clone, Copy)]
pub enum FetchWindow {
    /// One local calendar day.
    Day(NaiveDate),
    /// Explicit half-open UTC range.
    Range(Window),
    /// Source-defined lookback + lookahead.
    Default,
}

/// One raw item from a backend, before normalization.
#[derive(Debug, Clone)]
pub struct RawEventPayload {
    pub source_id: String,
    pub source_event_id: String,
    pub fetched_at: DateTime<Utc>,
    pub raw: serde_json::Value,
}

/// Who is behind an event. `host_id_seed` is deterministic: the same
/// organizer on the same source always produces the same seed.
#[derive(Debug, Clone)]
pub struct HostContext {
    pub host_id_seed: String,
    pub host_name: String,
    pub organizer: Option<String>,
}

impl HostContext {
    /// Prefer the event's declared organizer; fall back to the calendar/feed
    /// label; fall back to a stable slug of the source id.
    pub fn derive(organizer: Option<&str>, label: &str, source_id: &str) -> Self {
        let organizer = organizer.map(str::trim).filter(|s| !s.is_empty());
        let label = label.trim();

        let (seed, name) = match organizer {
            Some(org) => (org.to_string(), org.to_string()),
            None if !label.is_empty() => (label.to_string(), label.to_string()),
            None => {
                let fallback = slugify(source_id);
                let seed = if fallback.is_empty() {
                    source_id.to_string()
                } else {
                    fallback
                };
                (seed.clone(), seed)
            }
        };

        Self {
            host_id_seed: seed,
            host_name: name,
            organizer: organizer.map(str::to_string),
        }
    }

    pub fn host_id(&self, source_id: &str) -> String {
        host_id(&self.host_id_seed, source_id)
    }
}

/// A normalized payload: the canonical event, the opaque raw snapshot that
/// gets stored beside it, and the host context for series attachment.
#[derive(Debug, Clone)]
pub struct NormalizedEvent {
    pub event: CanonicalEvent,
    pub raw_snapshot: serde_json::Value,
    pub host: HostContext,
}

/// Pluggable backend: fetch raw items for a window, normalize one item.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source_id(&self) -> &str;

    /// Chunk size (days) when a large window is split for this source.
    fn default_chunk_days(&self) -> u32;

    async fn fetch_raw_events(&self, window: &FetchWindow) -> Result<Vec<RawEventPayload>>;

    fn normalize(&self, payload: &RawEventPayload) -> Result<NormalizedEvent>;
}

/// GET a JSON document with linear backoff (`attempt * 250ms`, 3 attempts).
pub(crate) async fn get_json_with_retry(
    client: &reqwest::Client,
    url: &str,
) -> Result<serde_json::Value> {
    let mut last_error = None;

    for attempt in 1..=FETCH_ATTEMPTS {
        let result = client
            .get(url)
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                return Ok(response.json().await?);
            }
            Ok(response) => {
                last_error = Some(anyhow!(
                    "fetch failed ({}): {}",
                    response.status(),
                    redact_url(url)
                ));
            }
            Err(e) => {
                last_error = Some(anyhow!("fetch failed: {e}"));
            }
        }

        if attempt < FETCH_ATTEMPTS {
            tokio::time::sleep(Duration::from_millis(FETCH_BACKOFF_MS * attempt as u64)).await;
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow!("fetch failed: {}", redact_url(url))))
}

/// Strip secret-bearing query parameters before a URL is stored anywhere.
pub fn redact_url(url: &str) -> String {
    let Ok(mut parsed) = reqwest::Url::parse(url) else {
        return url.to_string();
    };

    let redacted: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(name, value)| {
            let lower = name.to_lowercase();
            let is_secret = ["key", "token", "secret", "signature", "auth"]
                .iter()
                .any(|marker| lower.contains(marker));
            let value = if is_secret {
                "redacted".to_string()
            } else {
                value.into_owned()
            };
            (name.into_owned(), value)
        })
        .collect();

    if redacted.is_empty() {
        return url.to_string();
    }

    parsed.query_pairs_mut().clear().extend_pairs(redacted);
    parsed.to_string()
}
