//! Adapter for paginated event-feed APIs (`?page=N` with a `nextPage` cursor).

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::debug;

use hearth_common::config::SourceConfig;
use hearth_common::ids::event_id;
use hearth_common::slug::normalize_tags;
use hearth_common::time::{day_window, Window};
use hearth_common::types::{Breadcrumb, CanonicalEvent, EventSource, Venue, UNTITLED_EVENT};

use super::{
    get_json_with_retry, redact_url, FetchWindow, HostContext, NormalizedEvent, RawEventPayload,
    SourceAdapter, MAX_PAGES,
};

/// Default window: upcoming thirty days.
const DEFAULT_LOOKAHEAD_DAYS: i64 = 30;
const CHUNK_DAYS: u32 = 15;

pub struct FeedApiAdapter {
    source_id: String,
    label: String,
    base_url: String,
    time_zone: Tz,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct FeedPage {
    #[serde(default)]
    events: Vec<serde_json::Value>,
    #[serde(rename = "nextPage")]
    next_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedItem {
    id: String,
    title: Option<String>,
    description: Option<String>,
    start_time: String,
    end_time: Option<String>,
    venue: Option<FeedVenue>,
    organizer: Option<String>,
    price: Option<String>,
    status: Option<String>,
    url: Option<String>,
    updated_at: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct FeedVenue {
    name: Option<String>,
    address: Option<String>,
}

impl FeedApiAdapter {
    pub fn new(config: &SourceConfig) -> Self {
        let time_zone = config
            .time_zone
            .as_deref()
            .and_then(|tz| tz.parse().ok())
            .unwrap_or(chrono_tz::UTC);

        Self {
            source_id: config.source_id.clone(),
            label: config.label.clone(),
            base_url: config.url.clone(),
            time_zone,
            client: reqwest::Client::new(),
        }
    }

    fn resolve_window(&self, window: &FetchWindow) -> Window {
        match window {
            FetchWindow::Range(w) => *w,
            FetchWindow::Day(date) => {
                let noon = date.and_hms_opt(12, 0, 0).expect("noon is always valid");
                let instant = self
                    .time_zone
                    .from_local_datetime(&noon)
                    .earliest()
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|| Utc.from_utc_datetime(&noon));
                day_window(instant, self.time_zone)
            }
            FetchWindow::Default => {
                let now = Utc::now();
                Window {
                    start: now,
                    end: now + Duration::days(DEFAULT_LOOKAHEAD_DAYS),
                }
            }
        }
    }

    fn page_url(&self, window: Window, page: u32) -> Result<String> {
        let mut url = reqwest::Url::parse(&self.base_url)?;
        url.query_pairs_mut()
            .append_pair("start", &window.start.to_rfc3339())
            .append_pair("end", &window.end.to_rfc3339())
            .append_pair("page", &page.to_string());
        Ok(url.to_string())
    }
}

#[async_trait]
impl SourceAdapter for FeedApiAdapter {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn default_chunk_days(&self) -> u32 {
        CHUNK_DAYS
    }

    async fn fetch_raw_events(&self, window: &FetchWindow) -> Result<Vec<RawEventPayload>> {
        let range = self.resolve_window(window);
        let mut payloads = Vec::new();
        let mut page = 0u32;

        for _ in 0..MAX_PAGES {
            let url = self.page_url(range, page)?;
            let body = get_json_with_retry(&self.client, &url).await?;
            let parsed: FeedPage = serde_json::from_value(body)?;

            debug!(
                source_id = %self.source_id,
                page,
                items = parsed.events.len(),
                "feed page fetched"
            );

            let fetched_at = Utc::now();
            for mut item in parsed.events {
                let Some(id) = item.get("id").and_then(|v| v.as_str()).map(str::to_string)
                else {
                    continue;
                };
                if let Some(obj) = item.as_object_mut() {
                    obj.insert(
                        "fetchedUrl".to_string(),
                        serde_json::json!(redact_url(&url)),
                    );
                }
                payloads.push(RawEventPayload {
                    source_id: self.source_id.clone(),
                    source_event_id: id,
                    fetched_at,
                    raw: item,
                });
            }

            match parsed.next_page {
                Some(next) => page = next,
                None => break,
            }
        }

        Ok(payloads)
    }

    fn normalize(&self, payload: &RawEventPayload) -> Result<NormalizedEvent> {
        let item: FeedItem = serde_json::from_value(payload.raw.clone())?;

        let start_time = DateTime::parse_from_rfc3339(&item.start_time)
            .map_err(|e| anyhow!("bad startTime {}: {e}", item.start_time))?
            .with_timezone(&Utc);
        let end_time = item
            .end_time
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc));

        let title = item
            .title
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(UNTITLED_EVENT)
            .to_string();

        let host = HostContext::derive(item.organizer.as_deref(), &self.label, &self.source_id);

        let last_updated_at = item
            .updated_at
            .as_deref()
            .and_then(|u| DateTime::parse_from_rfc3339(u).ok())
            .map(|t| t.with_timezone(&Utc));

        let venue = item.venue.as_ref().map(|v| Venue {
            name: v.name.clone(),
            address: v.address.clone(),
            raw_location: None,
        });

        let fetched_url = payload
            .raw
            .get("fetchedUrl")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let event = CanonicalEvent {
            id: event_id(&payload.source_id, &payload.source_event_id),
            title,
            description: item.description.clone(),
            start_time,
            end_time,
            time_zone: Some(self.time_zone.name().to_string()),
            is_all_day: None,
            venue,
            organizer: item.organizer.clone(),
            price: item.price.clone(),
            status: item.status.clone(),
            tags: normalize_tags(&item.tags, &[]),
            classification: None,
            vector: None,
            breadcrumbs: vec![Breadcrumb {
                kind: "source-fetch".to_string(),
                source_id: payload.source_id.clone(),
                source_event_id: payload.source_event_id.clone(),
                fetched_at: payload.fetched_at,
                metadata: fetched_url.map(|u| serde_json::json!({ "fetchedUrl": u })),
            }],
            source: EventSource {
                source_id: payload.source_id.clone(),
                source_event_id: payload.source_event_id.clone(),
                source_url: item.url.clone(),
            },
            last_fetched_at: payload.fetched_at,
            last_updated_at,
            created_at: payload.fetched_at,
            series_id: None,
            series_category_id: None,
            series_category_name: None,
        };

        Ok(NormalizedEvent {
            event,
            raw_snapshot: payload.raw.clone(),
            host,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> FeedApiAdapter {
        FeedApiAdapter::new(&SourceConfig {
            source_id: "s2".to_string(),
            kind: hearth_common::config::SourceKind::FeedApi,
            url: "https://feed.example.com/api/events".to_string(),
            label: "Downtown Feed".to_string(),
            time_zone: None,
        })
    }

    #[test]
    fn normalizes_feed_item_with_source_tags() {
        let normalized = adapter()
            .normalize(&RawEventPayload {
                source_id: "s2".to_string(),
                source_event_id: "f9".to_string(),
                fetched_at: Utc::now(),
                raw: serde_json::json!({
                    "id": "f9",
                    "title": "Salsa Night",
                    "startTime": "2024-06-20T19:00:00Z",
                    "venue": {"name": "The Ballroom", "address": "100 Main St"},
                    "price": "$10",
                    "tags": ["Salsa", "dance", "Tuesday"]
                }),
            })
            .unwrap();

        let event = normalized.event;
        assert_eq!(event.id, "s2:f9");
        assert_eq!(event.price.as_deref(), Some("$10"));
        // "Tuesday" is a stop word, slugs are normalized
        assert_eq!(event.tags, vec!["dance", "salsa"]);
        assert_eq!(event.venue.as_ref().unwrap().name.as_deref(), Some("The Ballroom"));
        // No organizer: host is the feed label
        assert_eq!(normalized.host.host_name, "Downtown Feed");
    }

    #[test]
    fn bad_start_time_fails_normalization() {
        let result = adapter().normalize(&RawEventPayload {
            source_id: "s2".to_string(),
            source_event_id: "f9".to_string(),
            fetched_at: Utc::now(),
            raw: serde_json::json!({"id": "f9", "title": "X", "startTime": "not-a-date"}),
        });
        assert!(result.is_err());
    }
}
