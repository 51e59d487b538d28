//! Adapter for hosted calendars exposing a Google-Calendar-style events API.
//!
//! Recurrences are expanded server-side (`singleEvents=true`, ordered by
//! start time); the configured time zone resolves day boundaries for all-day
//! events.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::debug;

use hearth_common::config::SourceConfig;
use hearth_common::ids::event_id;
use hearth_common::time::{day_window, Window};
use hearth_common::types::{Breadcrumb, CanonicalEvent, EventSource, Venue, UNTITLED_EVENT};

use super::{
    get_json_with_retry, redact_url, FetchWindow, HostContext, NormalizedEvent, RawEventPayload,
    SourceAdapter, MAX_PAGES,
};

/// Default window: one day back, sixty days ahead.
const DEFAULT_LOOKBACK_DAYS: i64 = 1;
const DEFAULT_LOOKAHEAD_DAYS: i64 = 60;
const CHUNK_DAYS: u32 = 7;

pub struct CalendarAdapter {
    source_id: String,
    label: String,
    base_url: String,
    api_key: Option<String>,
    time_zone: Tz,
    client: reqwest::Client,
}

// --- Wire shapes ---

#[derive(Debug, Deserialize)]
struct CalendarPage {
    #[serde(default)]
    items: Vec<serde_json::Value>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CalendarItem {
    id: String,
    summary: Option<String>,
    description: Option<String>,
    location: Option<String>,
    status: Option<String>,
    updated: Option<String>,
    #[serde(rename = "htmlLink")]
    html_link: Option<String>,
    organizer: Option<CalendarOrganizer>,
    start: Option<CalendarTime>,
    end: Option<CalendarTime>,
}

#[derive(Debug, Deserialize)]
struct CalendarOrganizer {
    #[serde(rename = "displayName")]
    display_name: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CalendarTime {
    #[serde(rename = "dateTime")]
    date_time: Option<String>,
    date: Option<String>,
    #[serde(rename = "timeZone")]
    time_zone: Option<String>,
}

impl CalendarAdapter {
    pub fn new(config: &SourceConfig, api_key: Option<String>) -> Self {
        let time_zone = config
            .time_zone
            .as_deref()
            .and_then(|tz| tz.parse().ok())
            .unwrap_or(chrono_tz::UTC);

        Self {
            source_id: config.source_id.clone(),
            label: config.label.clone(),
            base_url: config.url.clone(),
            api_key,
            time_zone,
            client: reqwest::Client::new(),
        }
    }

    fn resolve_window(&self, window: &FetchWindow) -> Window {
        match window {
            FetchWindow::Range(w) => *w,
            FetchWindow::Day(date) => self.day_range(*date),
            FetchWindow::Default => {
                let now = Utc::now();
                Window {
                    start: now - Duration::days(DEFAULT_LOOKBACK_DAYS),
                    end: now + Duration::days(DEFAULT_LOOKAHEAD_DAYS),
                }
            }
        }
    }

    fn day_range(&self, date: NaiveDate) -> Window {
        let noon = date.and_hms_opt(12, 0, 0).expect("noon is always valid");
        let instant = self
            .time_zone
            .from_local_datetime(&noon)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&noon));
        day_window(instant, self.time_zone)
    }

    fn page_url(&self, window: Window, page_token: Option<&str>) -> Result<String> {
        let mut url = reqwest::Url::parse(&self.base_url)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("timeMin", &window.start.to_rfc3339())
                .append_pair("timeMax", &window.end.to_rfc3339())
                .append_pair("singleEvents", "true")
                .append_pair("orderBy", "startTime")
                .append_pair("timeZone", self.time_zone.name())
                .append_pair("maxResults", "250");
            if let Some(token) = page_token {
                pairs.append_pair("pageToken", token);
            }
            if let Some(ref key) = self.api_key {
                pairs.append_pair("key", key);
            }
        }
        Ok(url.to_string())
    }

    fn parse_time(&self, time: &CalendarTime) -> Result<(DateTime<Utc>, bool)> {
        if let Some(ref stamp) = time.date_time {
            let parsed = DateTime::parse_from_rfc3339(stamp)
                .map_err(|e| anyhow!("bad dateTime {stamp}: {e}"))?;
            return Ok((parsed.with_timezone(&Utc), false));
        }

        if let Some(ref date) = time.date {
            // All-day: local midnight in the event's zone
            let naive = NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .map_err(|e| anyhow!("bad date {date}: {e}"))?
                .and_hms_opt(0, 0, 0)
                .expect("midnight is always valid");
            let tz: Tz = time
                .time_zone
                .as_deref()
                .and_then(|t| t.parse().ok())
                .unwrap_or(self.time_zone);
            let instant = tz
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|| Utc.from_utc_datetime(&naive));
            return Ok((instant, true));
        }

        Err(anyhow!("calendar item has no start time"))
    }
}

#[async_trait]
impl SourceAdapter for CalendarAdapter {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn default_chunk_days(&self) -> u32 {
        CHUNK_DAYS
    }

    async fn fetch_raw_events(&self, window: &FetchWindow) -> Result<Vec<RawEventPayload>> {
        let range = self.resolve_window(window);
        let mut payloads = Vec::new();
        let mut page_token: Option<String> = None;

        for page in 0..MAX_PAGES {
            let url = self.page_url(range, page_token.as_deref())?;
            let body = get_json_with_retry(&self.client, &url).await?;
            let parsed: CalendarPage = serde_json::from_value(body)?;

            debug!(
                source_id = %self.source_id,
                page,
                items = parsed.items.len(),
                "calendar page fetched"
            );

            let fetched_at = Utc::now();
            for mut item in parsed.items {
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

            page_token = parsed.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        Ok(payloads)
    }

    fn normalize(&self, payload: &RawEventPayload) -> Result<NormalizedEvent> {
        let item: CalendarItem = serde_json::from_value(payload.raw.clone())?;

        let start = item
            .start
            .as_ref()
            .ok_or_else(|| anyhow!("calendar item {} has no start", item.id))?;
        let (start_time, is_all_day) = self.parse_time(start)?;
        let end_time = item
            .end
            .as_ref()
            .and_then(|t| self.parse_time(t).ok())
            .map(|(t, _)| t);

        let title = item
            .summary
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(UNTITLED_EVENT)
            .to_string();

        let organizer = item
            .organizer
            .as_ref()
            .and_then(|o| o.display_name.clone().or_else(|| o.email.clone()));
        let host = HostContext::derive(organizer.as_deref(), &self.label, &self.source_id);

        let last_updated_at = item
            .updated
            .as_deref()
            .and_then(|u| DateTime::parse_from_rfc3339(u).ok())
            .map(|t| t.with_timezone(&Utc));

        let venue = item.location.as_ref().map(|loc| Venue {
            name: None,
            address: None,
            raw_location: Some(loc.clone()),
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
            time_zone: start
                .time_zone
                .clone()
                .or_else(|| Some(self.time_zone.name().to_string())),
            is_all_day: Some(is_all_day),
            venue,
            organizer,
            price: None,
            status: item.status.clone(),
            tags: Vec::new(),
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
                source_url: item.html_link.clone(),
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

    fn adapter() -> CalendarAdapter {
        CalendarAdapter::new(
            &SourceConfig {
                source_id: "s1".to_string(),
                kind: hearth_common::config::SourceKind::Calendar,
                url: "https://calendar.example.com/v3/calendars/abc/events".to_string(),
                label: "City Calendar".to_string(),
                time_zone: Some("America/Los_Angeles".to_string()),
            },
            Some("sk-cal-secret".to_string()),
        )
    }

    fn payload(raw: serde_json::Value) -> RawEventPayload {
        RawEventPayload {
            source_id: "s1".to_string(),
            source_event_id: "e1".to_string(),
            fetched_at: Utc::now(),
            raw,
        }
    }

    #[test]
    fn normalizes_timed_event() {
        let normalized = adapter()
            .normalize(&payload(serde_json::json!({
                "id": "e1",
                "summary": "Community Yoga in the Park",
                "description": "Bring a mat",
                "location": "Loring Park",
                "status": "confirmed",
                "updated": "2024-06-10T08:00:00Z",
                "htmlLink": "https://calendar.example.com/event?eid=e1",
                "organizer": {"displayName": "Parks Dept"},
                "start": {"dateTime": "2024-06-16T10:00:00-07:00"},
                "end": {"dateTime": "2024-06-16T11:00:00-07:00"}
            })))
            .unwrap();

        let event = normalized.event;
        assert_eq!(event.id, "s1:e1");
        assert_eq!(event.title, "Community Yoga in the Park");
        assert_eq!(event.is_all_day, Some(false));
        assert_eq!(
            event.start_time,
            Utc.with_ymd_and_hms(2024, 6, 16, 17, 0, 0).unwrap()
        );
        assert_eq!(normalized.host.host_name, "Parks Dept");
        assert_eq!(event.breadcrumbs.len(), 1);
    }

    #[test]
    fn all_day_event_resolves_local_midnight() {
        let normalized = adapter()
            .normalize(&payload(serde_json::json!({
                "id": "e1",
                "summary": "Street Fair",
                "start": {"date": "2024-06-16"},
                "end": {"date": "2024-06-17"}
            })))
            .unwrap();

        assert_eq!(normalized.event.is_all_day, Some(true));
        // Midnight PDT = 07:00 UTC
        assert_eq!(
            normalized.event.start_time,
            Utc.with_ymd_and_hms(2024, 6, 16, 7, 0, 0).unwrap()
        );
    }

    #[test]
    fn missing_title_falls_back_to_untitled() {
        let normalized = adapter()
            .normalize(&payload(serde_json::json!({
                "id": "e1",
                "start": {"dateTime": "2024-06-16T10:00:00Z"}
            })))
            .unwrap();
        assert_eq!(normalized.event.title, UNTITLED_EVENT);
        // No organizer: host falls back to the calendar label
        assert_eq!(normalized.host.host_name, "City Calendar");
    }

    #[test]
    fn missing_start_is_an_error() {
        let result = adapter().normalize(&payload(serde_json::json!({"id": "e1"})));
        assert!(result.is_err());
    }

    #[test]
    fn page_url_carries_window_and_expansion_params() {
        let a = adapter();
        let window = Window::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 6, 8, 0, 0, 0).unwrap(),
        )
        .unwrap();
        let url = a.page_url(window, Some("tok123")).unwrap();
        assert!(url.contains("singleEvents=true"));
        assert!(url.contains("orderBy=startTime"));
        assert!(url.contains("pageToken=tok123"));
        assert!(url.contains("key=sk-cal-secret"));
        // And the redacted form never leaks the key
        assert!(!redact_url(&url).contains("sk-cal-secret"));
    }
}
