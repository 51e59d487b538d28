//! Interaction recording and pinned events.
//!
//! Interactions are validated, written in one atomic batch, and then the
//! side effects fan out concurrently: bookmark actions toggle pins, bundle
//! interactions advance the user's last-seen category version.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use futures::future::join_all;
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use hearth_common::time::{day_window, Window};
use hearth_common::types::{
    CanonicalEvent, ContentType, DayOfWeek, EventSeries, InteractionAction, InteractionContext,
    PinnedEvent, PinnedSeries, TimeOfDay, UserInteraction,
};
use hearth_common::HearthError;
use hearth_store::{BundleStateStore, EventStore, InteractionStore, PinStore, SeriesStore};

use crate::pagination::{decode_page_token, paginate};

/// Interaction batches are capped per request.
pub const MAX_INTERACTION_BATCH: usize = 100;
/// Pinned-event page size bounds.
pub const PIN_PAGE_MAX: usize = 30;
pub const PIN_PAGE_DEFAULT: usize = 10;
/// Default pinned window when no bounds are given.
const DEFAULT_PIN_WINDOW_DAYS: i64 = 30;

// ---------------------------------------------------------------------------
// Input shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInteractionContext {
    pub position: i64,
    #[serde(default)]
    pub session_id: Option<String>,
    pub time_of_day: String,
    pub day_of_week: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInteraction {
    pub user_id: String,
    pub content_id: String,
    pub content_type: String,
    pub action: String,
    #[serde(default)]
    pub dwell_time: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub context: NewInteractionContext,
    #[serde(default)]
    pub content_tags: Vec<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy)]
struct BundleStateRef<'a> {
    category_id: &'a str,
    version: u64,
}

fn validation(message: impl Into<String>) -> HearthError {
    HearthError::Validation(message.into())
}

fn validate_interaction(input: &NewInteraction, now: DateTime<Utc>) -> Result<UserInteraction, HearthError> {
    if input.user_id.trim().is_empty() {
        return Err(validation("userId must be non-empty"));
    }
    if input.content_id.trim().is_empty() {
        return Err(validation("contentId must be non-empty"));
    }

    let content_type: ContentType = input
        .content_type
        .parse()
        .map_err(|e: String| validation(e))?;
    let action: InteractionAction = input.action.parse().map_err(|e: String| validation(e))?;

    if input.context.position < 0 {
        return Err(validation("context.position must be >= 0"));
    }
    let time_of_day: TimeOfDay = input
        .context
        .time_of_day
        .parse()
        .map_err(|e: String| validation(e))?;
    let day_of_week: DayOfWeek = input
        .context
        .day_of_week
        .parse()
        .map_err(|e: String| validation(e))?;

    if let Some(ref metadata) = input.metadata {
        if !metadata.is_object() {
            return Err(validation("metadata must be an object"));
        }
    }

    if content_type == ContentType::EventCategoryBundle {
        bundle_state_ref(input.metadata.as_ref())?;
    }

    Ok(UserInteraction {
        id: Uuid::new_v4().to_string(),
        user_id: input.user_id.clone(),
        content_id: input.content_id.clone(),
        content_type,
        action,
        dwell_time: input.dwell_time,
        timestamp: input.timestamp.unwrap_or(now),
        context: InteractionContext {
            position: input.context.position as u32,
            session_id: input.context.session_id.clone(),
            time_of_day,
            day_of_week,
        },
        content_tags: input.content_tags.clone(),
        metadata: input.metadata.clone(),
    })
}

/// Extract and validate `metadata.bundleState` for bundle interactions.
fn bundle_state_ref(metadata: Option<&serde_json::Value>) -> Result<BundleStateRef<'_>, HearthError> {
    let invalid = || HearthError::BadRequest {
        error: "Invalid bundle metadata".to_string(),
        message: "metadata.bundleState must be provided with categoryId and version \
                  for event-category-bundle interactions"
            .to_string(),
    };

    let state = metadata
        .and_then(|m| m.get("bundleState"))
        .ok_or_else(invalid)?;
    let category_id = state
        .get("categoryId")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(invalid)?;
    let version = state
        .get("version")
        .and_then(|v| v.as_u64())
        .ok_or_else(invalid)?;

    Ok(BundleStateRef {
        category_id,
        version,
    })
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PinnedQuery {
    pub mode: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub page_size: Option<usize>,
    pub page_token: Option<String>,
}

#[derive(Debug)]
pub struct PinnedPage {
    pub events: Vec<PinnedEvent>,
    pub next_page_token: Option<String>,
    pub window: Window,
    pub updated_at: DateTime<Utc>,
}

pub struct InteractionService {
    interactions: Arc<dyn InteractionStore>,
    pins: Arc<dyn PinStore>,
    bundle_state: Arc<dyn BundleStateStore>,
    events: Arc<dyn EventStore>,
    series: Arc<dyn SeriesStore>,
    display_tz: Tz,
}

impl InteractionService {
    pub fn new(
        interactions: Arc<dyn InteractionStore>,
        pins: Arc<dyn PinStore>,
        bundle_state: Arc<dyn BundleStateStore>,
        events: Arc<dyn EventStore>,
        series: Arc<dyn SeriesStore>,
        display_tz: Tz,
    ) -> Self {
        Self {
            interactions,
            pins,
            bundle_state,
            events,
            series,
            display_tz,
        }
    }

    /// Validate and record a batch, then run the side effects. Returns the
    /// recorded interaction ids.
    pub async fn record_interactions(
        &self,
        inputs: &[NewInteraction],
    ) -> Result<Vec<String>, HearthError> {
        if inputs.is_empty() {
            return Err(validation("at least one interaction is required"));
        }
        if inputs.len() > MAX_INTERACTION_BATCH {
            return Err(validation(format!(
                "at most {MAX_INTERACTION_BATCH} interactions per batch"
            )));
        }

        let now = Utc::now();
        let mut validated = Vec::with_capacity(inputs.len());
        for input in inputs {
            validated.push(validate_interaction(input, now)?);
        }

        self.interactions
            .append_interactions(&validated)
            .await
            .map_err(|e| HearthError::Upstream(e.to_string()))?;

        // Side effects run after the batch commits, concurrently; failures
        // are logged, never surfaced to the client
        let effects = inputs.iter().zip(&validated).map(|(input, interaction)| {
            self.apply_side_effect(input, interaction, now)
        });
        join_all(effects).await;

        Ok(validated.into_iter().map(|i| i.id).collect())
    }

    async fn apply_side_effect(
        &self,
        input: &NewInteraction,
        interaction: &UserInteraction,
        now: DateTime<Utc>,
    ) {
        match interaction.content_type {
            ContentType::Event | ContentType::EventSeries
                if interaction.action == InteractionAction::Bookmarked =>
            {
                let active = input
                    .metadata
                    .as_ref()
                    .and_then(|m| m.get("active"))
                    .and_then(|v| v.as_bool())
                    .unwrap_or(true);
                let result = self
                    .apply_pin_toggle(
                        &interaction.user_id,
                        &interaction.content_id,
                        interaction.content_type,
                        active,
                        now,
                    )
                    .await;
                if let Err(e) = result {
                    warn!(
                        user_id = %interaction.user_id,
                        content_id = %interaction.content_id,
                        error = %e,
                        "pin toggle failed"
                    );
                }
            }
            ContentType::EventCategoryBundle => {
                let Ok(state) = bundle_state_ref(input.metadata.as_ref()) else {
                    return; // validated earlier; unreachable in practice
                };
                if let Err(e) = self
                    .bundle_state
                    .mark_seen(&interaction.user_id, state.category_id, state.version, now)
                    .await
                {
                    warn!(
                        user_id = %interaction.user_id,
                        category_id = %state.category_id,
                        error = %e,
                        "bundle mark-seen failed"
                    );
                }
            }
            _ => {}
        }
    }

    async fn apply_pin_toggle(
        &self,
        user_id: &str,
        content_id: &str,
        content_type: ContentType,
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<()> {
        match (content_type, active) {
            (ContentType::Event, true) => {
                self.pin_event(user_id, content_id, now).await?;
            }
            (ContentType::Event, false) => {
                self.pins.remove_event_pin(user_id, content_id).await?;
            }
            (ContentType::EventSeries, true) => {
                self.pin_series(user_id, content_id, now).await?;
            }
            (ContentType::EventSeries, false) => {
                self.pins.remove_series_pin(user_id, content_id).await?;
            }
            _ => {}
        }
        Ok(())
    }

    async fn pin_event(
        &self,
        user_id: &str,
        event_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<PinnedEvent>> {
        let Some(event) = self.events.get_event(event_id).await? else {
            debug!(event_id, "pin skipped, event missing");
            return Ok(None);
        };

        let series = match event.series_id.as_deref() {
            Some(sid) => self.series.get_series(sid).await?,
            None => None,
        };

        let pin = build_event_pin(&event, series.as_ref(), now);
        self.pins.set_event_pin(user_id, &pin).await?;
        Ok(Some(pin))
    }

    async fn pin_series(
        &self,
        user_id: &str,
        series_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<PinnedSeries>> {
        let Some(series) = self.series.get_series(series_id).await? else {
            debug!(series_id, "pin skipped, series missing");
            return Ok(None);
        };

        let pin = PinnedSeries {
            series_id: series.id.clone(),
            title: series.title.clone(),
            host_name: Some(series.host.name.clone()),
            tags: series.tags.clone(),
            source: series.source.clone(),
            pinned_at: now,
        };
        self.pins.set_series_pin(user_id, &pin).await?;
        Ok(Some(pin))
    }

    /// Direct pin set/unset for the pinned-events endpoint. Returns the pin
    /// when set; `NotFound` when the event does not exist.
    pub async fn set_event_pin(
        &self,
        user_id: &str,
        event_id: &str,
        pinned: bool,
    ) -> Result<Option<PinnedEvent>, HearthError> {
        if !pinned {
            self.pins
                .remove_event_pin(user_id, event_id)
                .await
                .map_err(|e| HearthError::Upstream(e.to_string()))?;
            return Ok(None);
        }

        let pin = self
            .pin_event(user_id, event_id, Utc::now())
            .await
            .map_err(|e| HearthError::Upstream(e.to_string()))?;
        pin.map(Some)
            .ok_or_else(|| HearthError::NotFound(format!("event not found: {event_id}")))
    }

    /// Pinned events inside a window: direct pins merged with occurrences
    /// derived from pinned series, direct entries suppressing derived ones.
    pub async fn get_pinned_events(
        &self,
        user_id: &str,
        query: &PinnedQuery,
    ) -> Result<PinnedPage, HearthError> {
        let now = Utc::now();
        let window = self.resolve_window(query, now)?;

        let page_size = query.page_size.unwrap_or(PIN_PAGE_DEFAULT);
        if page_size == 0 || page_size > PIN_PAGE_MAX {
            return Err(validation(format!(
                "pageSize must be between 1 and {PIN_PAGE_MAX}"
            )));
        }
        let offset = match query.page_token.as_deref() {
            Some(token) => decode_page_token(token)?,
            None => 0,
        };

        let direct = self
            .pins
            .event_pins_in_window(user_id, window)
            .await
            .map_err(|e| HearthError::Upstream(e.to_string()))?;
        let direct_ids: std::collections::HashSet<String> =
            direct.iter().map(|p| p.event_id.clone()).collect();

        // Derive occurrences from pinned series
        let series_pins = self
            .pins
            .series_pins(user_id)
            .await
            .map_err(|e| HearthError::Upstream(e.to_string()))?;
        let series_ids: Vec<String> = series_pins.iter().map(|p| p.series_id.clone()).collect();
        let hydrated = self
            .series
            .get_series_many(&series_ids)
            .await
            .map_err(|e| HearthError::Upstream(e.to_string()))?;

        let mut merged = direct;
        for pin in &series_pins {
            let Some(series) = hydrated.iter().find(|s| s.id == pin.series_id) else {
                continue;
            };
            for occurrence in &series.upcoming_occurrences {
                if !window.contains(occurrence.start_time)
                    || direct_ids.contains(&occurrence.event_id)
                {
                    continue;
                }
                merged.push(derived_pin(pin, series, occurrence));
            }
        }

        merged.sort_by(|a, b| {
            a.event_start_time
                .cmp(&b.event_start_time)
                .then_with(|| b.pinned_at.cmp(&a.pinned_at))
                .then_with(|| a.event_id.cmp(&b.event_id))
        });

        let page = paginate(merged, offset, page_size);
        Ok(PinnedPage {
            events: page.items,
            next_page_token: page.next_page_token,
            window,
            updated_at: now,
        })
    }

    fn resolve_window(
        &self,
        query: &PinnedQuery,
        now: DateTime<Utc>,
    ) -> Result<Window, HearthError> {
        match query.mode.as_deref() {
            Some("today") => Ok(day_window(now, self.display_tz)),
            Some(other) => Err(validation(format!("unknown mode: {other}"))),
            None => match (query.start, query.end) {
                (Some(start), Some(end)) => Window::new(start, end)
                    .ok_or_else(|| validation("end must be after start")),
                (None, None) => Ok(Window {
                    start: now,
                    end: now + Duration::days(DEFAULT_PIN_WINDOW_DAYS),
                }),
                _ => Err(validation("start and end must be provided together")),
            },
        }
    }
}

fn build_event_pin(
    event: &CanonicalEvent,
    series: Option<&EventSeries>,
    now: DateTime<Utc>,
) -> PinnedEvent {
    PinnedEvent {
        event_id: event.id.clone(),
        title: event.title.clone(),
        location: event.venue.as_ref().and_then(|v| v.label()),
        tags: event.tags.clone(),
        event_start_time: event.start_time,
        event_end_time: event.end_time,
        content_type: ContentType::Event,
        source: event.source.clone(),
        series_id: event.series_id.clone(),
        series_title: series.map(|s| s.title.clone()),
        host_name: series.map(|s| s.host.name.clone()),
        pinned_at: now,
        derived: false,
    }
}

/// Synthetic pin for one occurrence of a pinned series.
fn derived_pin(
    pin: &PinnedSeries,
    series: &EventSeries,
    occurrence: &hearth_common::types::Occurrence,
) -> PinnedEvent {
    // Occurrence ids are `{sourceId}:{sourceEventId}`; recover the pair
    let source = match occurrence.event_id.split_once(':') {
        Some((source_id, source_event_id)) => hearth_common::types::EventSource {
            source_id: source_id.to_string(),
            source_event_id: source_event_id.to_string(),
            source_url: pin.source.source_url.clone(),
        },
        None => pin.source.clone(),
    };

    PinnedEvent {
        event_id: occurrence.event_id.clone(),
        title: occurrence.title.clone(),
        location: occurrence.location.clone(),
        tags: occurrence.tags.clone(),
        event_start_time: occurrence.start_time,
        event_end_time: occurrence.end_time,
        content_type: ContentType::Event,
        source,
        series_id: Some(series.id.clone()),
        series_title: Some(series.title.clone()),
        host_name: Some(series.host.name.clone()),
        pinned_at: pin.pinned_at,
        derived: true,
    }
}
