//! Storage seams consumed by the ingest pipeline and the feed side.
//!
//! Every method is one atomic store operation: a single-document upsert, or
//! a transaction where the merge must be. Implemented by [`crate::PgStore`]
//! and, for deterministic tests, [`crate::MemStore`].

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use hearth_common::time::Window;
use hearth_common::types::{
    CanonicalEvent, EventCategory, EventSeries, PinnedEvent, PinnedSeries, SeriesHost,
    TagProposal, UserCategoryBundleState, UserInteraction,
};

/// Host context for a series attachment.
#[derive(Debug, Clone)]
pub struct AttachContext {
    pub host_id: String,
    pub host_name: String,
    pub organizer: Option<String>,
    pub source_id: String,
}

/// Result of attaching an event to its series.
#[derive(Debug, Clone)]
pub struct AttachOutcome {
    pub series_id: String,
    pub host: SeriesHost,
    pub created: bool,
}

// ---------------------------------------------------------------------------
// Events (C4)
// ---------------------------------------------------------------------------

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Stored snapshot for an event id, or None.
    async fn get_event(&self, id: &str) -> Result<Option<CanonicalEvent>>;

    /// Batch read preserving input order; missing ids are skipped.
    async fn get_events(&self, ids: &[String]) -> Result<Vec<CanonicalEvent>>;

    /// Write the full record. `existing` is the pre-read snapshot; returns
    /// true when this save created the document.
    async fn save_event(
        &self,
        event: &CanonicalEvent,
        raw_snapshot: &serde_json::Value,
        existing: Option<&CanonicalEvent>,
    ) -> Result<bool>;

    /// No-op update path: refresh `lastFetchedAt` only.
    async fn touch_event(&self, id: &str, fetched_at: DateTime<Utc>) -> Result<()>;

    /// Merge-patch series/category assignment onto the event document.
    async fn update_event_series_info(
        &self,
        event_id: &str,
        series_id: &str,
        category_id: Option<&str>,
        category_name: Option<&str>,
    ) -> Result<()>;

    /// Events starting inside the window, ascending by start time. When
    /// `tags` is non-empty, only events sharing at least one tag.
    async fn events_in_window(
        &self,
        window: Window,
        tags: &[String],
        limit: usize,
    ) -> Result<Vec<CanonicalEvent>>;
}

// ---------------------------------------------------------------------------
// Series (C5)
// ---------------------------------------------------------------------------

#[async_trait]
pub trait SeriesStore: Send + Sync {
    /// Attach an event to its `(host, title)` series in one transaction:
    /// create the series or merge the occurrence into the rolling window.
    async fn attach_event(
        &self,
        event: &CanonicalEvent,
        ctx: &AttachContext,
        now: DateTime<Utc>,
    ) -> Result<AttachOutcome>;

    async fn get_series(&self, id: &str) -> Result<Option<EventSeries>>;

    async fn get_series_many(&self, ids: &[String]) -> Result<Vec<EventSeries>>;

    /// Series whose next occurrence starts inside the window.
    async fn series_in_window(
        &self,
        window: Window,
        tags: &[String],
        limit: usize,
    ) -> Result<Vec<EventSeries>>;

    /// Merge-patch the category assignment onto the series document.
    async fn update_series_category(
        &self,
        series_id: &str,
        category_id: &str,
        category_name: &str,
        category_slug: &str,
        now: DateTime<Utc>,
    ) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Categories (C6)
// ---------------------------------------------------------------------------

#[async_trait]
pub trait CategoryStore: Send + Sync {
    async fn get_category(&self, id: &str) -> Result<Option<EventCategory>>;

    async fn get_categories(&self, ids: &[String]) -> Result<Vec<EventCategory>>;

    async fn categories_for_host(&self, host_id: &str) -> Result<Vec<EventCategory>>;

    /// Insert a freshly created category (version 1, one change-log entry).
    async fn create_category(&self, category: &EventCategory) -> Result<()>;

    /// Add a series to an existing category. Bumps the version and appends
    /// the change-log entry in the same transaction; a series already in
    /// `seriesIds` leaves the document untouched. Returns the updated doc.
    async fn add_series_to_category(
        &self,
        category_id: &str,
        series_id: &str,
        series_title: &str,
        series_tags: &[String],
        now: DateTime<Utc>,
    ) -> Result<EventCategory>;

    /// Remove a series (reassignment path). No version bump.
    async fn remove_series_from_category(
        &self,
        category_id: &str,
        series_id: &str,
        now: DateTime<Utc>,
    ) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Tag proposals (C3)
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ProposalStore: Send + Sync {
    /// Record one event's tag slugs. Each slug increments inside its own
    /// transaction; a missing proposal is created with count 1.
    async fn record_tags(
        &self,
        slugs: &[String],
        source_id: &str,
        event_id: &str,
        event_title: &str,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Pending proposals ordered by `(occurrenceCount DESC, lastSeenAt DESC)`.
    async fn top_proposals(&self, limit: usize) -> Result<Vec<TagProposal>>;
}

// ---------------------------------------------------------------------------
// Interactions (C8/C11)
// ---------------------------------------------------------------------------

#[async_trait]
pub trait InteractionStore: Send + Sync {
    /// Write a validated batch (at most 100) atomically.
    async fn append_interactions(&self, interactions: &[UserInteraction]) -> Result<()>;

    /// Most recent interactions for a user, descending by timestamp.
    async fn recent_interactions(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<UserInteraction>>;
}

// ---------------------------------------------------------------------------
// Pins (C11)
// ---------------------------------------------------------------------------

#[async_trait]
pub trait PinStore: Send + Sync {
    async fn set_event_pin(&self, user_id: &str, pin: &PinnedEvent) -> Result<()>;

    async fn remove_event_pin(&self, user_id: &str, event_id: &str) -> Result<()>;

    async fn set_series_pin(&self, user_id: &str, pin: &PinnedSeries) -> Result<()>;

    async fn remove_series_pin(&self, user_id: &str, series_id: &str) -> Result<()>;

    /// Direct pins whose event start falls inside the window, ordered by
    /// `(eventStartTime ASC, eventId ASC)`.
    async fn event_pins_in_window(
        &self,
        user_id: &str,
        window: Window,
    ) -> Result<Vec<PinnedEvent>>;

    async fn series_pins(&self, user_id: &str) -> Result<Vec<PinnedSeries>>;
}

// ---------------------------------------------------------------------------
// Bundle state (C10/C11)
// ---------------------------------------------------------------------------

#[async_trait]
pub trait BundleStateStore: Send + Sync {
    /// Per-category last-seen state for a user, keyed by category id.
    async fn bundle_states(
        &self,
        user_id: &str,
        category_ids: &[String],
    ) -> Result<HashMap<String, UserCategoryBundleState>>;

    /// Record that the user has seen the category at `version`.
    async fn mark_seen(
        &self,
        user_id: &str,
        category_id: &str,
        version: u64,
        now: DateTime<Utc>,
    ) -> Result<()>;
}
