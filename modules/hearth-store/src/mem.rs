//! In-memory store implementing every storage trait.
//!
//! Backs deterministic pipeline and feed tests: no network, no database.
//! Semantics (ordering, caps, transactional merges) match the Postgres
//! implementation because both call into [`crate::logic`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use hearth_common::ids::series_id as build_series_id;
use hearth_common::slug::name_key;
use hearth_common::time::Window;
use hearth_common::types::{
    CanonicalEvent, EventCategory, EventSeries, PinnedEvent, PinnedSeries, ProposalStatus,
    TagProposal, UserCategoryBundleState, UserInteraction, PROPOSAL_TAGS_PER_EVENT,
};

use crate::logic::{
    apply_proposal_increment, apply_series_addition, apply_series_removal, merge_attachment,
};
use crate::traits::{
    AttachContext, AttachOutcome, BundleStateStore, CategoryStore, EventStore, InteractionStore,
    PinStore, ProposalStore, SeriesStore,
};

#[derive(Default)]
struct Inner {
    events: HashMap<String, CanonicalEvent>,
    raw_snapshots: HashMap<String, serde_json::Value>,
    series: HashMap<String, EventSeries>,
    categories: HashMap<String, EventCategory>,
    proposals: HashMap<String, TagProposal>,
    interactions: Vec<UserInteraction>,
    pinned_events: HashMap<(String, String), PinnedEvent>,
    pinned_series: HashMap<(String, String), PinnedSeries>,
    bundle_states: HashMap<(String, String), UserCategoryBundleState>,
}

#[derive(Clone, Default)]
pub struct MemStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("mem store poisoned")
    }

    /// Test helper: number of stored events.
    pub fn event_count(&self) -> usize {
        self.lock().events.len()
    }

    /// Test helper: raw snapshot stored with an event.
    pub fn raw_snapshot(&self, event_id: &str) -> Option<serde_json::Value> {
        self.lock().raw_snapshots.get(event_id).cloned()
    }
}

#[async_trait]
impl EventStore for MemStore {
    async fn get_event(&self, id: &str) -> Result<Option<CanonicalEvent>> {
        Ok(self.lock().events.get(id).cloned())
    }

    async fn get_events(&self, ids: &[String]) -> Result<Vec<CanonicalEvent>> {
        let inner = self.lock();
        Ok(ids.iter().filter_map(|id| inner.events.get(id).cloned()).collect())
    }

    async fn save_event(
        &self,
        event: &CanonicalEvent,
        raw_snapshot: &serde_json::Value,
        existing: Option<&CanonicalEvent>,
    ) -> Result<bool> {
        let mut inner = self.lock();
        inner.events.insert(event.id.clone(), event.clone());
        inner
            .raw_snapshots
            .insert(event.id.clone(), raw_snapshot.clone());
        Ok(existing.is_none())
    }

    async fn touch_event(&self, id: &str, fetched_at: DateTime<Utc>) -> Result<()> {
        if let Some(event) = self.lock().events.get_mut(id) {
            event.last_fetched_at = fetched_at;
        }
        Ok(())
    }

    async fn update_event_series_info(
        &self,
        event_id: &str,
        series_id: &str,
        category_id: Option<&str>,
        category_name: Option<&str>,
    ) -> Result<()> {
        if let Some(event) = self.lock().events.get_mut(event_id) {
            event.series_id = Some(series_id.to_string());
            if let Some(cid) = category_id {
                event.series_category_id = Some(cid.to_string());
            }
            if let Some(name) = category_name {
                event.series_category_name = Some(name.to_string());
            }
        }
        Ok(())
    }

    async fn events_in_window(
        &self,
        window: Window,
        tags: &[String],
        limit: usize,
    ) -> Result<Vec<CanonicalEvent>> {
        let inner = self.lock();
        let mut matched: Vec<CanonicalEvent> = inner
            .events
            .values()
            .filter(|e| window.contains(e.start_time))
            .filter(|e| tags.is_empty() || e.tags.iter().any(|t| tags.contains(t)))
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.id.cmp(&b.id))
        });
        matched.truncate(limit);
        Ok(matched)
    }
}

#[async_trait]
impl SeriesStore for MemStore {
    async fn attach_event(
        &self,
        event: &CanonicalEvent,
        ctx: &AttachContext,
        now: DateTime<Utc>,
    ) -> Result<AttachOutcome> {
        let sid = build_series_id(&ctx.host_id, &event.title);
        let mut inner = self.lock();
        let existing = inner.series.get(&sid).cloned();
        let (series, created) = merge_attachment(existing, event, ctx, &sid, now);
        let outcome = AttachOutcome {
            series_id: series.id.clone(),
            host: series.host.clone(),
            created,
        };
        inner.series.insert(sid, series);
        Ok(outcome)
    }

    async fn get_series(&self, id: &str) -> Result<Option<EventSeries>> {
        Ok(self.lock().series.get(id).cloned())
    }

    async fn get_series_many(&self, ids: &[String]) -> Result<Vec<EventSeries>> {
        let inner = self.lock();
        Ok(ids.iter().filter_map(|id| inner.series.get(id).cloned()).collect())
    }

    async fn series_in_window(
        &self,
        window: Window,
        tags: &[String],
        limit: usize,
    ) -> Result<Vec<EventSeries>> {
        let inner = self.lock();
        let mut matched: Vec<EventSeries> = inner
            .series
            .values()
            .filter(|s| s.next_start_time.map(|t| window.contains(t)).unwrap_or(false))
            .filter(|s| tags.is_empty() || s.tags.iter().any(|t| tags.contains(t)))
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            a.next_start_time
                .cmp(&b.next_start_time)
                .then_with(|| a.id.cmp(&b.id))
        });
        matched.truncate(limit);
        Ok(matched)
    }

    async fn update_series_category(
        &self,
        series_id: &str,
        category_id: &str,
        category_name: &str,
        category_slug: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(series) = self.lock().series.get_mut(series_id) {
            series.category_id = Some(category_id.to_string());
            series.category_name = Some(category_name.to_string());
            series.category_slug = Some(category_slug.to_string());
            series.updated_at = now;
        }
        Ok(())
    }
}

#[async_trait]
impl CategoryStore for MemStore {
    async fn get_category(&self, id: &str) -> Result<Option<EventCategory>> {
        Ok(self.lock().categories.get(id).cloned())
    }

    async fn get_categories(&self, ids: &[String]) -> Result<Vec<EventCategory>> {
        let inner = self.lock();
        Ok(ids.iter().filter_map(|id| inner.categories.get(id).cloned()).collect())
    }

    async fn categories_for_host(&self, host_id: &str) -> Result<Vec<EventCategory>> {
        let inner = self.lock();
        let mut matched: Vec<EventCategory> = inner
            .categories
            .values()
            .filter(|c| c.host_id == host_id)
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(matched)
    }

    async fn create_category(&self, category: &EventCategory) -> Result<()> {
        let mut inner = self.lock();
        let key = name_key(&category.name);
        if inner
            .categories
            .values()
            .any(|c| c.host_id == category.host_id && name_key(&c.name) == key)
        {
            return Err(anyhow!(
                "category name already exists for host: {}",
                category.name
            ));
        }
        inner.categories.insert(category.id.clone(), category.clone());
        Ok(())
    }

    async fn add_series_to_category(
        &self,
        category_id: &str,
        series_id: &str,
        series_title: &str,
        series_tags: &[String],
        now: DateTime<Utc>,
    ) -> Result<EventCategory> {
        let mut inner = self.lock();
        let category = inner
            .categories
            .get_mut(category_id)
            .ok_or_else(|| anyhow!("category not found: {category_id}"))?;
        apply_series_addition(category, series_id, series_title, series_tags, now);
        Ok(category.clone())
    }

    async fn remove_series_from_category(
        &self,
        category_id: &str,
        series_id: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(category) = self.lock().categories.get_mut(category_id) {
            apply_series_removal(category, series_id, now);
        }
        Ok(())
    }
}

#[async_trait]
impl ProposalStore for MemStore {
    async fn record_tags(
        &self,
        slugs: &[String],
        source_id: &str,
        event_id: &str,
        event_title: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.lock();
        for slug in slugs.iter().take(PROPOSAL_TAGS_PER_EVENT) {
            let existing = inner.proposals.remove(slug);
            let proposal =
                apply_proposal_increment(existing, slug, source_id, event_id, event_title, now);
            inner.proposals.insert(slug.clone(), proposal);
        }
        Ok(())
    }

    async fn top_proposals(&self, limit: usize) -> Result<Vec<TagProposal>> {
        let inner = self.lock();
        let mut pending: Vec<TagProposal> = inner
            .proposals
            .values()
            .filter(|p| p.status == ProposalStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| {
            b.occurrence_count
                .cmp(&a.occurrence_count)
                .then_with(|| b.last_seen_at.cmp(&a.last_seen_at))
        });
        pending.truncate(limit);
        Ok(pending)
    }
}

#[async_trait]
impl InteractionStore for MemStore {
    async fn append_interactions(&self, interactions: &[UserInteraction]) -> Result<()> {
        self.lock().interactions.extend(interactions.iter().cloned());
        Ok(())
    }

    async fn recent_interactions(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<UserInteraction>> {
        let inner = self.lock();
        let mut matched: Vec<UserInteraction> = inner
            .interactions
            .iter()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matched.truncate(limit);
        Ok(matched)
    }
}

#[async_trait]
impl PinStore for MemStore {
    async fn set_event_pin(&self, user_id: &str, pin: &PinnedEvent) -> Result<()> {
        self.lock()
            .pinned_events
            .insert((user_id.to_string(), pin.event_id.clone()), pin.clone());
        Ok(())
    }

    async fn remove_event_pin(&self, user_id: &str, event_id: &str) -> Result<()> {
        self.lock()
            .pinned_events
            .remove(&(user_id.to_string(), event_id.to_string()));
        Ok(())
    }

    async fn set_series_pin(&self, user_id: &str, pin: &PinnedSeries) -> Result<()> {
        self.lock()
            .pinned_series
            .insert((user_id.to_string(), pin.series_id.clone()), pin.clone());
        Ok(())
    }

    async fn remove_series_pin(&self, user_id: &str, series_id: &str) -> Result<()> {
        self.lock()
            .pinned_series
            .remove(&(user_id.to_string(), series_id.to_string()));
        Ok(())
    }

    async fn event_pins_in_window(
        &self,
        user_id: &str,
        window: Window,
    ) -> Result<Vec<PinnedEvent>> {
        let inner = self.lock();
        let mut matched: Vec<PinnedEvent> = inner
            .pinned_events
            .iter()
            .filter(|((uid, _), pin)| uid == user_id && window.contains(pin.event_start_time))
            .map(|(_, pin)| pin.clone())
            .collect();
        matched.sort_by(|a, b| {
            a.event_start_time
                .cmp(&b.event_start_time)
                .then_with(|| a.event_id.cmp(&b.event_id))
        });
        Ok(matched)
    }

    async fn series_pins(&self, user_id: &str) -> Result<Vec<PinnedSeries>> {
        let inner = self.lock();
        let mut matched: Vec<PinnedSeries> = inner
            .pinned_series
            .iter()
            .filter(|((uid, _), _)| uid == user_id)
            .map(|(_, pin)| pin.clone())
            .collect();
        matched.sort_by(|a, b| a.series_id.cmp(&b.series_id));
        Ok(matched)
    }
}

#[async_trait]
impl BundleStateStore for MemStore {
    async fn bundle_states(
        &self,
        user_id: &str,
        category_ids: &[String],
    ) -> Result<HashMap<String, UserCategoryBundleState>> {
        let inner = self.lock();
        Ok(category_ids
            .iter()
            .filter_map(|cid| {
                inner
                    .bundle_states
                    .get(&(user_id.to_string(), cid.clone()))
                    .map(|state| (cid.clone(), state.clone()))
            })
            .collect())
    }

    async fn mark_seen(
        &self,
        user_id: &str,
        category_id: &str,
        version: u64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.lock().bundle_states.insert(
            (user_id.to_string(), category_id.to_string()),
            UserCategoryBundleState {
                user_id: user_id.to_string(),
                category_id: category_id.to_string(),
                last_seen_version: version,
                last_seen_at: now,
            },
        );
        Ok(())
    }
}
