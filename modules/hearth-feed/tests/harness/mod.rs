//! Shared fixtures for feed and interaction tests: an in-memory store
//! seeded through the same write paths production uses.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;

use hearth_common::ids::host_id;
use hearth_common::types::*;
use hearth_feed::bundler::Bundler;
use hearth_feed::feed::FeedService;
use hearth_feed::interactions::{InteractionService, NewInteraction, NewInteractionContext};
use hearth_feed::profile::ProfileBuilder;
use hearth_feed::ranker::RankWeights;
use hearth_store::{AttachContext, EventStore, MemStore, SeriesStore};

pub fn la() -> Tz {
    "America/Los_Angeles".parse().unwrap()
}

pub fn test_host_id() -> String {
    host_id("Parks Dept", "s1")
}

pub fn event(
    source_event_id: &str,
    title: &str,
    start: DateTime<Utc>,
    tags: &[&str],
    vector: Option<Vec<f32>>,
    created_at: DateTime<Utc>,
) -> CanonicalEvent {
    CanonicalEvent {
        id: format!("s1:{source_event_id}"),
        title: title.to_string(),
        description: None,
        start_time: start,
        end_time: Some(start + Duration::hours(1)),
        time_zone: None,
        is_all_day: None,
        venue: Some(Venue {
            name: Some("Loring Park".to_string()),
            address: None,
            raw_location: None,
        }),
        organizer: Some("Parks Dept".to_string()),
        price: None,
        status: None,
        tags: tags.iter().map(|t| t.to_string()).collect(),
        classification: None,
        vector,
        breadcrumbs: vec![],
        source: EventSource {
            source_id: "s1".to_string(),
            source_event_id: source_event_id.to_string(),
            source_url: None,
        },
        last_fetched_at: created_at,
        last_updated_at: None,
        created_at,
        series_id: None,
        series_category_id: None,
        series_category_name: None,
    }
}

/// Save an event and attach it to its series, the way ingest does.
pub async fn seed_event(store: &MemStore, mut e: CanonicalEvent) -> String {
    let ctx = AttachContext {
        host_id: test_host_id(),
        host_name: "Parks Dept".to_string(),
        organizer: Some("Parks Dept".to_string()),
        source_id: "s1".to_string(),
    };
    let outcome = store.attach_event(&e, &ctx, Utc::now()).await.unwrap();
    e.series_id = Some(outcome.series_id.clone());
    store.save_event(&e, &serde_json::json!({}), None).await.unwrap();
    outcome.series_id
}

/// Save an event without any series membership.
pub async fn seed_bare_event(store: &MemStore, e: CanonicalEvent) {
    store.save_event(&e, &serde_json::json!({}), None).await.unwrap();
}

pub fn feed_service(store: &MemStore) -> FeedService {
    FeedService::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        ProfileBuilder::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
        ),
        Bundler::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
        ),
        RankWeights::default(),
        la(),
    )
}

pub fn interaction_service(store: &MemStore) -> InteractionService {
    InteractionService::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        la(),
    )
}

pub fn interaction(user_id: &str, content_id: &str, action: &str) -> NewInteraction {
    NewInteraction {
        user_id: user_id.to_string(),
        content_id: content_id.to_string(),
        content_type: "event".to_string(),
        action: action.to_string(),
        dwell_time: None,
        timestamp: None,
        context: NewInteractionContext {
            position: 0,
            session_id: None,
            time_of_day: "evening".to_string(),
            day_of_week: "saturday".to_string(),
        },
        content_tags: vec![],
        metadata: None,
    }
}
