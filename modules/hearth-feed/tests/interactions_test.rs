//! Interaction recording, pin toggles, and pinned-event reads.

mod harness;

use chrono::{Duration, Utc};

use harness::*;
use hearth_common::time::day_window;
use hearth_common::HearthError;
use hearth_feed::interactions::PinnedQuery;
use hearth_store::{BundleStateStore, InteractionStore, MemStore};

fn default_query() -> PinnedQuery {
    PinnedQuery {
        mode: None,
        start: None,
        end: None,
        page_size: None,
        page_token: None,
    }
}

fn today_query() -> PinnedQuery {
    PinnedQuery {
        mode: Some("today".to_string()),
        ..default_query()
    }
}

// ---------------------------------------------------------------------------
// Recording + validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn batch_records_and_returns_ids() {
    let store = MemStore::new();
    let service = interaction_service(&store);

    let inputs = vec![
        interaction("u1", "s1:e1", "viewed"),
        interaction("u1", "s1:e2", "liked"),
        interaction("u1", "s1:e3", "dismissed"),
    ];
    let ids = service.record_interactions(&inputs).await.unwrap();
    assert_eq!(ids.len(), 3);

    let recent = store.recent_interactions("u1", 10).await.unwrap();
    assert_eq!(recent.len(), 3);
    assert!(recent.iter().all(|i| !i.id.is_empty()));
}

#[tokio::test]
async fn invalid_interactions_are_rejected() {
    let store = MemStore::new();
    let service = interaction_service(&store);

    let cases: Vec<(&str, Box<dyn Fn() -> hearth_feed::interactions::NewInteraction>)> = vec![
        ("empty user", Box::new(|| interaction("", "s1:e1", "viewed"))),
        ("empty content", Box::new(|| interaction("u1", "", "viewed"))),
        ("unknown action", Box::new(|| interaction("u1", "s1:e1", "super-liked"))),
        ("unknown content type", Box::new(|| {
            let mut i = interaction("u1", "s1:e1", "viewed");
            i.content_type = "mystery".to_string();
            i
        })),
        ("negative position", Box::new(|| {
            let mut i = interaction("u1", "s1:e1", "viewed");
            i.context.position = -1;
            i
        })),
        ("unknown time of day", Box::new(|| {
            let mut i = interaction("u1", "s1:e1", "viewed");
            i.context.time_of_day = "brunch".to_string();
            i
        })),
        ("unknown day of week", Box::new(|| {
            let mut i = interaction("u1", "s1:e1", "viewed");
            i.context.day_of_week = "caturday".to_string();
            i
        })),
        ("non-object metadata", Box::new(|| {
            let mut i = interaction("u1", "s1:e1", "viewed");
            i.metadata = Some(serde_json::json!("just a string"));
            i
        })),
    ];

    for (label, build) in cases {
        let err = service.record_interactions(&[build()]).await.unwrap_err();
        assert!(err.is_client_fault(), "expected client fault: {label}");
    }

    // Nothing from the rejected batches landed
    assert!(store.recent_interactions("u1", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn batch_size_bounds() {
    let store = MemStore::new();
    let service = interaction_service(&store);

    assert!(service.record_interactions(&[]).await.is_err());

    let oversized: Vec<_> = (0..101)
        .map(|i| interaction("u1", &format!("s1:e{i}"), "viewed"))
        .collect();
    let err = service.record_interactions(&oversized).await.unwrap_err();
    assert!(err.is_client_fault());
}

#[tokio::test]
async fn bundle_interaction_requires_bundle_state() {
    let store = MemStore::new();
    let service = interaction_service(&store);

    let mut input = interaction("u1", "bundle:category:abc", "viewed");
    input.content_type = "event-category-bundle".to_string();

    // Missing metadata entirely
    let err = service.record_interactions(&[input.clone()]).await.unwrap_err();
    match err {
        HearthError::BadRequest { ref error, ref message } => {
            assert_eq!(error, "Invalid bundle metadata");
            assert!(message.contains("metadata.bundleState must be provided"));
        }
        other => panic!("expected BadRequest, got {other:?}"),
    }

    // Malformed bundleState
    input.metadata = Some(serde_json::json!({"bundleState": {"categoryId": ""}}));
    assert!(service.record_interactions(&[input.clone()]).await.is_err());

    // Well-formed: records and advances last-seen
    input.metadata =
        Some(serde_json::json!({"bundleState": {"categoryId": "category:abc", "version": 3}}));
    service.record_interactions(&[input]).await.unwrap();

    let states = store
        .bundle_states("u1", &["category:abc".to_string()])
        .await
        .unwrap();
    assert_eq!(states["category:abc"].last_seen_version, 3);
}

// ---------------------------------------------------------------------------
// Pins
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bookmark_interaction_pins_and_unpins() {
    let store = MemStore::new();
    let service = interaction_service(&store);
    let now = Utc::now();
    seed_event(
        &store,
        event("evt-x", "Trivia Night", now + Duration::hours(4), &["trivia"], None, now),
    )
    .await;

    let mut bookmark = interaction("u1", "s1:evt-x", "bookmarked");
    service.record_interactions(&[bookmark.clone()]).await.unwrap();

    let page = service.get_pinned_events("u1", &default_query()).await.unwrap();
    assert_eq!(page.events.len(), 1);
    assert_eq!(page.events[0].event_id, "s1:evt-x");
    assert!(!page.events[0].derived);

    // metadata.active = false unpins
    bookmark.metadata = Some(serde_json::json!({"active": false}));
    service.record_interactions(&[bookmark]).await.unwrap();

    let page = service.get_pinned_events("u1", &default_query()).await.unwrap();
    assert!(page.events.is_empty());
}

#[tokio::test]
async fn pin_round_trip_restores_prior_state() {
    let store = MemStore::new();
    let service = interaction_service(&store);
    let now = Utc::now();
    seed_event(
        &store,
        event("base", "Standing Pin", now + Duration::hours(2), &[], None, now),
    )
    .await;
    seed_event(
        &store,
        event("evt-x", "Round Trip", now + Duration::hours(3), &[], None, now),
    )
    .await;

    service.set_event_pin("u1", "s1:base", true).await.unwrap();
    let before = service.get_pinned_events("u1", &default_query()).await.unwrap();

    service.set_event_pin("u1", "s1:evt-x", true).await.unwrap();
    service.set_event_pin("u1", "s1:evt-x", false).await.unwrap();

    let after = service.get_pinned_events("u1", &default_query()).await.unwrap();
    let ids = |page: &hearth_feed::interactions::PinnedPage| {
        page.events.iter().map(|p| p.event_id.clone()).collect::<Vec<_>>()
    };
    assert_eq!(ids(&before), ids(&after));
}

#[tokio::test]
async fn pinning_missing_event_is_not_found() {
    let store = MemStore::new();
    let service = interaction_service(&store);
    let err = service.set_event_pin("u1", "s1:ghost", true).await.unwrap_err();
    assert!(matches!(err, HearthError::NotFound(_)));
}

#[tokio::test]
async fn unpin_removes_from_today_view() {
    let store = MemStore::new();
    let service = interaction_service(&store);

    // Today 17:00 in the display zone
    let today = day_window(Utc::now(), la());
    let start = today.start + Duration::hours(17);
    seed_event(&store, event("evt-x", "Evening Show", start, &[], None, Utc::now())).await;

    service.set_event_pin("u", "s1:evt-x", true).await.unwrap();
    let page = service.get_pinned_events("u", &today_query()).await.unwrap();
    assert_eq!(page.events.len(), 1);
    assert_eq!(page.events[0].event_id, "s1:evt-x");

    service.set_event_pin("u", "s1:evt-x", false).await.unwrap();
    let page = service.get_pinned_events("u", &today_query()).await.unwrap();
    assert!(page.events.is_empty());
}

#[tokio::test]
async fn pinned_pagination_concatenates_in_order() {
    let store = MemStore::new();
    let service = interaction_service(&store);
    let now = Utc::now();

    seed_event(&store, event("late", "Later Event", now + Duration::days(2), &[], None, now)).await;
    seed_event(&store, event("soon", "Sooner Event", now + Duration::days(1), &[], None, now)).await;
    service.set_event_pin("u1", "s1:late", true).await.unwrap();
    service.set_event_pin("u1", "s1:soon", true).await.unwrap();

    let first = service
        .get_pinned_events(
            "u1",
            &PinnedQuery { page_size: Some(1), ..default_query() },
        )
        .await
        .unwrap();
    assert_eq!(first.events.len(), 1);
    assert_eq!(first.events[0].event_id, "s1:soon");
    let token = first.next_page_token.clone().expect("second page exists");

    let second = service
        .get_pinned_events(
            "u1",
            &PinnedQuery {
                page_size: Some(1),
                page_token: Some(token),
                ..default_query()
            },
        )
        .await
        .unwrap();
    assert_eq!(second.events.len(), 1);
    assert_eq!(second.events[0].event_id, "s1:late");
    assert!(second.next_page_token.is_none());
}

#[tokio::test]
async fn pinned_series_derives_occurrences_with_suppression() {
    let store = MemStore::new();
    let service = interaction_service(&store);
    let now = Utc::now();

    // Two occurrences of the same series
    let sid = seed_event(
        &store,
        event("occ-1", "Weekly Yoga", now + Duration::hours(5), &["yoga"], None, now),
    )
    .await;
    seed_event(
        &store,
        event("occ-2", "Weekly Yoga", now + Duration::days(7), &["yoga"], None, now),
    )
    .await;

    // Bookmark the series itself
    let mut bookmark = interaction("u1", &sid, "bookmarked");
    bookmark.content_type = "event-series".to_string();
    service.record_interactions(&[bookmark]).await.unwrap();

    let page = service.get_pinned_events("u1", &default_query()).await.unwrap();
    assert_eq!(page.events.len(), 2);
    assert!(page.events.iter().all(|p| p.derived));
    assert!(page.events.iter().all(|p| p.series_id.as_deref() == Some(sid.as_str())));
    // Ordered by start
    assert_eq!(page.events[0].event_id, "s1:occ-1");

    // A direct pin on the first occurrence suppresses its derived twin
    service.set_event_pin("u1", "s1:occ-1", true).await.unwrap();
    let page = service.get_pinned_events("u1", &default_query()).await.unwrap();
    assert_eq!(page.events.len(), 2);
    let direct: Vec<_> = page.events.iter().filter(|p| !p.derived).collect();
    assert_eq!(direct.len(), 1);
    assert_eq!(direct[0].event_id, "s1:occ-1");
}

#[tokio::test]
async fn window_validation_for_pinned_reads() {
    let store = MemStore::new();
    let service = interaction_service(&store);
    let now = Utc::now();

    // end before start
    let err = service
        .get_pinned_events(
            "u1",
            &PinnedQuery {
                start: Some(now),
                end: Some(now - Duration::days(1)),
                ..default_query()
            },
        )
        .await
        .unwrap_err();
    assert!(err.is_client_fault());

    // page size out of range
    let err = service
        .get_pinned_events(
            "u1",
            &PinnedQuery { page_size: Some(31), ..default_query() },
        )
        .await
        .unwrap_err();
    assert!(err.is_client_fault());

    // unknown mode
    let err = service
        .get_pinned_events(
            "u1",
            &PinnedQuery { mode: Some("yesterday".to_string()), ..default_query() },
        )
        .await
        .unwrap_err();
    assert!(err.is_client_fault());
}
