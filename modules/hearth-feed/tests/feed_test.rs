//! Feed assembly tests: personalization threshold, bundle diffs, pagination.

mod harness;

use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;

use harness::*;
use hearth_common::types::*;
use hearth_feed::content::{Content, Scorable};
use hearth_feed::feed::FeedQuery;
use hearth_feed::interactions::NewInteraction;
use hearth_store::{BundleStateStore, CategoryStore, MemStore, SeriesStore};

fn rng() -> StdRng {
    StdRng::seed_from_u64(42)
}

async fn seed_catalog(store: &MemStore) {
    let now = Utc::now();
    // Ten sports events pointing one way in embedding space, ten arts events
    // pointing the other
    for i in 0..10 {
        seed_bare_event(
            store,
            event(
                &format!("sport-{i}"),
                &format!("Pickup Soccer {i}"),
                now + Duration::hours(2 + i),
                &["sports", "soccer"],
                Some(vec![1.0, 0.0]),
                now - Duration::hours(20 - i),
            ),
        )
        .await;
    }
    for i in 0..10 {
        seed_bare_event(
            store,
            event(
                &format!("art-{i}"),
                &format!("Gallery Opening {i}"),
                now + Duration::hours(2 + i),
                &["painting", "gallery"],
                Some(vec![0.0, 1.0]),
                now - Duration::hours(40 - i),
            ),
        )
        .await;
    }
}

async fn record_sports_likes(store: &MemStore, count: usize) {
    let service = interaction_service(store);
    let inputs: Vec<NewInteraction> = (0..count)
        .map(|i| interaction("sports-fan", &format!("s1:sport-{}", i % 10), "liked"))
        .collect();
    // Batches of at most 100 are fine here
    service.record_interactions(&inputs).await.unwrap();
}

#[tokio::test]
async fn below_twenty_interactions_feed_is_chronological() {
    let store = MemStore::new();
    seed_catalog(&store).await;
    record_sports_likes(&store, 19).await;

    let page = feed_service(&store)
        .run(
            &FeedQuery {
                user_id: Some("sports-fan".to_string()),
                days: Some(2),
                ..Default::default()
            },
            &mut rng(),
        )
        .await
        .unwrap();

    assert!(!page.personalized);
    assert!(page.items.iter().all(|i| i.score == 0.0));
    // Ascending createdAt: the oldest arts event leads
    let created: Vec<_> = page.items.iter().map(|i| i.content.created_at()).collect();
    let mut sorted = created.clone();
    sorted.sort();
    assert_eq!(created, sorted);
}

#[tokio::test]
async fn twentieth_interaction_flips_personalization() {
    let store = MemStore::new();
    seed_catalog(&store).await;
    record_sports_likes(&store, 20).await;

    let page = feed_service(&store)
        .run(
            &FeedQuery {
                user_id: Some("sports-fan".to_string()),
                days: Some(2),
                page_size: Some(50),
                ..Default::default()
            },
            &mut rng(),
        )
        .await
        .unwrap();

    assert!(page.personalized);

    // Every sports item outscores every arts item
    let sports_min = page
        .items
        .iter()
        .filter(|i| i.content.tags().contains(&"sports".to_string()))
        .map(|i| i.score)
        .fold(f64::INFINITY, f64::min);
    let arts_max = page
        .items
        .iter()
        .filter(|i| i.content.tags().contains(&"painting".to_string()))
        .map(|i| i.score)
        .fold(0.0, f64::max);
    assert!(sports_min > arts_max, "sports {sports_min} vs arts {arts_max}");
}

#[tokio::test]
async fn anonymous_feed_is_chronological() {
    let store = MemStore::new();
    seed_catalog(&store).await;

    let page = feed_service(&store)
        .run(&FeedQuery { days: Some(2), ..Default::default() }, &mut rng())
        .await
        .unwrap();

    assert!(!page.personalized);
    assert_eq!(page.items.len(), 20);
}

#[tokio::test]
async fn tag_filter_narrows_candidates() {
    let store = MemStore::new();
    seed_catalog(&store).await;

    let page = feed_service(&store)
        .run(
            &FeedQuery {
                days: Some(2),
                tags: vec!["soccer".to_string()],
                ..Default::default()
            },
            &mut rng(),
        )
        .await
        .unwrap();

    assert_eq!(page.items.len(), 10);
    assert!(page
        .items
        .iter()
        .all(|i| i.content.tags().contains(&"soccer".to_string())));
}

#[tokio::test]
async fn feed_pages_concatenate_without_overlap() {
    let store = MemStore::new();
    seed_catalog(&store).await;

    let service = feed_service(&store);
    let mut seen: Vec<String> = Vec::new();
    let mut token: Option<String> = None;
    let mut pages = 0;

    loop {
        let page = service
            .run(
                &FeedQuery {
                    days: Some(2),
                    page_size: Some(7),
                    page_token: token.clone(),
                    ..Default::default()
                },
                &mut rng(),
            )
            .await
            .unwrap();
        pages += 1;
        seen.extend(page.items.iter().map(|i| i.content.id().to_string()));

        if page.next_page_token.is_none() {
            assert!(page.is_caught_up);
            break;
        }
        assert!(!page.is_caught_up);
        token = page.next_page_token;
    }

    assert_eq!(pages, 3);
    assert_eq!(seen.len(), 20);
    let mut deduped = seen.clone();
    deduped.sort();
    deduped.dedup();
    assert_eq!(deduped.len(), 20, "pages must not overlap");
}

#[tokio::test]
async fn query_bounds_are_enforced() {
    let store = MemStore::new();
    let service = feed_service(&store);

    for query in [
        FeedQuery { days: Some(0), ..Default::default() },
        FeedQuery { days: Some(32), ..Default::default() },
        FeedQuery { page_size: Some(0), ..Default::default() },
        FeedQuery { page_size: Some(51), ..Default::default() },
        FeedQuery {
            tags: (0..11).map(|i| format!("tag-{i}")).collect(),
            ..Default::default()
        },
        FeedQuery {
            page_token: Some("###".to_string()),
            ..Default::default()
        },
    ] {
        let err = service.run(&query, &mut rng()).await.unwrap_err();
        assert!(err.is_client_fault(), "expected client fault for {query:?}");
    }
}

// ---------------------------------------------------------------------------
// Bundles
// ---------------------------------------------------------------------------

/// Category with series A and B at version 3, whose v3 change-log entry
/// added only B.
async fn seed_bundle_fixture(store: &MemStore) -> (String, String, String) {
    let now = Utc::now();
    let sid_a = seed_event(
        &store.clone(),
        event("a1", "Alpha Series", now + Duration::hours(3), &["yoga"], Some(vec![1.0, 0.0]), now),
    )
    .await;
    let sid_b = seed_event(
        &store.clone(),
        event("b1", "Beta Series", now + Duration::hours(4), &["yoga"], Some(vec![1.0, 0.0]), now),
    )
    .await;

    let category = EventCategory {
        id: "category:bundletest".to_string(),
        host_id: test_host_id(),
        name: "Yoga Classes".to_string(),
        slug: "yoga-classes".to_string(),
        description: None,
        tags: vec!["yoga".to_string()],
        sample_series_titles: vec!["Alpha Series".to_string(), "Beta Series".to_string()],
        series_ids: vec![sid_a.clone(), sid_b.clone()],
        version: 3,
        change_log: vec![
            CategoryChange {
                version: 1,
                added_series_ids: vec![sid_a.clone()],
                added_series_titles: vec!["Alpha Series".to_string()],
                created_at: now - Duration::days(3),
            },
            CategoryChange {
                version: 2,
                added_series_ids: vec!["host:gone__retired".to_string()],
                added_series_titles: vec!["Retired".to_string()],
                created_at: now - Duration::days(2),
            },
            CategoryChange {
                version: 3,
                added_series_ids: vec![sid_b.clone()],
                added_series_titles: vec!["Beta Series".to_string()],
                created_at: now - Duration::days(1),
            },
        ],
        created_at: now - Duration::days(3),
        updated_at: now - Duration::days(1),
    };
    store.create_category(&category).await.unwrap();

    store
        .update_series_category(&sid_a, &category.id, &category.name, &category.slug, now)
        .await
        .unwrap();
    store
        .update_series_category(&sid_b, &category.id, &category.name, &category.slug, now)
        .await
        .unwrap();

    (category.id.clone(), sid_a, sid_b)
}

fn find_bundle(items: &[hearth_feed::ranker::RankedItem]) -> Option<&hearth_feed::content::BundleItem> {
    items.iter().find_map(|i| match &i.content {
        Content::Bundle(b) => Some(b),
        _ => None,
    })
}

#[tokio::test]
async fn bundle_diff_shows_only_new_series() {
    let store = MemStore::new();
    let (category_id, sid_a, sid_b) = seed_bundle_fixture(&store).await;
    store.mark_seen("u1", &category_id, 2, Utc::now()).await.unwrap();

    let page = feed_service(&store)
        .run(
            &FeedQuery {
                user_id: Some("u1".to_string()),
                days: Some(2),
                ..Default::default()
            },
            &mut rng(),
        )
        .await
        .unwrap();

    let bundle = find_bundle(&page.items).expect("bundle emitted");
    assert_eq!(bundle.id, format!("bundle:{category_id}"));
    assert_eq!(bundle.title, "Yoga Classes · Parks Dept");
    assert_eq!(bundle.bundle.new_series_ids, vec![sid_b.clone()]);
    assert_eq!(bundle.bundle.display_series, vec![sid_b]);
    assert_eq!(bundle.bundle.total_series_count, 2);
    assert_eq!(bundle.bundle.version, 3);

    // The grouped series do not also appear individually
    assert!(!page
        .items
        .iter()
        .any(|i| matches!(&i.content, Content::Series(s) if s.id == sid_a)));
}

#[tokio::test]
async fn first_time_user_sees_whole_bundle() {
    let store = MemStore::new();
    let (_, sid_a, sid_b) = seed_bundle_fixture(&store).await;

    let page = feed_service(&store)
        .run(
            &FeedQuery {
                user_id: Some("fresh".to_string()),
                days: Some(2),
                ..Default::default()
            },
            &mut rng(),
        )
        .await
        .unwrap();

    let bundle = find_bundle(&page.items).expect("bundle emitted");
    assert_eq!(bundle.bundle.new_series_ids, vec![sid_a.clone(), sid_b.clone()]);
    assert_eq!(bundle.bundle.display_series, vec![sid_a, sid_b]);
}

#[tokio::test]
async fn caught_up_user_gets_no_bundle_until_version_moves() {
    let store = MemStore::new();
    let (category_id, _, _) = seed_bundle_fixture(&store).await;

    // Catch all the way up
    store.mark_seen("u1", &category_id, 3, Utc::now()).await.unwrap();
    let page = feed_service(&store)
        .run(
            &FeedQuery {
                user_id: Some("u1".to_string()),
                days: Some(2),
                ..Default::default()
            },
            &mut rng(),
        )
        .await
        .unwrap();
    assert!(find_bundle(&page.items).is_none());

    // A new series bumps the version; the bundle comes back with just it
    let now = Utc::now();
    let sid_c = seed_event(
        &store.clone(),
        event("c1", "Gamma Series", now + Duration::hours(5), &["yoga"], Some(vec![1.0, 0.0]), now),
    )
    .await;
    store
        .add_series_to_category(&category_id, &sid_c, "Gamma Series", &["yoga".to_string()], now)
        .await
        .unwrap();
    store
        .update_series_category(&sid_c, &category_id, "Yoga Classes", "yoga-classes", now)
        .await
        .unwrap();

    let page = feed_service(&store)
        .run(
            &FeedQuery {
                user_id: Some("u1".to_string()),
                days: Some(2),
                ..Default::default()
            },
            &mut rng(),
        )
        .await
        .unwrap();
    let bundle = find_bundle(&page.items).expect("bundle returns after bump");
    assert_eq!(bundle.bundle.version, 4);
    assert_eq!(bundle.bundle.new_series_ids, vec![sid_c]);
}

#[tokio::test]
async fn uncategorized_series_pass_through_ungrouped() {
    let store = MemStore::new();
    let now = Utc::now();
    let sid = seed_event(
        &store.clone(),
        event("solo", "Solo Series", now + Duration::hours(3), &["chess"], None, now),
    )
    .await;

    let page = feed_service(&store)
        .run(
            &FeedQuery {
                user_id: Some("u1".to_string()),
                days: Some(2),
                ..Default::default()
            },
            &mut rng(),
        )
        .await
        .unwrap();

    assert!(page
        .items
        .iter()
        .any(|i| matches!(&i.content, Content::Series(s) if s.id == sid)));
    assert!(find_bundle(&page.items).is_none());
}
