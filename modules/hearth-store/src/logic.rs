//! Pure document-merge logic shared by the Postgres and in-memory stores.
//!
//! Keeping these functions free of I/O means both store backends apply
//! identical semantics and the invariants (occurrence window, version/
//! change-log coupling, proposal counts) are testable without a database.

use chrono::{DateTime, Duration, Utc};

use hearth_common::slug::slugify;
use hearth_common::types::{
    Breadcrumb, CanonicalEvent, CategoryChange, ContentType, EventCategory, EventSeries,
    Occurrence, ProposalSample, ProposalStatus, SeriesHost, SeriesStats, TagProposal,
    BREADCRUMB_CAP, CATEGORY_SAMPLE_CAP, CATEGORY_TAG_CAP, CHANGELOG_CAP, OCCURRENCE_CAP,
    OCCURRENCE_GRACE_HOURS, PROPOSAL_SAMPLE_CAP,
};

use crate::traits::AttachContext;

/// Build the denormalized occurrence for an event.
pub fn occurrence_from_event(event: &CanonicalEvent) -> Occurrence {
    Occurrence {
        event_id: event.id.clone(),
        title: event.title.clone(),
        start_time: event.start_time,
        end_time: event.end_time,
        location: event.venue.as_ref().and_then(|v| v.label()),
        tags: event.tags.clone(),
    }
}

/// Merge an occurrence into the rolling window: drop the stale and the
/// superseded, append, sort ascending (event id breaks start-time ties),
/// cap the window.
pub fn merge_occurrences(
    mut existing: Vec<Occurrence>,
    incoming: Occurrence,
    now: DateTime<Utc>,
) -> Vec<Occurrence> {
    let cutoff = now - Duration::hours(OCCURRENCE_GRACE_HOURS);
    existing.retain(|o| o.event_id != incoming.event_id && o.start_time >= cutoff);
    existing.push(incoming);
    existing.sort_by(|a, b| {
        a.start_time
            .cmp(&b.start_time)
            .then_with(|| a.event_id.cmp(&b.event_id))
    });
    existing.truncate(OCCURRENCE_CAP);
    existing
}

/// Append a breadcrumb, de-duplicating by source event id (latest wins) and
/// keeping the most recent [`BREADCRUMB_CAP`] entries.
pub fn push_breadcrumb(breadcrumbs: &mut Vec<Breadcrumb>, crumb: Breadcrumb) {
    breadcrumbs.retain(|b| b.source_event_id != crumb.source_event_id);
    breadcrumbs.push(crumb);
    if breadcrumbs.len() > BREADCRUMB_CAP {
        let excess = breadcrumbs.len() - BREADCRUMB_CAP;
        breadcrumbs.drain(..excess);
    }
}

fn union_sorted(mut base: Vec<String>, extra: &[String]) -> Vec<String> {
    base.extend(extra.iter().cloned());
    base.sort();
    base.dedup();
    base
}

/// Apply one attachment to a series document, creating it when absent.
/// Returns the resulting document and whether it was created.
pub fn merge_attachment(
    existing: Option<EventSeries>,
    event: &CanonicalEvent,
    ctx: &AttachContext,
    series_id: &str,
    now: DateTime<Utc>,
) -> (EventSeries, bool) {
    let occurrence = occurrence_from_event(event);
    let crumb = Breadcrumb {
        kind: "event-attached".to_string(),
        source_id: ctx.source_id.clone(),
        source_event_id: event.source.source_event_id.clone(),
        fetched_at: event.last_fetched_at,
        metadata: None,
    };

    let created = existing.is_none();
    let mut series = existing.unwrap_or_else(|| EventSeries {
        id: series_id.to_string(),
        title: event.title.clone(),
        description: event.description.clone(),
        summary: None,
        content_type: ContentType::EventSeries,
        host: SeriesHost {
            id: ctx.host_id.clone(),
            name: ctx.host_name.clone(),
            organizer: ctx.organizer.clone(),
            source_ids: Vec::new(),
        },
        tags: Vec::new(),
        breadcrumbs: Vec::new(),
        source: event.source.clone(),
        venue: event.venue.clone(),
        category_id: None,
        category_name: None,
        category_slug: None,
        upcoming_occurrences: Vec::new(),
        next_occurrence: None,
        next_start_time: None,
        vector: None,
        stats: SeriesStats::default(),
        created_at: now,
        updated_at: now,
    });

    series.upcoming_occurrences =
        merge_occurrences(std::mem::take(&mut series.upcoming_occurrences), occurrence, now);
    series.tags = union_sorted(std::mem::take(&mut series.tags), &event.tags);
    if !series.host.source_ids.iter().any(|s| s == &ctx.source_id) {
        series.host.source_ids.push(ctx.source_id.clone());
    }
    push_breadcrumb(&mut series.breadcrumbs, crumb);

    if series.venue.is_none() {
        series.venue = event.venue.clone();
    }
    if event.vector.is_some() {
        series.vector = event.vector.clone();
    }

    series.next_occurrence = series.upcoming_occurrences.first().cloned();
    series.next_start_time = series.next_occurrence.as_ref().map(|o| o.start_time);
    series.stats.upcoming_count = series.upcoming_occurrences.len() as u32;
    series.updated_at = now;

    (series, created)
}

/// Build a brand-new category for a host (version 1, one change-log entry).
pub fn new_category(
    id: &str,
    host_id: &str,
    name: &str,
    series_id: &str,
    series_title: &str,
    series_tags: &[String],
    description: Option<String>,
    now: DateTime<Utc>,
) -> EventCategory {
    EventCategory {
        id: id.to_string(),
        host_id: host_id.to_string(),
        name: name.to_string(),
        slug: slugify(name),
        description,
        tags: union_sorted(Vec::new(), series_tags)
            .into_iter()
            .take(CATEGORY_TAG_CAP)
            .collect(),
        sample_series_titles: vec![series_title.to_string()],
        series_ids: vec![series_id.to_string()],
        version: 1,
        change_log: vec![CategoryChange {
            version: 1,
            added_series_ids: vec![series_id.to_string()],
            added_series_titles: vec![series_title.to_string()],
            created_at: now,
        }],
        created_at: now,
        updated_at: now,
    }
}

/// Add a series to a category document. The version bump and the change-log
/// append happen together or not at all; an already-member series is a no-op.
/// Returns true when the document changed.
pub fn apply_series_addition(
    category: &mut EventCategory,
    series_id: &str,
    series_title: &str,
    series_tags: &[String],
    now: DateTime<Utc>,
) -> bool {
    if category.series_ids.iter().any(|s| s == series_id) {
        return false;
    }

    category.series_ids.push(series_id.to_string());
    category.version += 1;
    category.change_log.push(CategoryChange {
        version: category.version,
        added_series_ids: vec![series_id.to_string()],
        added_series_titles: vec![series_title.to_string()],
        created_at: now,
    });
    if category.change_log.len() > CHANGELOG_CAP {
        let excess = category.change_log.len() - CHANGELOG_CAP;
        category.change_log.drain(..excess);
    }

    category.tags = union_sorted(std::mem::take(&mut category.tags), series_tags)
        .into_iter()
        .take(CATEGORY_TAG_CAP)
        .collect();

    category
        .sample_series_titles
        .retain(|t| t != series_title);
    category.sample_series_titles.push(series_title.to_string());
    if category.sample_series_titles.len() > CATEGORY_SAMPLE_CAP {
        let excess = category.sample_series_titles.len() - CATEGORY_SAMPLE_CAP;
        category.sample_series_titles.drain(..excess);
    }

    category.updated_at = now;
    true
}

/// Drop a series from a category (reassignment). No version bump — removals
/// never surface in "what's new" diffs.
pub fn apply_series_removal(
    category: &mut EventCategory,
    series_id: &str,
    now: DateTime<Utc>,
) -> bool {
    let before = category.series_ids.len();
    category.series_ids.retain(|s| s != series_id);
    if category.series_ids.len() == before {
        return false;
    }
    category.updated_at = now;
    true
}

/// Increment a tag proposal for one event sighting.
pub fn apply_proposal_increment(
    existing: Option<TagProposal>,
    slug: &str,
    source_id: &str,
    event_id: &str,
    event_title: &str,
    now: DateTime<Utc>,
) -> TagProposal {
    let mut proposal = existing.unwrap_or_else(|| TagProposal {
        slug: slug.to_string(),
        occurrence_count: 0,
        source_counts: Default::default(),
        sample_events: Vec::new(),
        status: ProposalStatus::Pending,
        first_seen_at: now,
        last_seen_at: now,
    });

    proposal.occurrence_count += 1;
    *proposal
        .source_counts
        .entry(source_id.to_string())
        .or_insert(0) += 1;
    proposal.last_seen_at = now;

    proposal.sample_events.retain(|s| s.event_id != event_id);
    proposal.sample_events.insert(
        0,
        ProposalSample {
            event_id: event_id.to_string(),
            title: event_title.to_string(),
            seen_at: now,
        },
    );
    proposal.sample_events.truncate(PROPOSAL_SAMPLE_CAP);

    proposal
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use hearth_common::types::{EventSource, Venue};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn occurrence(event_id: &str, start: DateTime<Utc>) -> Occurrence {
        Occurrence {
            event_id: event_id.to_string(),
            title: "Test".to_string(),
            start_time: start,
            end_time: None,
            location: None,
            tags: vec![],
        }
    }

    fn event(id: &str, start: DateTime<Utc>) -> CanonicalEvent {
        CanonicalEvent {
            id: format!("s1:{id}"),
            title: "Community Yoga in the Park".to_string(),
            description: None,
            start_time: start,
            end_time: None,
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
            tags: vec!["yoga".to_string()],
            classification: None,
            vector: Some(vec![0.1, 0.2]),
            breadcrumbs: vec![],
            source: EventSource {
                source_id: "s1".to_string(),
                source_event_id: id.to_string(),
                source_url: None,
            },
            last_fetched_at: now(),
            last_updated_at: None,
            created_at: now(),
            series_id: None,
            series_category_id: None,
            series_category_name: None,
        }
    }

    fn ctx() -> AttachContext {
        AttachContext {
            host_id: "host:abc".to_string(),
            host_name: "Parks Dept".to_string(),
            organizer: Some("Parks Dept".to_string()),
            source_id: "s1".to_string(),
        }
    }

    // --- occurrence merge ---

    #[test]
    fn merge_evicts_stale_occurrences() {
        let stale = occurrence("old", now() - Duration::hours(30));
        let fresh = occurrence("fresh", now() + Duration::hours(1));
        let merged = merge_occurrences(vec![stale, fresh], occurrence("new", now()), now());
        let ids: Vec<&str> = merged.iter().map(|o| o.event_id.as_str()).collect();
        assert_eq!(ids, vec!["new", "fresh"]);
    }

    #[test]
    fn merge_keeps_recent_past_within_grace() {
        let recent_past = occurrence("recent", now() - Duration::hours(12));
        let merged =
            merge_occurrences(vec![recent_past], occurrence("new", now() + Duration::hours(2)), now());
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn merge_replaces_same_event_latest_wins() {
        let old_version = occurrence("e1", now() + Duration::hours(1));
        let mut new_version = occurrence("e1", now() + Duration::hours(3));
        new_version.title = "Updated".to_string();
        let merged = merge_occurrences(vec![old_version], new_version, now());
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].title, "Updated");
        assert_eq!(merged[0].start_time, now() + Duration::hours(3));
    }

    #[test]
    fn merge_sorts_ascending_with_event_id_tiebreak() {
        let base = now() + Duration::hours(1);
        let b = occurrence("b", base);
        let a = occurrence("a", base);
        let earlier = occurrence("z", now() + Duration::minutes(30));
        let merged = merge_occurrences(vec![b, earlier], a, now());
        let ids: Vec<&str> = merged.iter().map(|o| o.event_id.as_str()).collect();
        assert_eq!(ids, vec!["z", "a", "b"]);
    }

    #[test]
    fn merge_caps_window_at_twenty() {
        let existing: Vec<Occurrence> = (0..25)
            .map(|i| occurrence(&format!("e{i:02}"), now() + Duration::hours(i + 1)))
            .collect();
        let merged = merge_occurrences(existing, occurrence("new", now()), now());
        assert_eq!(merged.len(), OCCURRENCE_CAP);
        // Earliest survive the cap
        assert_eq!(merged[0].event_id, "new");
    }

    // --- breadcrumbs ---

    #[test]
    fn breadcrumbs_dedup_by_source_event_id() {
        let mut crumbs = Vec::new();
        for _ in 0..3 {
            push_breadcrumb(
                &mut crumbs,
                Breadcrumb {
                    kind: "event-attached".to_string(),
                    source_id: "s1".to_string(),
                    source_event_id: "e1".to_string(),
                    fetched_at: now(),
                    metadata: None,
                },
            );
        }
        assert_eq!(crumbs.len(), 1);
    }

    #[test]
    fn breadcrumbs_cap_keeps_most_recent() {
        let mut crumbs = Vec::new();
        for i in 0..25 {
            push_breadcrumb(
                &mut crumbs,
                Breadcrumb {
                    kind: "event-attached".to_string(),
                    source_id: "s1".to_string(),
                    source_event_id: format!("e{i}"),
                    fetched_at: now(),
                    metadata: None,
                },
            );
        }
        assert_eq!(crumbs.len(), BREADCRUMB_CAP);
        assert_eq!(crumbs.last().unwrap().source_event_id, "e24");
        assert_eq!(crumbs.first().unwrap().source_event_id, "e5");
    }

    // --- series attachment ---

    #[test]
    fn attach_creates_series_with_single_occurrence() {
        let e = event("e1", now() + Duration::hours(20));
        let (series, created) = merge_attachment(None, &e, &ctx(), "host:abc__yoga", now());
        assert!(created);
        assert_eq!(series.stats.upcoming_count, 1);
        assert_eq!(series.next_start_time, Some(e.start_time));
        assert_eq!(series.host.source_ids, vec!["s1"]);
        assert_eq!(series.tags, vec!["yoga"]);
        assert_eq!(series.vector, Some(vec![0.1, 0.2]));
        assert_eq!(series.content_type, ContentType::EventSeries);
    }

    #[test]
    fn attach_merges_into_existing_series() {
        let e1 = event("e1", now() + Duration::hours(20));
        let (series, _) = merge_attachment(None, &e1, &ctx(), "host:abc__yoga", now());

        let mut e2 = event("e2", now() + Duration::hours(2));
        e2.tags = vec!["meditation".to_string()];
        let (series, created) =
            merge_attachment(Some(series), &e2, &ctx(), "host:abc__yoga", now());

        assert!(!created);
        assert_eq!(series.stats.upcoming_count, 2);
        // Earlier occurrence becomes next
        assert_eq!(series.next_occurrence.as_ref().unwrap().event_id, "s1:e2");
        assert_eq!(series.tags, vec!["meditation", "yoga"]);
        assert_eq!(series.breadcrumbs.len(), 2);
    }

    #[test]
    fn attach_preserves_category_assignment() {
        let e1 = event("e1", now() + Duration::hours(20));
        let (mut series, _) = merge_attachment(None, &e1, &ctx(), "host:abc__yoga", now());
        series.category_id = Some("category:123".to_string());
        series.category_name = Some("Yoga Classes".to_string());

        let e2 = event("e2", now() + Duration::hours(30));
        let (series, _) = merge_attachment(Some(series), &e2, &ctx(), "host:abc__yoga", now());
        assert_eq!(series.category_id.as_deref(), Some("category:123"));
    }

    // --- categories ---

    #[test]
    fn new_category_starts_at_version_one() {
        let c = new_category(
            "category:abc",
            "host:abc",
            "Yoga Classes",
            "sid-1",
            "Community Yoga",
            &["yoga".to_string()],
            None,
            now(),
        );
        assert_eq!(c.version, 1);
        assert_eq!(c.change_log.len(), 1);
        assert_eq!(c.change_log[0].added_series_ids, vec!["sid-1"]);
        assert_eq!(c.slug, "yoga-classes");
    }

    #[test]
    fn addition_bumps_version_and_logs_together() {
        let mut c = new_category(
            "category:abc",
            "host:abc",
            "Yoga Classes",
            "sid-1",
            "Community Yoga",
            &[],
            None,
            now(),
        );
        let changed = apply_series_addition(&mut c, "sid-2", "Sunrise Yoga", &[], now());
        assert!(changed);
        assert_eq!(c.version, 2);
        let last = c.change_log.last().unwrap();
        assert_eq!(last.version, 2);
        assert_eq!(last.added_series_ids, vec!["sid-2"]);
        assert_eq!(c.series_ids, vec!["sid-1", "sid-2"]);
    }

    #[test]
    fn re_adding_member_series_is_noop() {
        let mut c = new_category(
            "category:abc",
            "host:abc",
            "Yoga Classes",
            "sid-1",
            "Community Yoga",
            &[],
            None,
            now(),
        );
        let changed = apply_series_addition(&mut c, "sid-1", "Community Yoga", &[], now());
        assert!(!changed);
        assert_eq!(c.version, 1);
        assert_eq!(c.change_log.len(), 1);
    }

    #[test]
    fn version_tracks_distinct_series_count() {
        let mut c = new_category(
            "category:abc", "host:abc", "Yoga", "sid-1", "A", &[], None, now(),
        );
        for i in 2..=30 {
            apply_series_addition(&mut c, &format!("sid-{i}"), &format!("T{i}"), &[], now());
        }
        assert_eq!(c.version, 30);
        assert_eq!(c.change_log.len(), CHANGELOG_CAP);
        assert_eq!(c.change_log.last().unwrap().version, 30);
        // samples capped at 8, newest kept
        assert_eq!(c.sample_series_titles.len(), CATEGORY_SAMPLE_CAP);
        assert_eq!(c.sample_series_titles.last().unwrap(), "T30");
    }

    #[test]
    fn category_tags_cap_at_fifty() {
        let mut c = new_category(
            "category:abc", "host:abc", "Yoga", "sid-1", "A", &[], None, now(),
        );
        let tags: Vec<String> = (0..60).map(|i| format!("tag-{i:03}")).collect();
        apply_series_addition(&mut c, "sid-2", "B", &tags, now());
        assert_eq!(c.tags.len(), CATEGORY_TAG_CAP);
    }

    #[test]
    fn removal_does_not_bump_version() {
        let mut c = new_category(
            "category:abc", "host:abc", "Yoga", "sid-1", "A", &[], None, now(),
        );
        apply_series_addition(&mut c, "sid-2", "B", &[], now());
        assert!(apply_series_removal(&mut c, "sid-1", now()));
        assert_eq!(c.version, 2);
        assert_eq!(c.series_ids, vec!["sid-2"]);
        assert!(!apply_series_removal(&mut c, "sid-1", now()));
    }

    // --- proposals ---

    #[test]
    fn proposal_counts_stay_consistent() {
        let mut p = apply_proposal_increment(None, "salsa", "s1", "s1:e1", "Salsa Night", now());
        p = apply_proposal_increment(Some(p), "salsa", "s2", "s2:e9", "Salsa Social", now());
        p = apply_proposal_increment(Some(p), "salsa", "s1", "s1:e2", "Salsa Night II", now());

        assert_eq!(p.occurrence_count, 3);
        let source_total: u64 = p.source_counts.values().sum();
        assert_eq!(p.occurrence_count, source_total);
        assert_eq!(p.source_counts["s1"], 2);
        assert_eq!(p.source_counts["s2"], 1);
    }

    #[test]
    fn proposal_samples_dedup_and_cap() {
        let mut p = apply_proposal_increment(None, "salsa", "s1", "s1:e1", "Salsa", now());
        for i in 0..10 {
            p = apply_proposal_increment(
                Some(p), "salsa", "s1", &format!("s1:e{i}"), "Salsa", now(),
            );
        }
        assert_eq!(p.sample_events.len(), PROPOSAL_SAMPLE_CAP);
        // Newest first
        assert_eq!(p.sample_events[0].event_id, "s1:e9");
        // e1 counted twice but sampled once
        let e1_count = p.sample_events.iter().filter(|s| s.event_id == "s1:e1").count();
        assert!(e1_count <= 1);
    }
}
