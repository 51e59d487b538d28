//! Six-signal behavioral ranking with an explore/exploit mix.
//!
//! Given identical profile, candidates, and clock the ranking is
//! deterministic; the exploration shuffle takes an explicit RNG so tests
//! seed it.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rand::Rng;

use hearth_common::time::time_of_day;
use hearth_common::types::{UserProfile, PERSONALIZATION_THRESHOLD};

use crate::content::{Content, Scorable};

/// Signal weights. Defaults are the tuned production values; popularity and
/// recency are deliberately small.
#[derive(Debug, Clone, Copy)]
pub struct RankWeights {
    pub topic: f64,
    pub content_type: f64,
    pub time: f64,
    pub style: f64,
    pub recency: f64,
    pub popularity: f64,
}

impl Default for RankWeights {
    fn default() -> Self {
        Self {
            topic: 0.40,
            content_type: 0.25,
            time: 0.15,
            style: 0.10,
            recency: 0.05,
            popularity: 0.05,
        }
    }
}

/// Default exploit share of the exploration mix.
pub const DEFAULT_EXPLOIT_RATIO: f64 = 0.8;

/// Title length at which the style signal saturates.
const STYLE_TITLE_SPAN: f64 = 200.0;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoreComponents {
    pub topic: f64,
    pub content_type: f64,
    pub time: f64,
    pub style: f64,
    pub recency: f64,
    pub popularity: f64,
}

#[derive(Debug, Clone)]
pub struct RankedItem {
    pub content: Content,
    pub score: f64,
    pub components: ScoreComponents,
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn score_one(
    content: &Content,
    profile: &UserProfile,
    now: DateTime<Utc>,
    tz: Tz,
    weights: &RankWeights,
) -> (f64, ScoreComponents) {
    let topic = match (content.embedding(), profile.embedding.as_deref()) {
        (Some(candidate), Some(centroid)) => cosine_similarity(candidate, centroid).max(0.0),
        _ => 0.0,
    };

    let content_type = profile
        .content_type_affinity
        .get(&content.content_type())
        .map(|affinity| (affinity + 1.0) / 2.0)
        .unwrap_or(0.5);

    let patterns = &profile.time_of_day_patterns;
    let time = if patterns.total() == 0 {
        0.5
    } else {
        patterns.get(time_of_day(now, tz)) as f64 / patterns.total() as f64
    };

    let title_len = content.title().chars().count() as f64;
    let style = if profile.engagement_style.is_deep_reader {
        (title_len / STYLE_TITLE_SPAN).min(1.0)
    } else if profile.engagement_style.quick_browser {
        (1.0 - title_len / STYLE_TITLE_SPAN).max(0.0)
    } else {
        0.5
    };

    let age_hours = (now - content.created_at()).num_seconds().max(0) as f64 / 3600.0;
    let recency = (-age_hours / 24.0).exp();

    let stats = content.stats();
    let popularity = if stats.views == 0 {
        0.0
    } else {
        let engagement =
            stats.likes as f64 + 2.0 * stats.shares as f64 + 1.5 * stats.bookmarks as f64;
        (engagement / stats.views as f64 / 0.2).min(1.0)
    };

    let components = ScoreComponents {
        topic,
        content_type,
        time,
        style,
        recency,
        popularity,
    };
    let score = weights.topic * topic
        + weights.content_type * content_type
        + weights.time * time
        + weights.style * style
        + weights.recency * recency
        + weights.popularity * popularity;

    (score, components)
}

/// Rank candidates for a user. Returns the ranked list and whether the
/// ordering is personalized. Users below the interaction threshold, or with
/// no embedding centroid, get the cold-start ordering: ascending createdAt,
/// all scores zero.
pub fn rank(
    candidates: Vec<Content>,
    profile: Option<&UserProfile>,
    now: DateTime<Utc>,
    tz: Tz,
    weights: &RankWeights,
) -> (Vec<RankedItem>, bool) {
    let personalized = profile
        .map(|p| p.total_interactions >= PERSONALIZATION_THRESHOLD && p.embedding.is_some())
        .unwrap_or(false);

    if !personalized {
        let mut items: Vec<RankedItem> = candidates
            .into_iter()
            .map(|content| RankedItem {
                content,
                score: 0.0,
                components: ScoreComponents::default(),
            })
            .collect();
        items.sort_by(|a, b| {
            a.content
                .created_at()
                .cmp(&b.content.created_at())
                .then_with(|| a.content.id().cmp(b.content.id()))
        });
        return (items, false);
    }

    let profile = profile.expect("personalized implies profile");
    let mut items: Vec<RankedItem> = candidates
        .into_iter()
        .map(|content| {
            let (score, components) = score_one(&content, profile, now, tz, weights);
            RankedItem {
                content,
                score,
                components,
            }
        })
        .collect();

    items.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.content.id().cmp(b.content.id()))
    });
    (items, true)
}

/// Explore/exploit mix: keep the top `exploit_ratio` share, fill the rest
/// with a random sample of the tail, and shuffle the combined list
/// (Fisher-Yates over the provided RNG).
pub fn apply_exploration_mix<R: Rng>(
    ranked: Vec<RankedItem>,
    exploit_ratio: f64,
    rng: &mut R,
) -> Vec<RankedItem> {
    let total = ranked.len();
    if total < 2 {
        return ranked;
    }

    let exploit_count = ((total as f64) * exploit_ratio.clamp(0.0, 1.0)).floor() as usize;
    let mut iter = ranked.into_iter();
    let mut mixed: Vec<RankedItem> = iter.by_ref().take(exploit_count).collect();

    let mut tail: Vec<RankedItem> = iter.collect();
    fisher_yates(&mut tail, rng);
    let explore_count = total - exploit_count;
    mixed.extend(tail.into_iter().take(explore_count));

    fisher_yates(&mut mixed, rng);
    mixed
}

fn fisher_yates<T, R: Rng>(items: &mut [T], rng: &mut R) {
    for i in (1..items.len()).rev() {
        let j = rng.random_range(0..=i);
        items.swap(i, j);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use hearth_common::types::*;

    fn la() -> Tz {
        "America/Los_Angeles".parse().unwrap()
    }

    fn now() -> DateTime<Utc> {
        // 19:00 LA on a Saturday evening
        Utc.with_ymd_and_hms(2024, 6, 16, 2, 0, 0).unwrap()
    }

    fn event(id: &str, title: &str, vector: Option<Vec<f32>>, created: DateTime<Utc>) -> Content {
        Content::Event(CanonicalEvent {
            id: id.to_string(),
            title: title.to_string(),
            description: None,
            start_time: now() + chrono::Duration::days(1),
            end_time: None,
            time_zone: None,
            is_all_day: None,
            venue: None,
            organizer: None,
            price: None,
            status: None,
            tags: vec![],
            classification: None,
            vector,
            breadcrumbs: vec![],
            source: EventSource {
                source_id: "s1".to_string(),
                source_event_id: id.to_string(),
                source_url: None,
            },
            last_fetched_at: now(),
            last_updated_at: None,
            created_at: created,
            series_id: None,
            series_category_id: None,
            series_category_name: None,
        })
    }

    fn profile(embedding: Option<Vec<f32>>, interactions: usize) -> UserProfile {
        let mut patterns = TimeOfDayPatterns::default();
        patterns.evening = 8;
        patterns.morning = 2;
        UserProfile {
            user_id: "u1".to_string(),
            embedding,
            content_type_affinity: [(ContentType::Event, 0.6)].into_iter().collect(),
            time_of_day_patterns: patterns,
            engagement_style: EngagementStyle::default(),
            total_interactions: interactions,
            last_active_at: None,
        }
    }

    #[test]
    fn cosine_similarity_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn cold_start_orders_by_created_at() {
        let candidates = vec![
            event("b", "B", None, now() - chrono::Duration::hours(1)),
            event("a", "A", None, now() - chrono::Duration::hours(3)),
        ];
        let (ranked, personalized) =
            rank(candidates, None, now(), la(), &RankWeights::default());
        assert!(!personalized);
        assert_eq!(ranked[0].content.id(), "a");
        assert!(ranked.iter().all(|r| r.score == 0.0));
    }

    #[test]
    fn below_threshold_profile_is_cold_start() {
        let p = profile(Some(vec![1.0, 0.0]), PERSONALIZATION_THRESHOLD - 1);
        let candidates = vec![event("a", "A", Some(vec![1.0, 0.0]), now())];
        let (_, personalized) =
            rank(candidates, Some(&p), now(), la(), &RankWeights::default());
        assert!(!personalized);
    }

    #[test]
    fn missing_centroid_is_cold_start() {
        let p = profile(None, 50);
        let candidates = vec![event("a", "A", Some(vec![1.0, 0.0]), now())];
        let (_, personalized) =
            rank(candidates, Some(&p), now(), la(), &RankWeights::default());
        assert!(!personalized);
    }

    #[test]
    fn topic_similarity_dominates_ranking() {
        let p = profile(Some(vec![1.0, 0.0]), 50);
        let candidates = vec![
            event("far", "Far", Some(vec![0.0, 1.0]), now()),
            event("near", "Near", Some(vec![1.0, 0.0]), now()),
        ];
        let (ranked, personalized) =
            rank(candidates, Some(&p), now(), la(), &RankWeights::default());
        assert!(personalized);
        assert_eq!(ranked[0].content.id(), "near");
        assert!(ranked[0].components.topic > ranked[1].components.topic);
    }

    #[test]
    fn time_score_reflects_evening_history() {
        let p = profile(Some(vec![1.0, 0.0]), 50);
        let candidates = vec![event("a", "A", Some(vec![1.0, 0.0]), now())];
        let (ranked, _) = rank(candidates, Some(&p), now(), la(), &RankWeights::default());
        // 8 of 10 interactions were evening; now() is evening in LA
        assert!((ranked[0].components.time - 0.8).abs() < 1e-9);
    }

    #[test]
    fn ranking_is_deterministic() {
        let p = profile(Some(vec![0.7, 0.3]), 50);
        let mk = || {
            vec![
                event("a", "Alpha", Some(vec![0.7, 0.3]), now() - chrono::Duration::hours(2)),
                event("b", "Beta", Some(vec![0.5, 0.5]), now() - chrono::Duration::hours(1)),
                event("c", "Gamma", None, now()),
            ]
        };
        let (first, _) = rank(mk(), Some(&p), now(), la(), &RankWeights::default());
        let (second, _) = rank(mk(), Some(&p), now(), la(), &RankWeights::default());
        let ids = |items: &[RankedItem]| {
            items.iter().map(|r| r.content.id().to_string()).collect::<Vec<_>>()
        };
        assert_eq!(ids(&first), ids(&second));
    }

    #[test]
    fn seeded_mix_is_deterministic_and_preserves_membership() {
        let p = profile(Some(vec![1.0, 0.0]), 50);
        let candidates: Vec<Content> = (0..10)
            .map(|i| {
                event(
                    &format!("e{i}"),
                    "Title",
                    Some(vec![1.0 - i as f32 * 0.1, 0.0]),
                    now(),
                )
            })
            .collect();
        let (ranked, _) = rank(candidates, Some(&p), now(), la(), &RankWeights::default());

        let mixed_a =
            apply_exploration_mix(ranked.clone(), DEFAULT_EXPLOIT_RATIO, &mut StdRng::seed_from_u64(7));
        let mixed_b =
            apply_exploration_mix(ranked.clone(), DEFAULT_EXPLOIT_RATIO, &mut StdRng::seed_from_u64(7));

        let ids = |items: &[RankedItem]| {
            items.iter().map(|r| r.content.id().to_string()).collect::<Vec<_>>()
        };
        assert_eq!(ids(&mixed_a), ids(&mixed_b));
        assert_eq!(mixed_a.len(), ranked.len());

        let mut sorted_a = ids(&mixed_a);
        let mut sorted_orig = ids(&ranked);
        sorted_a.sort();
        sorted_orig.sort();
        assert_eq!(sorted_a, sorted_orig);
    }
}
