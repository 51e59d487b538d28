//! Feed assembly: candidates → bundles → profile → ranking → pagination.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rand::Rng;
use tracing::debug;

use hearth_common::slug::slugify;
use hearth_common::time::{days_window, Window};
use hearth_common::HearthError;
use hearth_store::{EventStore, SeriesStore};

use crate::bundler::Bundler;
use crate::content::Content;
use crate::pagination::{decode_page_token, paginate};
use crate::profile::ProfileBuilder;
use crate::ranker::{apply_exploration_mix, rank, RankWeights, RankedItem, DEFAULT_EXPLOIT_RATIO};

pub const FEED_DAYS_MAX: u32 = 31;
pub const FEED_DAYS_DEFAULT: u32 = 1;
pub const FEED_PAGE_MAX: usize = 50;
pub const FEED_PAGE_DEFAULT: usize = 20;
pub const FEED_TAGS_MAX: usize = 10;

/// Upper bound on candidates pulled per collection per request.
const CANDIDATE_LIMIT: usize = 200;

#[derive(Debug, Clone, Default)]
pub struct FeedQuery {
    pub user_id: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub days: Option<u32>,
    pub page_size: Option<usize>,
    pub page_token: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug)]
pub struct FeedPage {
    pub items: Vec<RankedItem>,
    pub next_page_token: Option<String>,
    pub is_caught_up: bool,
    pub window: Window,
    pub personalized: bool,
}

pub struct FeedService {
    events: Arc<dyn EventStore>,
    series: Arc<dyn SeriesStore>,
    profiles: ProfileBuilder,
    bundler: Bundler,
    weights: RankWeights,
    display_tz: Tz,
}

impl FeedService {
    pub fn new(
        events: Arc<dyn EventStore>,
        series: Arc<dyn SeriesStore>,
        profiles: ProfileBuilder,
        bundler: Bundler,
        weights: RankWeights,
        display_tz: Tz,
    ) -> Self {
        Self {
            events,
            series,
            profiles,
            bundler,
            weights,
            display_tz,
        }
    }

    pub async fn run<R: Rng>(
        &self,
        query: &FeedQuery,
        rng: &mut R,
    ) -> Result<FeedPage, HearthError> {
        let days = query.days.unwrap_or(FEED_DAYS_DEFAULT);
        if days == 0 || days > FEED_DAYS_MAX {
            return Err(HearthError::Validation(format!(
                "days must be between 1 and {FEED_DAYS_MAX}"
            )));
        }
        let page_size = query.page_size.unwrap_or(FEED_PAGE_DEFAULT);
        if page_size == 0 || page_size > FEED_PAGE_MAX {
            return Err(HearthError::Validation(format!(
                "pageSize must be between 1 and {FEED_PAGE_MAX}"
            )));
        }
        if query.tags.len() > FEED_TAGS_MAX {
            return Err(HearthError::Validation(format!(
                "at most {FEED_TAGS_MAX} tags per query"
            )));
        }
        let tags: Vec<String> = query
            .tags
            .iter()
            .map(|t| slugify(t))
            .filter(|t| !t.is_empty())
            .collect();
        let offset = match query.page_token.as_deref() {
            Some(token) => decode_page_token(token)?,
            None => 0,
        };

        let now = Utc::now();
        let window = days_window(query.start.unwrap_or(now), days, self.display_tz);

        // --- Candidates ---
        let events = self
            .events
            .events_in_window(window, &tags, CANDIDATE_LIMIT)
            .await
            .map_err(|e| HearthError::Upstream(e.to_string()))?;
        let series = self
            .series
            .series_in_window(window, &tags, CANDIDATE_LIMIT)
            .await
            .map_err(|e| HearthError::Upstream(e.to_string()))?;

        let mut candidates: Vec<Content> = events.into_iter().map(Content::Event).collect();

        // Series collapse into per-user category bundles; anonymous requests
        // see every series individually
        match query.user_id.as_deref() {
            Some(user_id) => {
                let outcome = self
                    .bundler
                    .build_bundles(user_id, series, window)
                    .await
                    .map_err(|e| HearthError::Upstream(e.to_string()))?;
                candidates.extend(outcome.ungrouped.into_iter().map(Content::Series));
                candidates.extend(outcome.bundles.into_iter().map(Content::Bundle));
            }
            None => {
                candidates.extend(series.into_iter().map(Content::Series));
            }
        }

        // --- Profile + ranking ---
        let profile = match query.user_id.as_deref() {
            Some(user_id) => Some(
                self.profiles
                    .build_user_profile(user_id)
                    .await
                    .map_err(|e| HearthError::Upstream(e.to_string()))?,
            ),
            None => None,
        };

        let (ranked, personalized) = rank(
            candidates,
            profile.as_ref(),
            now,
            self.display_tz,
            &self.weights,
        );
        let mixed = if personalized {
            apply_exploration_mix(ranked, DEFAULT_EXPLOIT_RATIO, rng)
        } else {
            ranked
        };

        debug!(
            user = query.user_id.as_deref().unwrap_or("-"),
            candidates = mixed.len(),
            personalized,
            "feed assembled"
        );

        let page = paginate(mixed, offset, page_size);
        Ok(FeedPage {
            is_caught_up: page.next_page_token.is_none(),
            next_page_token: page.next_page_token,
            items: page.items,
            window,
            personalized,
        })
    }
}
