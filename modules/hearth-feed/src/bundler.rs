//! Per-user "new items in category X" bundles.
//!
//! Candidate series sharing a `(host, category)` collapse into one synthetic
//! feed item whose displayed series are the ones added since the user last
//! saw the category.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::debug;

use hearth_common::time::Window;
use hearth_common::types::{ContentStats, EventCategory, EventSeries, UserCategoryBundleState};
use hearth_store::{BundleStateStore, CategoryStore, SeriesStore};

use crate::content::{BundleInfo, BundleItem};
use crate::profile::mean_vector;

pub struct Bundler {
    series: Arc<dyn SeriesStore>,
    categories: Arc<dyn CategoryStore>,
    bundle_state: Arc<dyn BundleStateStore>,
}

/// Result of bundling: the synthetic items plus the candidates that stayed
/// ungrouped (no host or category key).
pub struct BundleOutcome {
    pub bundles: Vec<BundleItem>,
    pub ungrouped: Vec<EventSeries>,
}

impl Bundler {
    pub fn new(
        series: Arc<dyn SeriesStore>,
        categories: Arc<dyn CategoryStore>,
        bundle_state: Arc<dyn BundleStateStore>,
    ) -> Self {
        Self {
            series,
            categories,
            bundle_state,
        }
    }

    pub async fn build_bundles(
        &self,
        user_id: &str,
        candidates: Vec<EventSeries>,
        window: Window,
    ) -> Result<BundleOutcome> {
        // 1. Partition by (host, category); either key missing = ungrouped
        let mut groups: HashMap<String, Vec<EventSeries>> = HashMap::new();
        let mut ungrouped = Vec::new();
        for series in candidates {
            match series.category_id.clone() {
                Some(category_id) if !series.host.id.is_empty() => {
                    groups.entry(category_id).or_default().push(series);
                }
                _ => ungrouped.push(series),
            }
        }

        if groups.is_empty() {
            return Ok(BundleOutcome {
                bundles: Vec::new(),
                ungrouped,
            });
        }

        // 2. Load categories and the user's last-seen state
        let category_ids: Vec<String> = groups.keys().cloned().collect();
        let categories = self.categories.get_categories(&category_ids).await?;
        let categories: HashMap<String, EventCategory> =
            categories.into_iter().map(|c| (c.id.clone(), c)).collect();
        let states = self.bundle_state.bundle_states(user_id, &category_ids).await?;

        let mut bundles = Vec::new();
        for (category_id, members) in groups {
            let Some(category) = categories.get(&category_id) else {
                // Dangling category reference: the series pass through alone
                ungrouped.extend(members);
                continue;
            };

            // 3. Hydrate the full member set, windowed, earliest first
            let hydrated = self.hydrate_members(category, window).await?;
            if hydrated.is_empty() {
                continue;
            }

            let state = states.get(&category_id);
            let hydrated_ids: Vec<String> = hydrated.iter().map(|s| s.id.clone()).collect();

            // 4. Diff against the change log
            let new_series_ids = compute_new_series_ids(category, state, &hydrated_ids);

            // 5. A seen, unchanged category emits nothing
            if state.is_some() && new_series_ids.is_empty() {
                debug!(user_id, category = %category.name, "bundle caught up, skipped");
                continue;
            }

            bundles.push(build_bundle_item(category, &hydrated, state, new_series_ids));
        }

        Ok(BundleOutcome { bundles, ungrouped })
    }

    async fn hydrate_members(
        &self,
        category: &EventCategory,
        window: Window,
    ) -> Result<Vec<EventSeries>> {
        let mut members = self.series.get_series_many(&category.series_ids).await?;
        members.retain(|s| s.next_start_time.map(|t| window.contains(t)).unwrap_or(false));
        members.sort_by(|a, b| {
            a.next_start_time
                .cmp(&b.next_start_time)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(members)
    }
}

/// New member ids for a user: everything on first sight; otherwise the union
/// of change-log additions past the last seen version, falling back to the
/// full set when the log has been truncated away.
fn compute_new_series_ids(
    category: &EventCategory,
    state: Option<&UserCategoryBundleState>,
    windowed_ids: &[String],
) -> Vec<String> {
    let Some(state) = state else {
        return windowed_ids.to_vec();
    };

    let mut added: Vec<String> = category
        .change_log
        .iter()
        .filter(|entry| entry.version > state.last_seen_version)
        .flat_map(|entry| entry.added_series_ids.iter().cloned())
        .filter(|id| windowed_ids.contains(id))
        .collect();
    added.sort();
    added.dedup();

    if added.is_empty() && category.version > state.last_seen_version {
        return windowed_ids.to_vec();
    }
    added
}

fn build_bundle_item(
    category: &EventCategory,
    members: &[EventSeries],
    state: Option<&UserCategoryBundleState>,
    new_series_ids: Vec<String>,
) -> BundleItem {
    let host_name = members
        .first()
        .map(|s| s.host.name.clone())
        .unwrap_or_else(|| category.host_id.clone());

    let mut tags: Vec<String> = members.iter().flat_map(|s| s.tags.iter().cloned()).collect();
    tags.sort();
    tags.dedup();

    let member_vectors: Vec<Vec<f32>> =
        members.iter().filter_map(|s| s.vector.clone()).collect();
    let embedding = mean_vector(&member_vectors);

    // Element-wise sum of member engagement counters. Series documents do
    // not carry counters of their own, so this is the members' shared zero
    // until interaction-derived stats land on series.
    let stats = members
        .iter()
        .map(|_| ContentStats::default())
        .fold(ContentStats::default(), |acc, s| acc.add(&s));

    let created_at: DateTime<Utc> = members
        .iter()
        .map(|s| s.created_at)
        .max()
        .unwrap_or_else(Utc::now);

    let series_ids: Vec<String> = members.iter().map(|s| s.id.clone()).collect();
    let display_series = if state.is_none() {
        series_ids.clone()
    } else {
        new_series_ids.clone()
    };

    BundleItem {
        id: format!("bundle:{}", category.id),
        title: format!("{} · {}", category.name, host_name),
        tags,
        embedding,
        created_at,
        stats,
        bundle: BundleInfo {
            category_id: category.id.clone(),
            category_name: category.name.clone(),
            host_name,
            version: category.version,
            total_series_count: series_ids.len(),
            series_ids,
            new_series_ids,
            display_series,
        },
    }
}
