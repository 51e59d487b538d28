//! Behavioral user profiles derived from recent interaction history.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use hearth_common::types::{
    ContentType, EngagementStyle, TimeOfDayPatterns, UserProfile, PERSONALIZATION_THRESHOLD,
    PROFILE_INTERACTION_LIMIT,
};
use hearth_store::{EventStore, InteractionStore, SeriesStore};

/// Vector hydration happens in chunked reads of this size.
const VECTOR_CHUNK: usize = 10;

/// Dwell-time thresholds (seconds) for engagement style.
const DEEP_READER_DWELL: f64 = 10.0;
const QUICK_BROWSER_DWELL: f64 = 3.0;
/// Average feed position past which a user counts as a deep scroller.
const SCROLLS_DEEP_POSITION: f64 = 20.0;

pub struct ProfileBuilder {
    interactions: Arc<dyn InteractionStore>,
    events: Arc<dyn EventStore>,
    series: Arc<dyn SeriesStore>,
}

impl ProfileBuilder {
    pub fn new(
        interactions: Arc<dyn InteractionStore>,
        events: Arc<dyn EventStore>,
        series: Arc<dyn SeriesStore>,
    ) -> Self {
        Self {
            interactions,
            events,
            series,
        }
    }

    pub async fn has_enough_data_for_personalization(&self, user_id: &str) -> Result<bool> {
        let recent = self
            .interactions
            .recent_interactions(user_id, PERSONALIZATION_THRESHOLD)
            .await?;
        Ok(recent.len() >= PERSONALIZATION_THRESHOLD)
    }

    /// Derive the profile from the most recent interactions: embedding
    /// centroid of positively-acted content, per-type affinity, time-of-day
    /// histogram, engagement style.
    pub async fn build_user_profile(&self, user_id: &str) -> Result<UserProfile> {
        let recent = self
            .interactions
            .recent_interactions(user_id, PROFILE_INTERACTION_LIMIT)
            .await?;

        // --- Embedding centroid ---
        let mut event_ids = Vec::new();
        let mut series_ids = Vec::new();
        for interaction in &recent {
            if !interaction.action.is_positive() {
                continue;
            }
            match interaction.content_type {
                ContentType::Event => event_ids.push(interaction.content_id.clone()),
                ContentType::EventSeries => series_ids.push(interaction.content_id.clone()),
                _ => {}
            }
        }
        event_ids.sort();
        event_ids.dedup();
        series_ids.sort();
        series_ids.dedup();

        let mut vectors: Vec<Vec<f32>> = Vec::new();
        for chunk in event_ids.chunks(VECTOR_CHUNK) {
            for event in self.events.get_events(chunk).await? {
                if let Some(vector) = event.vector {
                    vectors.push(vector);
                }
            }
        }
        for chunk in series_ids.chunks(VECTOR_CHUNK) {
            for series in self.series.get_series_many(chunk).await? {
                if let Some(vector) = series.vector {
                    vectors.push(vector);
                }
            }
        }
        let embedding = mean_vector(&vectors);

        // --- Content-type affinity ---
        let mut weight_sums: HashMap<ContentType, f64> = HashMap::new();
        let mut type_counts: HashMap<ContentType, usize> = HashMap::new();
        for interaction in &recent {
            *weight_sums.entry(interaction.content_type).or_insert(0.0) +=
                interaction.action.weight();
            *type_counts.entry(interaction.content_type).or_insert(0) += 1;
        }
        let content_type_affinity: HashMap<ContentType, f64> = weight_sums
            .into_iter()
            .map(|(content_type, sum)| {
                let count = type_counts[&content_type] as f64;
                (content_type, (sum / count / 10.0).clamp(-1.0, 1.0))
            })
            .collect();

        // --- Time-of-day histogram ---
        let mut time_of_day_patterns = TimeOfDayPatterns::default();
        for interaction in &recent {
            time_of_day_patterns.bump(interaction.context.time_of_day);
        }

        // --- Engagement style ---
        let dwell_samples: Vec<f64> =
            recent.iter().filter_map(|i| i.dwell_time).collect();
        let avg_dwell_time = if dwell_samples.is_empty() {
            0.0
        } else {
            dwell_samples.iter().sum::<f64>() / dwell_samples.len() as f64
        };
        let avg_position = if recent.is_empty() {
            0.0
        } else {
            recent.iter().map(|i| i.context.position as f64).sum::<f64>() / recent.len() as f64
        };
        let engagement_style = EngagementStyle {
            is_deep_reader: !dwell_samples.is_empty() && avg_dwell_time > DEEP_READER_DWELL,
            quick_browser: !dwell_samples.is_empty() && avg_dwell_time < QUICK_BROWSER_DWELL,
            scrolls_deep: avg_position > SCROLLS_DEEP_POSITION,
            avg_dwell_time,
            avg_position,
        };

        debug!(
            user_id,
            interactions = recent.len(),
            vectors = vectors.len(),
            has_centroid = embedding.is_some(),
            "profile built"
        );

        Ok(UserProfile {
            user_id: user_id.to_string(),
            embedding,
            content_type_affinity,
            time_of_day_patterns,
            engagement_style,
            total_interactions: recent.len(),
            last_active_at: recent.first().map(|i| i.timestamp),
        })
    }
}

/// Element-wise arithmetic mean; None when the input is empty.
pub fn mean_vector(vectors: &[Vec<f32>]) -> Option<Vec<f32>> {
    let first = vectors.first()?;
    let dim = first.len();
    let mut sum = vec![0.0f32; dim];
    let mut counted = 0usize;
    for vector in vectors {
        if vector.len() != dim {
            continue;
        }
        for (acc, value) in sum.iter_mut().zip(vector) {
            *acc += value;
        }
        counted += 1;
    }
    if counted == 0 {
        return None;
    }
    for value in &mut sum {
        *value /= counted as f32;
    }
    Some(sum)
}
