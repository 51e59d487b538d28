//! Uniform content model for the ranker.
//!
//! The ranker reads exactly one capability set off every candidate; the
//! tagged enum keeps events, series, and synthetic bundles distinct without
//! any dynamic dispatch.

use chrono::{DateTime, Utc};
use serde::Serialize;

use hearth_common::types::{CanonicalEvent, ContentStats, ContentType, EventSeries};

/// The six fields the ranker reads from every candidate.
pub trait Scorable {
    fn id(&self) -> &str;
    fn title(&self) -> &str;
    fn content_type(&self) -> ContentType;
    fn tags(&self) -> &[String];
    fn embedding(&self) -> Option<&[f32]>;
    fn created_at(&self) -> DateTime<Utc>;
    fn stats(&self) -> ContentStats;
}

/// Synthetic "new items in category X" feed item.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleInfo {
    pub category_id: String,
    pub category_name: String,
    pub host_name: String,
    pub version: u64,
    pub series_ids: Vec<String>,
    pub new_series_ids: Vec<String>,
    pub display_series: Vec<String>,
    pub total_series_count: usize,
}

#[derive(Debug, Clone)]
pub struct BundleItem {
    /// `bundle:{categoryId}`
    pub id: String,
    /// `{categoryName} · {hostName}`
    pub title: String,
    pub tags: Vec<String>,
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    pub stats: ContentStats,
    pub bundle: BundleInfo,
}

#[derive(Debug, Clone)]
pub enum Content {
    Event(CanonicalEvent),
    Series(EventSeries),
    Bundle(BundleItem),
}

impl Scorable for Content {
    fn id(&self) -> &str {
        match self {
            Content::Event(e) => &e.id,
            Content::Series(s) => &s.id,
            Content::Bundle(b) => &b.id,
        }
    }

    fn title(&self) -> &str {
        match self {
            Content::Event(e) => &e.title,
            Content::Series(s) => &s.title,
            Content::Bundle(b) => &b.title,
        }
    }

    fn content_type(&self) -> ContentType {
        match self {
            Content::Event(_) => ContentType::Event,
            Content::Series(_) => ContentType::EventSeries,
            Content::Bundle(_) => ContentType::EventCategoryBundle,
        }
    }

    fn tags(&self) -> &[String] {
        match self {
            Content::Event(e) => &e.tags,
            Content::Series(s) => &s.tags,
            Content::Bundle(b) => &b.tags,
        }
    }

    fn embedding(&self) -> Option<&[f32]> {
        match self {
            Content::Event(e) => e.vector.as_deref(),
            Content::Series(s) => s.vector.as_deref(),
            Content::Bundle(b) => b.embedding.as_deref(),
        }
    }

    fn created_at(&self) -> DateTime<Utc> {
        match self {
            Content::Event(e) => e.created_at,
            Content::Series(s) => s.created_at,
            Content::Bundle(b) => b.created_at,
        }
    }

    fn stats(&self) -> ContentStats {
        match self {
            Content::Event(_) | Content::Series(_) => ContentStats::default(),
            Content::Bundle(b) => b.stats,
        }
    }
}
