use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Document caps ---

/// Breadcrumb audit chains are capped on every write.
pub const BREADCRUMB_CAP: usize = 20;
/// Rolling upcoming-occurrence window per series.
pub const OCCURRENCE_CAP: usize = 20;
/// Occurrences older than this many hours are evicted on write.
pub const OCCURRENCE_GRACE_HOURS: i64 = 24;
/// Category change log keeps the most recent entries only.
pub const CHANGELOG_CAP: usize = 25;
/// Category tag union cap.
pub const CATEGORY_TAG_CAP: usize = 50;
/// Category sample-title cap.
pub const CATEGORY_SAMPLE_CAP: usize = 8;
/// Sample events kept per tag proposal.
pub const PROPOSAL_SAMPLE_CAP: usize = 5;
/// Tag slugs recorded as proposals per event.
pub const PROPOSAL_TAGS_PER_EVENT: usize = 10;
/// Interactions considered when deriving a profile.
pub const PROFILE_INTERACTION_LIMIT: usize = 200;
/// Interactions required before the feed personalizes.
pub const PERSONALIZATION_THRESHOLD: usize = 20;

// --- Content types and actions ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentType {
    Event,
    EventSeries,
    EventCategoryBundle,
    FlashOffer,
    Poll,
    Request,
    Photo,
    Announcement,
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ContentType::Event => "event",
            ContentType::EventSeries => "event-series",
            ContentType::EventCategoryBundle => "event-category-bundle",
            ContentType::FlashOffer => "flash-offer",
            ContentType::Poll => "poll",
            ContentType::Request => "request",
            ContentType::Photo => "photo",
            ContentType::Announcement => "announcement",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ContentType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "event" => Ok(Self::Event),
            "event-series" => Ok(Self::EventSeries),
            "event-category-bundle" => Ok(Self::EventCategoryBundle),
            "flash-offer" => Ok(Self::FlashOffer),
            "poll" => Ok(Self::Poll),
            "request" => Ok(Self::Request),
            "photo" => Ok(Self::Photo),
            "announcement" => Ok(Self::Announcement),
            other => Err(format!("unknown ContentType: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InteractionAction {
    Viewed,
    Liked,
    Shared,
    Bookmarked,
    Dismissed,
    NotInterested,
    Attended,
    Engaged,
    Commented,
}

impl InteractionAction {
    /// Scalar weight fed into content-type affinity.
    pub fn weight(&self) -> f64 {
        match self {
            InteractionAction::Viewed => 0.1,
            InteractionAction::Liked => 3.0,
            InteractionAction::Shared => 5.0,
            InteractionAction::Bookmarked => 4.0,
            InteractionAction::Dismissed => -2.0,
            InteractionAction::NotInterested => -5.0,
            InteractionAction::Attended => 10.0,
            InteractionAction::Engaged => 4.0,
            InteractionAction::Commented => 4.0,
        }
    }

    /// Actions whose content vectors feed the embedding centroid.
    pub fn is_positive(&self) -> bool {
        matches!(
            self,
            InteractionAction::Liked
                | InteractionAction::Bookmarked
                | InteractionAction::Shared
                | InteractionAction::Attended
                | InteractionAction::Engaged
        )
    }
}

impl std::fmt::Display for InteractionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InteractionAction::Viewed => "viewed",
            InteractionAction::Liked => "liked",
            InteractionAction::Shared => "shared",
            InteractionAction::Bookmarked => "bookmarked",
            InteractionAction::Dismissed => "dismissed",
            InteractionAction::NotInterested => "not-interested",
            InteractionAction::Attended => "attended",
            InteractionAction::Engaged => "engaged",
            InteractionAction::Commented => "commented",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for InteractionAction {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "viewed" => Ok(Self::Viewed),
            "liked" => Ok(Self::Liked),
            "shared" => Ok(Self::Shared),
            "bookmarked" => Ok(Self::Bookmarked),
            "dismissed" => Ok(Self::Dismissed),
            "not-interested" => Ok(Self::NotInterested),
            "attended" => Ok(Self::Attended),
            "engaged" => Ok(Self::Engaged),
            "commented" => Ok(Self::Commented),
            other => Err(format!("unknown InteractionAction: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeOfDay {
    /// 06-12 morning, 12-18 afternoon, 18-22 evening, else night.
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            6..=11 => TimeOfDay::Morning,
            12..=17 => TimeOfDay::Afternoon,
            18..=21 => TimeOfDay::Evening,
            _ => TimeOfDay::Night,
        }
    }

    pub const ALL: [TimeOfDay; 4] = [
        TimeOfDay::Morning,
        TimeOfDay::Afternoon,
        TimeOfDay::Evening,
        TimeOfDay::Night,
    ];
}

impl std::str::FromStr for TimeOfDay {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "morning" => Ok(Self::Morning),
            "afternoon" => Ok(Self::Afternoon),
            "evening" => Ok(Self::Evening),
            "night" => Ok(Self::Night),
            other => Err(format!("unknown TimeOfDay: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl std::str::FromStr for DayOfWeek {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monday" => Ok(Self::Monday),
            "tuesday" => Ok(Self::Tuesday),
            "wednesday" => Ok(Self::Wednesday),
            "thursday" => Ok(Self::Thursday),
            "friday" => Ok(Self::Friday),
            "saturday" => Ok(Self::Saturday),
            "sunday" => Ok(Self::Sunday),
            other => Err(format!("unknown DayOfWeek: {other}")),
        }
    }
}

// --- Canonical event ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSource {
    pub source_id: String,
    pub source_event_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Venue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_location: Option<String>,
}

impl Venue {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.address.is_none() && self.raw_location.is_none()
    }

    /// Best human-readable label for occurrence/pin denormalization.
    pub fn label(&self) -> Option<String> {
        self.name
            .clone()
            .or_else(|| self.address.clone())
            .or_else(|| self.raw_location.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateSource {
    Llm,
    Embedding,
    Keyword,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagCandidate {
    pub tag: String,
    /// Confidence in [0, 1].
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    pub source: CandidateSource,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub candidates: Vec<TagCandidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// One link in an event's append-only audit chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breadcrumb {
    #[serde(rename = "type")]
    pub kind: String,
    pub source_id: String,
    pub source_event_id: String,
    pub fetched_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// A normalized event. Identity is `{sourceId}:{sourceEventId}`; the record
/// is rewritten whole by the event store and merge-patched by the series and
/// category layers, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalEvent {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_all_day: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<Venue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organizer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Sorted-unique slugs, stop-word filtered.
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
    /// Dense vector; length equals the deployment's embedding dimension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
    #[serde(default)]
    pub breadcrumbs: Vec<Breadcrumb>,
    pub source: EventSource,
    pub last_fetched_at: DateTime<Utc>,
    /// Upstream modification stamp used for change detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_category_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_category_name: Option<String>,
}

pub const UNTITLED_EVENT: &str = "Untitled Event";

// --- Series ---

/// Denormalized occurrence inside a series' rolling window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    pub event_id: String,
    pub title: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesHost {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organizer: Option<String>,
    #[serde(default)]
    pub source_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesStats {
    pub upcoming_count: u32,
}

/// Recurring events sharing `(host, title)`. Identity is
/// `{hostId}__{slug(title)}` (tail-hashed past 200 chars).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSeries {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Always `event-series`.
    pub content_type: ContentType,
    pub host: SeriesHost,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub breadcrumbs: Vec<Breadcrumb>,
    pub source: EventSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<Venue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_slug: Option<String>,
    /// Ascending by start time, capped at [`OCCURRENCE_CAP`].
    #[serde(default)]
    pub upcoming_occurrences: Vec<Occurrence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_occurrence: Option<Occurrence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
    pub stats: SeriesStats,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// --- Categories ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryChange {
    pub version: u64,
    pub added_series_ids: Vec<String>,
    #[serde(default)]
    pub added_series_titles: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Host-scoped bucket of series. The version/change-log pair backs per-user
/// "what's new" diffs; both mutate in the same transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCategory {
    pub id: String,
    pub host_id: String,
    pub name: String,
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Union of member-series tags, capped at [`CATEGORY_TAG_CAP`].
    #[serde(default)]
    pub tags: Vec<String>,
    /// Most recent member titles, capped at [`CATEGORY_SAMPLE_CAP`].
    #[serde(default)]
    pub sample_series_titles: Vec<String>,
    #[serde(default)]
    pub series_ids: Vec<String>,
    /// Monotonic, >= 1.
    pub version: u64,
    /// Most recent [`CHANGELOG_CAP`] entries, newest last.
    #[serde(default)]
    pub change_log: Vec<CategoryChange>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// --- Tag proposals ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalSample {
    pub event_id: String,
    pub title: String,
    pub seen_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagProposal {
    pub slug: String,
    pub occurrence_count: u64,
    #[serde(default)]
    pub source_counts: HashMap<String, u64>,
    /// Newest first, capped at [`PROPOSAL_SAMPLE_CAP`], unique by event id.
    #[serde(default)]
    pub sample_events: Vec<ProposalSample>,
    pub status: ProposalStatus,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    Pending,
    Accepted,
    Rejected,
}

// --- Interactions ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionContext {
    pub position: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub time_of_day: TimeOfDay,
    pub day_of_week: DayOfWeek,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInteraction {
    pub id: String,
    pub user_id: String,
    pub content_id: String,
    pub content_type: ContentType,
    pub action: InteractionAction,
    /// Seconds spent on the item, when the client reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dwell_time: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub context: InteractionContext,
    #[serde(default)]
    pub content_tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

// --- Derived profile ---

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeOfDayPatterns {
    pub morning: u32,
    pub afternoon: u32,
    pub evening: u32,
    pub night: u32,
}

impl TimeOfDayPatterns {
    pub fn get(&self, bucket: TimeOfDay) -> u32 {
        match bucket {
            TimeOfDay::Morning => self.morning,
            TimeOfDay::Afternoon => self.afternoon,
            TimeOfDay::Evening => self.evening,
            TimeOfDay::Night => self.night,
        }
    }

    pub fn bump(&mut self, bucket: TimeOfDay) {
        match bucket {
            TimeOfDay::Morning => self.morning += 1,
            TimeOfDay::Afternoon => self.afternoon += 1,
            TimeOfDay::Evening => self.evening += 1,
            TimeOfDay::Night => self.night += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.morning + self.afternoon + self.evening + self.night
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementStyle {
    pub is_deep_reader: bool,
    pub quick_browser: bool,
    pub scrolls_deep: bool,
    pub avg_dwell_time: f64,
    pub avg_position: f64,
}

/// Derived per-user profile. Rebuilt from the last
/// [`PROFILE_INTERACTION_LIMIT`] interactions, never stored long-term.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Per-content-type affinity scaled to [-1, 1].
    #[serde(default)]
    pub content_type_affinity: HashMap<ContentType, f64>,
    pub time_of_day_patterns: TimeOfDayPatterns,
    pub engagement_style: EngagementStyle,
    pub total_interactions: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_active_at: Option<DateTime<Utc>>,
}

// --- Pins ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinnedEvent {
    pub event_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub event_start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_end_time: Option<DateTime<Utc>>,
    pub content_type: ContentType,
    pub source: EventSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_name: Option<String>,
    pub pinned_at: DateTime<Utc>,
    /// True for occurrences synthesized from a pinned series.
    #[serde(default)]
    pub derived: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinnedSeries {
    pub series_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_name: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub source: EventSource,
    pub pinned_at: DateTime<Utc>,
}

// --- Bundle state ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCategoryBundleState {
    pub user_id: String,
    pub category_id: String,
    pub last_seen_version: u64,
    pub last_seen_at: DateTime<Utc>,
}

// --- Feed content stats ---

/// Engagement counters attached to rankable content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentStats {
    pub views: u64,
    pub likes: u64,
    pub shares: u64,
    pub bookmarks: u64,
}

impl ContentStats {
    pub fn add(&self, other: &ContentStats) -> ContentStats {
        ContentStats {
            views: self.views + other.views,
            likes: self.likes + other.likes,
            shares: self.shares + other.shares,
            bookmarks: self.bookmarks + other.bookmarks,
        }
    }
}
