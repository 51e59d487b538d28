//! Host-scoped category assignment for series.
//!
//! The LLM proposes a category name and whether to reuse or create; a
//! case- and accent-insensitive name match against the host's existing
//! categories decides what actually happens, regardless of the declared
//! action.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{debug, info, warn};

use ai_client::claude::Claude;
use hearth_common::ids::category_id;
use hearth_common::slug::{name_key, slugify};
use hearth_common::types::{EventCategory, EventSeries, CATEGORY_SAMPLE_CAP};
use hearth_store::{logic, CategoryStore, SeriesStore};

/// Sample titles shown per existing category in the prompt.
const PROMPT_SAMPLE_CAP: usize = 5;

// ---------------------------------------------------------------------------
// Classifier contract
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryAction {
    UseExisting,
    CreateNew,
}

#[derive(Debug, Clone)]
pub struct CategoryDecision {
    pub name: String,
    pub action: CategoryAction,
    pub reason: Option<String>,
}

/// A reduced view of an existing category for the prompt.
#[derive(Debug, Clone)]
pub struct CategorySummary {
    pub name: String,
    pub sample_titles: Vec<String>,
}

#[async_trait]
pub trait CategoryClassifier: Send + Sync {
    async fn classify(
        &self,
        series: &EventSeries,
        existing: &[CategorySummary],
    ) -> Result<CategoryDecision>;
}

// --- Claude implementation ---

#[derive(Debug, Deserialize, JsonSchema)]
struct CategoryWire {
    /// 2-4 word category name
    name: String,
    /// "use-existing" or "create-new"
    action: String,
    reason: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct CategoryResponse {
    category: CategoryWire,
}

pub struct ClaudeCategoryClassifier {
    claude: Claude,
}

impl ClaudeCategoryClassifier {
    pub fn new(anthropic_api_key: &str) -> Self {
        Self {
            claude: Claude::new(anthropic_api_key, "claude-haiku-4-5-20251001"),
        }
    }

    pub fn with_claude(claude: Claude) -> Self {
        Self { claude }
    }

    fn build_prompt(series: &EventSeries, existing: &[CategorySummary]) -> (String, String) {
        let system = "You group a host's event series into user-friendly categories.\n\
             Strongly prefer reusing an existing category when one fits.\n\
             New category names are 2-4 plain words a resident would recognize.\n\
             For instructional programming, prefer class-explicit names \
             (\"Pottery Classes\", not \"Pottery\")."
            .to_string();

        let mut user = format!(
            "Host: {}\nSeries title: {}\n",
            series.host.name, series.title
        );
        if let Some(ref description) = series.description {
            user.push_str(&format!("Description: {description}\n"));
        }
        if !series.tags.is_empty() {
            user.push_str(&format!("Tags: {}\n", series.tags.join(", ")));
        }

        if existing.is_empty() {
            user.push_str("\nThis host has no categories yet.\n");
        } else {
            user.push_str("\nExisting categories for this host:\n");
            for category in existing {
                if category.sample_titles.is_empty() {
                    user.push_str(&format!("- {}\n", category.name));
                } else {
                    user.push_str(&format!(
                        "- {} (e.g. {})\n",
                        category.name,
                        category.sample_titles.join("; ")
                    ));
                }
            }
        }

        user.push_str(
            "\nPick the category for this series: reuse an existing name with \
             action \"use-existing\", or propose a new one with action \"create-new\".",
        );
        (system, user)
    }
}

#[async_trait]
impl CategoryClassifier for ClaudeCategoryClassifier {
    async fn classify(
        &self,
        series: &EventSeries,
        existing: &[CategorySummary],
    ) -> Result<CategoryDecision> {
        let (system, user) = Self::build_prompt(series, existing);
        let response: CategoryResponse = self.claude.extract(&system, &user).await?;

        let action = match response.category.action.as_str() {
            "use-existing" => CategoryAction::UseExisting,
            _ => CategoryAction::CreateNew,
        };

        Ok(CategoryDecision {
            name: response.category.name.trim().to_string(),
            action,
            reason: response.category.reason,
        })
    }
}

// ---------------------------------------------------------------------------
// Assigner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Assignment {
    pub category_id: String,
    pub category_name: String,
}

pub struct CategoryAssigner {
    series_store: Arc<dyn SeriesStore>,
    category_store: Arc<dyn CategoryStore>,
    classifier: Arc<dyn CategoryClassifier>,
}

impl CategoryAssigner {
    pub fn new(
        series_store: Arc<dyn SeriesStore>,
        category_store: Arc<dyn CategoryStore>,
        classifier: Arc<dyn CategoryClassifier>,
    ) -> Self {
        Self {
            series_store,
            category_store,
            classifier,
        }
    }

    /// Classify a series into a host-scoped category, reusing or creating as
    /// needed, and merge-patch the assignment back onto the series.
    pub async fn assign_series(
        &self,
        series_id: &str,
        force: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<Assignment>> {
        let Some(series) = self.series_store.get_series(series_id).await? else {
            warn!(series_id, "cannot categorize missing series");
            return Ok(None);
        };

        if !force {
            if let (Some(cid), Some(name)) = (&series.category_id, &series.category_name) {
                return Ok(Some(Assignment {
                    category_id: cid.clone(),
                    category_name: name.clone(),
                }));
            }
        }

        let existing = self.category_store.categories_for_host(&series.host.id).await?;
        let summaries = summarize_for_prompt(&existing);

        let decision = self.classifier.classify(&series, &summaries).await?;
        if decision.name.is_empty() {
            warn!(series_id, "classifier returned empty category name");
            return Ok(None);
        }

        // The name match decides reuse, whatever the declared action was
        let matched = existing
            .iter()
            .find(|c| name_key(&c.name) == name_key(&decision.name));

        let category = match matched {
            Some(found) => {
                debug!(
                    series_id,
                    category = %found.name,
                    declared_action = ?decision.action,
                    "reusing category"
                );
                self.category_store
                    .add_series_to_category(
                        &found.id,
                        &series.id,
                        &series.title,
                        &series.tags,
                        now,
                    )
                    .await?
            }
            None => {
                let id = category_id(&series.host.id, &decision.name);
                let category = logic::new_category(
                    &id,
                    &series.host.id,
                    &decision.name,
                    &series.id,
                    &series.title,
                    &series.tags,
                    decision.reason.clone(),
                    now,
                );
                self.category_store.create_category(&category).await?;
                info!(
                    series_id,
                    category = %decision.name,
                    host = %series.host.name,
                    "created category"
                );
                category
            }
        };

        // Reassignment: detach from the previous category
        if let Some(ref old_id) = series.category_id {
            if old_id != &category.id {
                self.category_store
                    .remove_series_from_category(old_id, &series.id, now)
                    .await?;
            }
        }

        self.series_store
            .update_series_category(
                &series.id,
                &category.id,
                &category.name,
                &slugify(&category.name),
                now,
            )
            .await?;

        Ok(Some(Assignment {
            category_id: category.id,
            category_name: category.name,
        }))
    }
}

/// Reduced summaries ready for a prompt, newest samples first.
pub fn summarize_for_prompt(categories: &[EventCategory]) -> Vec<CategorySummary> {
    categories
        .iter()
        .map(|c| CategorySummary {
            name: c.name.clone(),
            sample_titles: c
                .sample_series_titles
                .iter()
                .rev()
                .take(PROMPT_SAMPLE_CAP.min(CATEGORY_SAMPLE_CAP))
                .cloned()
                .collect(),
        })
        .collect()
}
