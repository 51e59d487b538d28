//! Classifier gateway: LLM tag classification and text embeddings.
//!
//! The tag classifier degrades to an empty candidate list on failure — a
//! missing classification never aborts an ingest entry. Embedding failures
//! propagate after retries; the orchestrator counts the affected entries as
//! skipped.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{debug, warn};

use ai_client::claude::Claude;
use ai_client::traits::EmbedAgent;
use hearth_common::slug::{normalize_tags, slugify};
use hearth_common::types::{CandidateSource, TagCandidate};

/// Default cap on tag suggestions per classification.
pub const MAX_TAG_SUGGESTIONS: usize = 15;

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF_MS: u64 = 250;

// ---------------------------------------------------------------------------
// Tag classifier
// ---------------------------------------------------------------------------

/// What the LLM returns for tag classification.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct TagSuggestionWire {
    /// Noun or noun-phrase tag label
    pub label: String,
    /// Facet: "topic", "activity", "category", "audience", or "vibe"
    pub category: String,
    /// 0.0-1.0 confidence
    pub confidence: f64,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct TagClassifierResponse {
    #[serde(default)]
    pub tags: Vec<TagSuggestionWire>,
}

#[async_trait]
pub trait TagClassifier: Send + Sync {
    /// Suggest tags for an event. Must never fail the caller: degraded
    /// output is an empty list.
    async fn classify_tags(
        &self,
        title: &str,
        description: Option<&str>,
        max_suggestions: usize,
    ) -> Vec<TagCandidate>;
}

pub struct ClaudeTagClassifier {
    claude: Claude,
}

impl ClaudeTagClassifier {
    pub fn new(anthropic_api_key: &str) -> Self {
        Self {
            claude: Claude::new(anthropic_api_key, "claude-haiku-4-5-20251001"),
        }
    }

    pub fn with_claude(claude: Claude) -> Self {
        Self { claude }
    }

    fn system_prompt(max_suggestions: usize) -> String {
        format!(
            "You classify community events into topical tags.\n\
             Return up to {max_suggestions} tags. Every tag label must be a noun or \
             noun phrase. Cover five facets:\n\
             1. the specific topic (e.g. \"salsa dancing\", \"watercolor painting\")\n\
             2. the activity type (e.g. \"dance social\", \"art workshop\")\n\
             3. the broader category (e.g. \"performing arts\", \"visual arts\")\n\
             4. the audience (e.g. \"beginners\", \"families\", \"seniors\")\n\
             5. the vibe (e.g. \"high energy\", \"relaxed\")\n\
             Skip generic filler like \"event\" or \"class\" and calendar words."
        )
    }
}

#[async_trait]
impl TagClassifier for ClaudeTagClassifier {
    async fn classify_tags(
        &self,
        title: &str,
        description: Option<&str>,
        max_suggestions: usize,
    ) -> Vec<TagCandidate> {
        let user_prompt = match description {
            Some(desc) => format!("Title: {title}\n\nDescription: {desc}"),
            None => format!("Title: {title}"),
        };
        let system = Self::system_prompt(max_suggestions);

        let response = with_retry("classify_tags", || {
            self.claude.extract::<TagClassifierResponse>(&system, &user_prompt)
        })
        .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                warn!(title, error = %e, "tag classification degraded to empty");
                return Vec::new();
            }
        };

        let mut candidates: Vec<TagCandidate> = response
            .tags
            .into_iter()
            .filter_map(|t| {
                let slug = slugify(&t.label);
                if slug.is_empty() {
                    return None;
                }
                Some(TagCandidate {
                    tag: slug,
                    confidence: t.confidence.clamp(0.0, 1.0),
                    rationale: Some(t.category),
                    source: CandidateSource::Llm,
                })
            })
            .collect();

        // Descending confidence, first occurrence of each slug wins
        candidates.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let mut seen = std::collections::HashSet::new();
        candidates.retain(|c| seen.insert(c.tag.clone()));
        candidates.truncate(max_suggestions);
        candidates
    }
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

/// Combined result of classifying one event.
#[derive(Debug, Clone)]
pub struct ClassifyOutcome {
    pub tags: Vec<String>,
    pub candidates: Vec<TagCandidate>,
    pub vector: Option<Vec<f32>>,
    pub llm_used: bool,
    pub embeddings_used: bool,
}

pub struct ClassifierGateway {
    classifier: Arc<dyn TagClassifier>,
    embedder: Arc<dyn EmbedAgent>,
    blocklist: Vec<String>,
}

impl ClassifierGateway {
    pub fn new(
        classifier: Arc<dyn TagClassifier>,
        embedder: Arc<dyn EmbedAgent>,
        blocklist: Vec<String>,
    ) -> Self {
        Self {
            classifier,
            embedder,
            blocklist,
        }
    }

    /// Phase-1 entry: candidate tags for one event.
    pub async fn classify_tags(
        &self,
        title: &str,
        description: Option<&str>,
    ) -> Vec<TagCandidate> {
        self.classifier
            .classify_tags(title, description, MAX_TAG_SUGGESTIONS)
            .await
    }

    /// Final tag list from candidates: slugified, stop-word filtered,
    /// sorted-unique.
    pub fn filter_tags(&self, candidates: &[TagCandidate]) -> Vec<String> {
        normalize_tags(candidates.iter().map(|c| c.tag.as_str()), &self.blocklist)
    }

    /// Phase-2 entry: one embedding batch. Retries, then propagates.
    pub async fn embed_many(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        with_retry("embed_many", || self.embedder.embed_batch(texts.clone())).await
    }

    /// Single-text embedding.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        with_retry("embed", || self.embedder.embed(text)).await
    }

    /// One-shot classification of a single event: tags, then the embedding
    /// of the enriched text.
    pub async fn classify(
        &self,
        title: &str,
        description: Option<&str>,
    ) -> Result<ClassifyOutcome> {
        let candidates = self.classify_tags(title, description).await;
        let llm_used = !candidates.is_empty();
        let tags = self.filter_tags(&candidates);

        let vector = if tags.is_empty() {
            None
        } else {
            Some(self.embed(&enriched_text(title, description, &tags)).await?)
        };

        debug!(
            title,
            tags = tags.len(),
            embedded = vector.is_some(),
            "classified event"
        );

        Ok(ClassifyOutcome {
            tags,
            candidates,
            embeddings_used: vector.is_some(),
            vector,
            llm_used,
        })
    }
}

/// Embedding input: title, description, and the generated tags.
pub fn enriched_text(title: &str, description: Option<&str>, tags: &[String]) -> String {
    let mut text = String::with_capacity(title.len() + 64);
    text.push_str(title);
    text.push('\n');
    if let Some(desc) = description {
        text.push_str(desc);
        text.push('\n');
    }
    text.push_str("\nRelated topics: ");
    text.push_str(&tags.join(", "));
    text
}

/// Retry an upstream call with linear backoff (`attempt * 250ms`).
async fn with_retry<T, F, Fut>(label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut last_error = None;
    for attempt in 1..=RETRY_ATTEMPTS {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                debug!(label, attempt, error = %e, "upstream call failed");
                last_error = Some(e);
            }
        }
        if attempt < RETRY_ATTEMPTS {
            tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS * attempt as u64)).await;
        }
    }
    Err(last_error.expect("at least one attempt"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FixedClassifier(Vec<TagCandidate>);

    #[async_trait]
    impl TagClassifier for FixedClassifier {
        async fn classify_tags(&self, _: &str, _: Option<&str>, _: usize) -> Vec<TagCandidate> {
            self.0.clone()
        }
    }

    struct CountingEmbedder {
        calls: AtomicU32,
        fail_first: u32,
    }

    #[async_trait]
    impl EmbedAgent for CountingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                Err(anyhow!("transient"))
            } else {
                Ok(vec![1.0, 0.0])
            }
        }

        async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn candidate(tag: &str, confidence: f64) -> TagCandidate {
        TagCandidate {
            tag: tag.to_string(),
            confidence,
            rationale: None,
            source: CandidateSource::Llm,
        }
    }

    #[test]
    fn enriched_text_shape() {
        let text = enriched_text(
            "Community Yoga",
            Some("Bring a mat"),
            &["yoga".to_string(), "wellness".to_string()],
        );
        assert_eq!(text, "Community Yoga\nBring a mat\n\nRelated topics: yoga, wellness");

        let bare = enriched_text("Community Yoga", None, &["yoga".to_string()]);
        assert_eq!(bare, "Community Yoga\n\nRelated topics: yoga");
    }

    #[tokio::test]
    async fn filter_drops_stop_words_and_blocklist() {
        let gateway = ClassifierGateway::new(
            Arc::new(FixedClassifier(vec![])),
            Arc::new(CountingEmbedder { calls: AtomicU32::new(0), fail_first: 0 }),
            vec!["banned".to_string()],
        );
        let tags = gateway.filter_tags(&[
            candidate("yoga", 0.9),
            candidate("event", 0.8),
            candidate("banned", 0.7),
            candidate("wellness", 0.6),
        ]);
        assert_eq!(tags, vec!["wellness", "yoga"]);
    }

    #[tokio::test]
    async fn classify_combines_tags_and_embedding() {
        let gateway = ClassifierGateway::new(
            Arc::new(FixedClassifier(vec![
                candidate("yoga", 0.9),
                candidate("wellness", 0.7),
            ])),
            Arc::new(CountingEmbedder { calls: AtomicU32::new(0), fail_first: 0 }),
            vec![],
        );

        let outcome = gateway.classify("Community Yoga", None).await.unwrap();
        assert!(outcome.llm_used);
        assert!(outcome.embeddings_used);
        assert_eq!(outcome.vector, Some(vec![1.0, 0.0]));
        assert_eq!(outcome.tags, vec!["wellness", "yoga"]);
    }

    #[tokio::test]
    async fn classify_skips_embedding_when_no_tags_survive() {
        let gateway = ClassifierGateway::new(
            Arc::new(FixedClassifier(vec![candidate("event", 0.9)])),
            Arc::new(CountingEmbedder { calls: AtomicU32::new(0), fail_first: 0 }),
            vec![],
        );

        let outcome = gateway.classify("Untitled Event", None).await.unwrap();
        assert!(outcome.vector.is_none());
        assert!(!outcome.embeddings_used);
    }

    #[tokio::test]
    async fn embed_retries_transient_failures() {
        let embedder = Arc::new(CountingEmbedder { calls: AtomicU32::new(0), fail_first: 2 });
        let gateway = ClassifierGateway::new(
            Arc::new(FixedClassifier(vec![])),
            embedder.clone(),
            vec![],
        );

        let vector = gateway.embed("text").await.unwrap();
        assert_eq!(vector, vec![1.0, 0.0]);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
    }
}
