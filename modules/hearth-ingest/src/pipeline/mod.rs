//! Ingest orchestrator: drives prepare → tag → embed → persist for one
//! source, preserving a per-event record across phases.
//!
//! Failure rules: a payload that fails inside any phase is counted as
//! skipped and the run continues; classifier and series errors during
//! persist are logged and the entry is still written. Only the adapter
//! fetch aborts a run.

mod stats;

pub use stats::IngestStats;

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, info, warn};

use hearth_common::slug::normalize_tags;
use hearth_common::time::{chunk_window, Window};
use hearth_common::types::{CanonicalEvent, Classification, TagCandidate};
use hearth_store::{AttachContext, EventStore, ProposalStore, SeriesStore};

use crate::categorizer::CategoryAssigner;
use crate::gateway::{enriched_text, ClassifierGateway};
use crate::sources::{FetchWindow, HostContext, SourceAdapter};

/// One event carried across the pipeline phases.
struct PreparedEvent {
    event: CanonicalEvent,
    raw_snapshot: serde_json::Value,
    host: HostContext,
    existing: Option<CanonicalEvent>,
    reuse: bool,
    candidates: Vec<TagCandidate>,
    tags: Vec<String>,
    vector: Option<Vec<f32>>,
    failed: bool,
}

pub struct Ingestor {
    events: Arc<dyn EventStore>,
    series: Arc<dyn SeriesStore>,
    proposals: Arc<dyn ProposalStore>,
    gateway: Arc<ClassifierGateway>,
    assigner: Arc<CategoryAssigner>,
    blocklist: Vec<String>,
}

impl Ingestor {
    pub fn new(
        events: Arc<dyn EventStore>,
        series: Arc<dyn SeriesStore>,
        proposals: Arc<dyn ProposalStore>,
        gateway: Arc<ClassifierGateway>,
        assigner: Arc<CategoryAssigner>,
        blocklist: Vec<String>,
    ) -> Self {
        Self {
            events,
            series,
            proposals,
            gateway,
            assigner,
            blocklist,
        }
    }

    /// Run the pipeline for one source over one window.
    pub async fn run(
        &self,
        adapter: &dyn SourceAdapter,
        window: &FetchWindow,
        force_refresh: bool,
    ) -> Result<IngestStats> {
        let mut stats = IngestStats::default();

        // Adapter failures cross the run boundary
        let payloads = adapter.fetch_raw_events(window).await?;
        stats.fetched = payloads.len() as u32;
        info!(
            source_id = adapter.source_id(),
            fetched = stats.fetched,
            "ingest run started"
        );

        // --- Phase 0: prepare (sequential — each entry needs its own read) ---
        let mut prepared: Vec<PreparedEvent> = Vec::with_capacity(payloads.len());
        for payload in &payloads {
            let normalized = match adapter.normalize(payload) {
                Ok(n) => n,
                Err(e) => {
                    warn!(
                        source_id = %payload.source_id,
                        source_event_id = %payload.source_event_id,
                        error = %e,
                        "payload failed normalization"
                    );
                    stats.skipped += 1;
                    continue;
                }
            };

            let existing = match self.events.get_event(&normalized.event.id).await {
                Ok(e) => e,
                Err(e) => {
                    warn!(event_id = %normalized.event.id, error = %e, "pre-read failed");
                    stats.skipped += 1;
                    continue;
                }
            };

            let reuse = !force_refresh
                && matches!(
                    (&normalized.event.last_updated_at, existing.as_ref().and_then(|e| e.last_updated_at)),
                    (Some(incoming), Some(stored)) if *incoming == stored
                );

            let mut entry = PreparedEvent {
                event: normalized.event,
                raw_snapshot: normalized.raw_snapshot,
                host: normalized.host,
                existing,
                reuse,
                candidates: Vec::new(),
                tags: Vec::new(),
                vector: None,
                failed: false,
            };

            if entry.reuse {
                if let Some(ref stored) = entry.existing {
                    entry.tags = stored.tags.clone();
                    entry.vector = stored.vector.clone();
                    entry.candidates = stored
                        .classification
                        .as_ref()
                        .map(|c| c.candidates.clone())
                        .unwrap_or_default();
                }
            }

            prepared.push(entry);
        }

        // --- Phase 1: tag classification (fan out across entries) ---
        let classifications = join_all(prepared.iter().map(|entry| async {
            if entry.reuse {
                return None;
            }
            Some(
                self.gateway
                    .classify_tags(&entry.event.title, entry.event.description.as_deref())
                    .await,
            )
        }))
        .await;

        for (entry, candidates) in prepared.iter_mut().zip(classifications) {
            let Some(candidates) = candidates else { continue };
            let candidate_slugs: Vec<&str> = candidates.iter().map(|c| c.tag.as_str()).collect();
            let mut merged: Vec<String> = entry.event.tags.clone();
            merged.extend(candidate_slugs.iter().map(|s| s.to_string()));
            entry.tags = normalize_tags(merged, &self.blocklist);
            entry.candidates = candidates;
        }

        // --- Phase 2: one embedding batch for everything that got tags ---
        let to_embed: Vec<usize> = prepared
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.reuse && !e.failed && !e.tags.is_empty())
            .map(|(i, _)| i)
            .collect();

        if !to_embed.is_empty() {
            let texts: Vec<String> = to_embed
                .iter()
                .map(|&i| {
                    let entry = &prepared[i];
                    enriched_text(
                        &entry.event.title,
                        entry.event.description.as_deref(),
                        &entry.tags,
                    )
                })
                .collect();

            match self.gateway.embed_many(texts).await {
                Ok(vectors) => {
                    for (&i, vector) in to_embed.iter().zip(vectors) {
                        prepared[i].vector = Some(vector);
                    }
                }
                Err(e) => {
                    warn!(entries = to_embed.len(), error = %e, "embedding batch failed");
                    for &i in &to_embed {
                        prepared[i].failed = true;
                    }
                }
            }
        }

        // --- Phase 3: persist (sequential — keeps transactions simple) ---
        let now = Utc::now();
        for mut entry in prepared {
            if entry.failed {
                stats.skipped += 1;
                continue;
            }

            if entry.reuse {
                if let Err(e) = self.events.touch_event(&entry.event.id, entry.event.last_fetched_at).await
                {
                    warn!(event_id = %entry.event.id, error = %e, "touch failed");
                    stats.skipped += 1;
                    continue;
                }
                stats.updated += 1;
                continue;
            }

            // Record tag proposals; losing one never drops the entry
            if !entry.tags.is_empty() {
                if let Err(e) = self
                    .proposals
                    .record_tags(
                        &entry.tags,
                        adapter.source_id(),
                        &entry.event.id,
                        &entry.event.title,
                        now,
                    )
                    .await
                {
                    warn!(event_id = %entry.event.id, error = %e, "proposal recording failed");
                }
            }

            entry.event.tags = entry.tags.clone();
            entry.event.classification = Some(Classification {
                tags: entry.tags.clone(),
                candidates: entry.candidates.clone(),
                metadata: None,
            });
            entry.event.vector = entry.vector.clone();
            if let Some(ref existing) = entry.existing {
                entry.event.created_at = existing.created_at;
                let mut crumbs = existing.breadcrumbs.clone();
                for crumb in std::mem::take(&mut entry.event.breadcrumbs) {
                    hearth_store::logic::push_breadcrumb(&mut crumbs, crumb);
                }
                entry.event.breadcrumbs = crumbs;
            }

            let created = match self
                .events
                .save_event(&entry.event, &entry.raw_snapshot, entry.existing.as_ref())
                .await
            {
                Ok(created) => created,
                Err(e) => {
                    warn!(event_id = %entry.event.id, error = %e, "event save failed");
                    stats.skipped += 1;
                    continue;
                }
            };
            if created {
                stats.created += 1;
            } else {
                stats.updated += 1;
            }

            // Series attach and categorization are best-effort per entry
            let ctx = AttachContext {
                host_id: entry.host.host_id(adapter.source_id()),
                host_name: entry.host.host_name.clone(),
                organizer: entry.host.organizer.clone(),
                source_id: adapter.source_id().to_string(),
            };

            let outcome = match self.series.attach_event(&entry.event, &ctx, now).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(event_id = %entry.event.id, error = %e, "series attach failed");
                    continue;
                }
            };

            let assignment = match self
                .assigner
                .assign_series(&outcome.series_id, outcome.created || force_refresh, now)
                .await
            {
                Ok(assignment) => assignment,
                Err(e) => {
                    warn!(
                        series_id = %outcome.series_id,
                        error = %e,
                        "category assignment failed"
                    );
                    None
                }
            };

            // Back-fill the series assignment onto the event document
            if let Err(e) = self
                .events
                .update_event_series_info(
                    &entry.event.id,
                    &outcome.series_id,
                    assignment.as_ref().map(|a| a.category_id.as_str()),
                    assignment.as_ref().map(|a| a.category_name.as_str()),
                )
                .await
            {
                warn!(event_id = %entry.event.id, error = %e, "series back-fill failed");
            }

            debug!(
                event_id = %entry.event.id,
                series_id = %outcome.series_id,
                categorized = assignment.is_some(),
                "entry persisted"
            );
        }

        info!(source_id = adapter.source_id(), %stats, "ingest run finished");
        Ok(stats)
    }

    /// Drive the pipeline over a large window in contiguous chunks
    /// (exclusive on the right), aggregating stats.
    pub async fn run_chunked(
        &self,
        adapter: &dyn SourceAdapter,
        window: Window,
        force_refresh: bool,
    ) -> Result<IngestStats> {
        let mut total = IngestStats::default();
        for chunk in chunk_window(window, adapter.default_chunk_days()) {
            let stats = self
                .run(adapter, &FetchWindow::Range(chunk), force_refresh)
                .await?;
            total.absorb(stats);
        }
        Ok(total)
    }
}
