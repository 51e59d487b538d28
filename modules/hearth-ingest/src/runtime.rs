//! Production wiring: build the ingestor and adapters from config and drive
//! a run across the configured sources. Shared by the ingest CLI and the
//! API's scheduler/admin triggers.

use std::sync::Arc;

use tracing::{error, info};

use ai_client::openai::OpenAi;
use hearth_common::config::{Config, SourceConfig, SourceKind};
use hearth_common::time::Window;
use hearth_store::PgStore;

use crate::categorizer::{CategoryAssigner, ClaudeCategoryClassifier};
use crate::gateway::{ClassifierGateway, ClaudeTagClassifier};
use crate::pipeline::{IngestStats, Ingestor};
use crate::sources::{CalendarAdapter, FeedApiAdapter, SourceAdapter};

pub fn build_ingestor(config: &Config, store: &PgStore) -> Ingestor {
    let gateway = Arc::new(ClassifierGateway::new(
        Arc::new(ClaudeTagClassifier::new(&config.anthropic_api_key)),
        Arc::new(
            OpenAi::new(&config.voyage_api_key, "voyage-3-large")
                .with_base_url("https://api.voyageai.com/v1"),
        ),
        config.tag_blocklist.clone(),
    ));

    let assigner = Arc::new(CategoryAssigner::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(ClaudeCategoryClassifier::new(&config.anthropic_api_key)),
    ));

    Ingestor::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        gateway,
        assigner,
        config.tag_blocklist.clone(),
    )
}

pub fn build_adapter(source: &SourceConfig) -> Box<dyn SourceAdapter> {
    match source.kind {
        SourceKind::Calendar => Box::new(CalendarAdapter::new(
            source,
            std::env::var("CALENDAR_API_KEY").ok().filter(|k| !k.is_empty()),
        )),
        SourceKind::FeedApi => Box::new(FeedApiAdapter::new(source)),
    }
}

/// Per-source outcome of a multi-source run.
pub struct SourceRunOutcome {
    pub source_id: String,
    pub result: anyhow::Result<IngestStats>,
}

/// Run every configured source (or just `source_filter`) over the window.
/// A failing source is reported and the next one still runs.
pub async fn run_sources(
    ingestor: &Ingestor,
    config: &Config,
    source_filter: Option<&str>,
    window: Window,
    force: bool,
) -> Vec<SourceRunOutcome> {
    let mut outcomes = Vec::new();

    for source in &config.sources {
        if let Some(filter) = source_filter {
            if source.source_id != filter {
                continue;
            }
        }

        let adapter = build_adapter(source);
        let result = ingestor.run_chunked(adapter.as_ref(), window, force).await;
        match &result {
            Ok(stats) => info!(source_id = %source.source_id, "{stats}"),
            Err(e) => {
                error!(source_id = %source.source_id, error = %e, "source ingest failed")
            }
        }
        outcomes.push(SourceRunOutcome {
            source_id: source.source_id.clone(),
            result,
        });
    }

    outcomes
}
