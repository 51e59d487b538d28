use anyhow::Result;
use chrono::{Duration, Utc};
use tracing::info;
use tracing_subscriber::EnvFilter;

use hearth_common::config::Config;
use hearth_common::time::Window;
use hearth_ingest::pipeline::IngestStats;
use hearth_ingest::runtime::{build_ingestor, run_sources};
use hearth_store::PgStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("hearth=info".parse()?))
        .init();

    info!("Hearth ingest starting...");

    let config = Config::ingest_from_env();
    config.log_redacted();

    let store = PgStore::connect(&config.database_url).await?;
    hearth_store::migrate::migrate(store.pool()).await?;

    let ingestor = build_ingestor(&config, &store);

    // Window: INGEST_DAYS ahead of now (default 30); INGEST_FORCE re-classifies
    let days: i64 = std::env::var("INGEST_DAYS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(30);
    let force = matches!(
        std::env::var("INGEST_FORCE").unwrap_or_default().as_str(),
        "1" | "true"
    );
    let source_filter = std::env::var("INGEST_SOURCE").ok().filter(|s| !s.is_empty());

    let now = Utc::now();
    let window = Window::new(now, now + Duration::days(days.max(1)))
        .expect("ingest window is non-empty");

    let outcomes = run_sources(&ingestor, &config, source_filter.as_deref(), window, force).await;

    let mut total = IngestStats::default();
    let mut failures = 0usize;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(stats) => total.absorb(*stats),
            Err(_) => failures += 1,
        }
    }

    info!("All sources done. {total}");

    if !outcomes.is_empty() && failures == outcomes.len() {
        anyhow::bail!("every configured source failed");
    }
    Ok(())
}
