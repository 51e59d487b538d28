use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use chrono::{Duration, Utc};
use chrono_tz::Tz;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use hearth_common::time::Window;
use hearth_common::Config;
use hearth_feed::bundler::Bundler;
use hearth_feed::feed::FeedService;
use hearth_feed::interactions::InteractionService;
use hearth_feed::profile::ProfileBuilder;
use hearth_feed::ranker::RankWeights;
use hearth_ingest::runtime::{build_ingestor, run_sources};
use hearth_store::PgStore;

mod auth;
mod error;
mod rest;

pub struct AppState {
    pub config: Config,
    pub store: PgStore,
    pub feed: FeedService,
    pub interactions: InteractionService,
    pub ingest_running: AtomicBool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("hearth=info".parse()?))
        .init();

    let config = Config::api_from_env();
    config.log_redacted();

    let display_tz: Tz = config
        .display_time_zone
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid DISPLAY_TIME_ZONE: {}", config.display_time_zone))?;

    let store = PgStore::connect(&config.database_url).await?;
    hearth_store::migrate::migrate(store.pool()).await?;

    let feed = FeedService::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        ProfileBuilder::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
        ),
        Bundler::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
        ),
        RankWeights::default(),
        display_tz,
    );

    let interactions = InteractionService::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        display_tz,
    );

    let state = Arc::new(AppState {
        config: config.clone(),
        store: store.clone(),
        feed,
        interactions,
        ingest_running: AtomicBool::new(false),
    });

    let app = Router::new()
        .route("/status", get(rest::api_status))
        .route("/feed", get(rest::api_feed))
        .route("/interactions", post(rest::api_interaction))
        .route("/interactions/batch", post(rest::api_interactions_batch))
        .route(
            "/users/{user_id}/pinned-events",
            get(rest::api_get_pinned).post(rest::api_set_pinned),
        )
        .route("/tag-proposals", get(rest::api_tag_proposals))
        .route("/admin/ingest", post(rest::api_admin_ingest))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ))
        .with_state(state.clone())
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([
                    header::CONTENT_TYPE,
                    header::HeaderName::from_static("x-api-key"),
                    header::HeaderName::from_static("x-user-id"),
                ]),
        )
        // Method + path + status only; query params stay out of the logs
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        );

    if config.ingest_interval_minutes > 0 {
        start_ingest_interval(state.clone());
    }

    let addr = format!("{}:{}", config.web_host, config.web_port);
    info!("Hearth API starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// In-process scheduler: a full ingest across all configured sources every
/// `INGEST_INTERVAL_MINUTES`. Runs are skipped while one is in flight.
fn start_ingest_interval(state: Arc<AppState>) {
    let minutes = state.config.ingest_interval_minutes;
    info!(minutes, "ingest interval enabled");

    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(minutes * 60));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await; // immediate first tick is skipped

        loop {
            ticker.tick().await;

            if state.ingest_running.swap(true, Ordering::SeqCst) {
                info!("previous ingest still running, skipping tick");
                continue;
            }

            let now = Utc::now();
            let window = Window::new(now, now + Duration::days(30))
                .expect("scheduler window is non-empty");
            let ingestor = build_ingestor(&state.config, &state.store);
            let outcomes =
                run_sources(&ingestor, &state.config, None, window, false).await;

            let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
            if failed > 0 {
                error!(failed, total = outcomes.len(), "scheduled ingest had failures");
            } else {
                info!(sources = outcomes.len(), "scheduled ingest complete");
            }

            state.ingest_running.store(false, Ordering::SeqCst);
        }
    });
}
