use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use tracing::warn;

use hearth_common::time::Window;
use hearth_common::HearthError;
use hearth_feed::content::Content;
use hearth_feed::feed::FeedQuery;
use hearth_feed::interactions::{NewInteraction, PinnedQuery};
use hearth_feed::ranker::RankedItem;
use hearth_ingest::runtime::{build_ingestor, run_sources};
use hearth_store::ProposalStore;

use crate::error::error_response;
use crate::AppState;

const PROPOSAL_LIMIT_MAX: usize = 100;
const PROPOSAL_LIMIT_DEFAULT: usize = 20;

// --- Query structs ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedParams {
    user_id: Option<String>,
    start: Option<String>,
    days: Option<u32>,
    page_size: Option<usize>,
    page_token: Option<String>,
    tags: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinnedParams {
    mode: Option<String>,
    start: Option<String>,
    end: Option<String>,
    page_size: Option<usize>,
    page_token: Option<String>,
}

#[derive(Deserialize)]
pub struct ProposalParams {
    limit: Option<usize>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinBody {
    event_id: String,
    #[serde(default)]
    pinned: Option<bool>,
}

#[derive(Deserialize)]
pub struct BatchBody {
    interactions: Vec<NewInteraction>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminIngestBody {
    #[serde(default)]
    source_id: Option<String>,
    #[serde(default)]
    days: Option<i64>,
    #[serde(default)]
    force: Option<bool>,
}

// --- Helpers ---

fn parse_timestamp(value: &str, field: &str) -> Result<DateTime<Utc>, HearthError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| HearthError::Validation(format!("{field} must be an RFC 3339 timestamp")))
}

fn window_json(window: &Window) -> serde_json::Value {
    serde_json::json!({
        "start": window.start.to_rfc3339(),
        "end": window.end.to_rfc3339(),
    })
}

fn ranked_item_json(item: &RankedItem) -> serde_json::Value {
    match &item.content {
        Content::Event(event) => {
            let mut value = serde_json::to_value(event).unwrap_or_default();
            if let Some(map) = value.as_object_mut() {
                map.insert("contentType".to_string(), serde_json::json!("event"));
                map.insert("score".to_string(), serde_json::json!(item.score));
            }
            value
        }
        Content::Series(series) => {
            let mut value = serde_json::to_value(series).unwrap_or_default();
            if let Some(map) = value.as_object_mut() {
                map.insert("score".to_string(), serde_json::json!(item.score));
            }
            value
        }
        Content::Bundle(bundle) => serde_json::json!({
            "id": bundle.id,
            "title": bundle.title,
            "contentType": "event-category-bundle",
            "tags": bundle.tags,
            "createdAt": bundle.created_at.to_rfc3339(),
            "score": item.score,
            "metadata": {
                "bundle": {
                    "categoryId": bundle.bundle.category_id,
                    "categoryName": bundle.bundle.category_name,
                    "hostName": bundle.bundle.host_name,
                    "seriesIds": bundle.bundle.series_ids,
                    "newSeriesIds": bundle.bundle.new_series_ids,
                    "displaySeries": bundle.bundle.display_series,
                    "totalSeriesCount": bundle.bundle.total_series_count,
                    "bundleState": {
                        "categoryId": bundle.bundle.category_id,
                        "version": bundle.bundle.version,
                    },
                },
            },
        }),
    }
}

// --- Handlers ---

pub async fn api_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let store_status = match state.store.ping().await {
        Ok(()) => "ok",
        Err(e) => {
            warn!(error = %e, "store ping failed");
            "error"
        }
    };

    Json(serde_json::json!({
        "status": if store_status == "ok" { "ok" } else { "degraded" },
        "services": {
            "store": store_status,
            "llm": if state.config.anthropic_api_key.is_empty() { "unconfigured" } else { "configured" },
            "embeddings": if state.config.voyage_api_key.is_empty() { "unconfigured" } else { "configured" },
        },
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

pub async fn api_feed(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FeedParams>,
) -> Response {
    let start = match params.start.as_deref() {
        Some(raw) => match parse_timestamp(raw, "start") {
            Ok(t) => Some(t),
            Err(e) => return error_response(&e),
        },
        None => None,
    };

    let tags: Vec<String> = params
        .tags
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    let query = FeedQuery {
        user_id: params.user_id.filter(|u| !u.is_empty()),
        start,
        days: params.days,
        page_size: params.page_size,
        page_token: params.page_token,
        tags,
    };

    let mut rng = StdRng::from_os_rng();
    match state.feed.run(&query, &mut rng).await {
        Ok(page) => {
            let events: Vec<serde_json::Value> =
                page.items.iter().map(ranked_item_json).collect();
            Json(serde_json::json!({
                "count": events.len(),
                "events": events,
                "nextPageToken": page.next_page_token,
                "isCaughtUp": page.is_caught_up,
                "window": window_json(&page.window),
                "personalized": page.personalized,
            }))
            .into_response()
        }
        Err(e) => error_response(&e),
    }
}

pub async fn api_interaction(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewInteraction>,
) -> Response {
    match state.interactions.record_interactions(&[body]).await {
        Ok(ids) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "success": true,
                "interactionId": ids.first(),
            })),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn api_interactions_batch(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BatchBody>,
) -> Response {
    match state.interactions.record_interactions(&body.interactions).await {
        Ok(ids) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "success": true,
                "count": ids.len(),
                "interactionIds": ids,
            })),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

/// The optional `x-user-id` header must agree with the path.
fn check_user_header(headers: &HeaderMap, user_id: &str) -> Result<(), HearthError> {
    match headers.get("x-user-id").and_then(|v| v.to_str().ok()) {
        Some(header_user) if header_user != user_id => Err(HearthError::Auth(
            "x-user-id header does not match the requested user".to_string(),
        )),
        _ => Ok(()),
    }
}

pub async fn api_get_pinned(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
    Query(params): Query<PinnedParams>,
) -> Response {
    if let Err(e) = check_user_header(&headers, &user_id) {
        return error_response(&e);
    }

    let parse = |value: Option<&str>, field: &str| -> Result<Option<DateTime<Utc>>, HearthError> {
        value.map(|raw| parse_timestamp(raw, field)).transpose()
    };
    let (start, end) = match (
        parse(params.start.as_deref(), "start"),
        parse(params.end.as_deref(), "end"),
    ) {
        (Ok(start), Ok(end)) => (start, end),
        (Err(e), _) | (_, Err(e)) => return error_response(&e),
    };

    let query = PinnedQuery {
        mode: params.mode,
        start,
        end,
        page_size: params.page_size,
        page_token: params.page_token,
    };

    match state.interactions.get_pinned_events(&user_id, &query).await {
        Ok(page) => Json(serde_json::json!({
            "events": page.events,
            "nextPageToken": page.next_page_token,
            "window": window_json(&page.window),
            "updatedAt": page.updated_at.to_rfc3339(),
        }))
        .into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn api_set_pinned(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<PinBody>,
) -> Response {
    if let Err(e) = check_user_header(&headers, &user_id) {
        return error_response(&e);
    }
    if body.event_id.trim().is_empty() {
        return error_response(&HearthError::Validation("eventId must be non-empty".into()));
    }

    let pinned = body.pinned.unwrap_or(true);
    match state
        .interactions
        .set_event_pin(&user_id, &body.event_id, pinned)
        .await
    {
        Ok(pin) => Json(serde_json::json!({
            "pinned": pinned,
            "event": pin,
        }))
        .into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn api_tag_proposals(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ProposalParams>,
) -> Response {
    let limit = params.limit.unwrap_or(PROPOSAL_LIMIT_DEFAULT);
    if limit == 0 || limit > PROPOSAL_LIMIT_MAX {
        return error_response(&HearthError::Validation(format!(
            "limit must be between 1 and {PROPOSAL_LIMIT_MAX}"
        )));
    }

    match state.store.top_proposals(limit).await {
        Ok(proposals) => Json(serde_json::json!({
            "count": proposals.len(),
            "proposals": proposals,
        }))
        .into_response(),
        Err(e) => {
            warn!(error = %e, "failed to load tag proposals");
            error_response(&HearthError::Upstream(e.to_string()))
        }
    }
}

/// Admin trigger: run ingest for one source (or all) over an explicit
/// window, the same shape the scheduler uses.
pub async fn api_admin_ingest(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AdminIngestBody>,
) -> Response {
    let days = body.days.unwrap_or(30).clamp(1, 90);

    if state.ingest_running.swap(true, Ordering::SeqCst) {
        return error_response(&HearthError::Validation(
            "an ingest run is already in progress".to_string(),
        ));
    }

    let now = Utc::now();
    let window = Window::new(now, now + Duration::days(days))
        .expect("admin ingest window is non-empty");
    let ingestor = build_ingestor(&state.config, &state.store);
    let outcomes = run_sources(
        &ingestor,
        &state.config,
        body.source_id.as_deref(),
        window,
        body.force.unwrap_or(false),
    )
    .await;

    state.ingest_running.store(false, Ordering::SeqCst);

    let sources: Vec<serde_json::Value> = outcomes
        .iter()
        .map(|outcome| match &outcome.result {
            Ok(stats) => serde_json::json!({
                "sourceId": outcome.source_id,
                "fetched": stats.fetched,
                "created": stats.created,
                "updated": stats.updated,
                "skipped": stats.skipped,
            }),
            Err(e) => serde_json::json!({
                "sourceId": outcome.source_id,
                "error": e.to_string(),
            }),
        })
        .collect();

    Json(serde_json::json!({ "sources": sources })).into_response()
}
