use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::StreamExt;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::debug;

use crate::config::LookupConfig;
use crate::history::{History, HistoryEntry};
use crate::lookup::LookupOrchestrator;
use crate::progress::{MemoryProgressStore, ProgressHub, ProgressTracker};
use crate::query::SearchQuery;
use crate::search::SearchService;
use crate::sources::DynSource;

const HISTORY_PAGE: usize = 20;

#[derive(Clone)]
pub struct AppState {
    search: Arc<SearchService>,
    tracker: ProgressTracker,
}

impl AppState {
    /// Wire store, hub, orchestrator and search service for `sources`
    /// (already in priority order).
    pub fn build(cfg: &LookupConfig, sources: Vec<DynSource>) -> Self {
        let store = Arc::new(MemoryProgressStore::with_ttl(cfg.progress_ttl()));
        let hub = Arc::new(ProgressHub::new(cfg.channel_capacity));
        let tracker = ProgressTracker::new(store, hub);
        let orchestrator = Arc::new(LookupOrchestrator::new(
            sources,
            tracker.clone(),
            cfg.source_timeout(),
        ));
        let history = Arc::new(History::with_capacity(cfg.history_capacity));
        Self {
            search: Arc::new(SearchService::new(orchestrator, history)),
            tracker,
        }
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    pub fn search(&self) -> &Arc<SearchService> {
        &self.search
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", post(search))
        .route("/search/start", post(start_search))
        .route("/progress/{key}", get(progress))
        .route("/progress/{key}/events", get(progress_events))
        .route("/debug/sources", get(debug_sources))
        .route("/debug/history", get(debug_history))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(serde::Deserialize)]
struct SearchReq {
    query: String,
}

fn bad_query() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "query must not be empty" })),
    )
        .into_response()
}

async fn search(State(state): State<AppState>, Json(body): Json<SearchReq>) -> Response {
    let Some(query) = SearchQuery::parse(&body.query) else {
        return bad_query();
    };
    Json(state.search.search(&query).await).into_response()
}

async fn start_search(State(state): State<AppState>, Json(body): Json<SearchReq>) -> Response {
    let Some(query) = SearchQuery::parse(&body.query) else {
        return bad_query();
    };
    let started = state.search.start(query).await;
    (StatusCode::ACCEPTED, Json(started)).into_response()
}

/// Path keys are normalized the same way search input is, so clients may
/// pass either the raw input or the key returned by a search.
fn key_from_path(raw: &str) -> Option<String> {
    SearchQuery::parse(raw).map(|q| q.key().to_string())
}

async fn progress(State(state): State<AppState>, Path(raw): Path<String>) -> Response {
    let key = key_from_path(&raw);
    let entry = match &key {
        Some(k) => state.tracker.get(k).await,
        None => None,
    };
    match entry {
        Some(entry) => Json(entry).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "status": "not_found", "key": key.unwrap_or(raw) })),
        )
            .into_response(),
    }
}

async fn progress_events(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Response {
    let Some(key) = key_from_path(&raw) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "status": "not_found", "key": raw })),
        )
            .into_response();
    };
    debug!(
        target: "progress",
        subscribers = state.tracker.hub().subscriber_count(&key) + 1,
        "sse client connected"
    );
    let stream = state
        .tracker
        .subscribe(&key)
        .await
        .filter_map(|ev| async move {
            Event::default()
                .event(ev.event_name())
                .json_data(&ev)
                .ok()
                .map(Ok::<_, Infallible>)
        });
    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text("keep-alive"),
        )
        .into_response()
}

async fn debug_sources(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.search.orchestrator().source_names())
}

async fn debug_history(State(state): State<AppState>) -> Json<Vec<HistoryEntry>> {
    Json(state.search.history().snapshot_last_n(HISTORY_PAGE))
}
