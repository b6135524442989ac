//! Axum router and all HTTP handlers for cvd-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. Every data route reads one cached [`Generation`], so a
//! response never mixes two publishes.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::get,
    Json, Router,
};
use cvd_schemas::Generation;
use futures_util::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::error;

use crate::{
    api_types::{
        ErrorResponse, HealthResponse, IdsQuery, LastUpdatedResponse, LocationsQuery,
        StatusResponse, TopQuery,
    },
    query::{filter_locations, parse_limit, provinces_of, select_by_ids, top_countries, SortField},
    state::{uptime_secs, AppState, BusMsg},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .route("/v1/stream", get(stream))
        .route("/v1/totals", get(totals))
        .route("/v1/last-updated", get(last_updated))
        .route("/v1/global-time-series", get(global_time_series))
        .route("/v1/countries", get(countries))
        .route("/v1/locations", get(locations))
        .route("/v1/locations/:id_key", get(location_by_id))
        .route("/v1/locations-by-ids", get(locations_by_ids))
        .route("/v1/provinces/:country", get(provinces))
        .route("/v1/top/:field", get(top))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn error_response(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: msg.into() })).into_response()
}

/// Load the published generation or produce the 404 / 500 response.
async fn published(st: &AppState) -> Result<Arc<Generation>, Response> {
    match st.cache.get().await {
        Ok(Some(g)) => Ok(g),
        Ok(None) => Err(error_response(
            StatusCode::NOT_FOUND,
            "no generation has been published yet",
        )),
        Err(e) => {
            error!(error = %format!("{e:#}"), "generation load failed");
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to load the published generation",
            ))
        }
    }
}

// ---------------------------------------------------------------------------
// GET /v1/health  /v1/status
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let body = StatusResponse {
        daemon_uptime_secs: uptime_secs(),
        store: st.store_name.to_string(),
        cache_ttl_secs: st.cache.ttl().as_secs(),
        cache_age_secs: st.cache.age_secs().await,
        last_run: st.last_run.read().await.clone(),
    };
    (StatusCode::OK, Json(body))
}

// ---------------------------------------------------------------------------
// Totals document
// ---------------------------------------------------------------------------

pub(crate) async fn totals(State(st): State<Arc<AppState>>) -> Response {
    match published(&st).await {
        Ok(g) => Json(&g.totals).into_response(),
        Err(resp) => resp,
    }
}

pub(crate) async fn last_updated(State(st): State<Arc<AppState>>) -> Response {
    match published(&st).await {
        Ok(g) => Json(LastUpdatedResponse {
            last_updated: g.totals.timestamp,
        })
        .into_response(),
        Err(resp) => resp,
    }
}

pub(crate) async fn global_time_series(State(st): State<Arc<AppState>>) -> Response {
    match published(&st).await {
        Ok(g) => Json(&g.totals.time_series_total_cases_by_date).into_response(),
        Err(resp) => resp,
    }
}

pub(crate) async fn countries(State(st): State<Arc<AppState>>) -> Response {
    match published(&st).await {
        Ok(g) => Json(&g.totals.all_countries).into_response(),
        Err(resp) => resp,
    }
}

// ---------------------------------------------------------------------------
// Location records
// ---------------------------------------------------------------------------

pub(crate) async fn locations(
    State(st): State<Arc<AppState>>,
    Query(q): Query<LocationsQuery>,
) -> Response {
    match published(&st).await {
        Ok(g) => {
            Json(filter_locations(&g.locations, &q, &st.no_province_exceptions)).into_response()
        }
        Err(resp) => resp,
    }
}

pub(crate) async fn location_by_id(
    State(st): State<Arc<AppState>>,
    Path(id_key): Path<String>,
) -> Response {
    let g = match published(&st).await {
        Ok(g) => g,
        Err(resp) => return resp,
    };
    match g.locations.iter().find(|r| r.id_key == id_key) {
        Some(r) => Json(r).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("unknown location '{id_key}'")),
    }
}

pub(crate) async fn locations_by_ids(
    State(st): State<Arc<AppState>>,
    Query(q): Query<IdsQuery>,
) -> Response {
    let ids: Vec<&str> = q
        .ids
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    match published(&st).await {
        Ok(g) => Json(select_by_ids(&g.locations, &ids)).into_response(),
        Err(resp) => resp,
    }
}

pub(crate) async fn provinces(
    State(st): State<Arc<AppState>>,
    Path(country): Path<String>,
) -> Response {
    match published(&st).await {
        Ok(g) => Json(provinces_of(&g.locations, &country)).into_response(),
        Err(resp) => resp,
    }
}

pub(crate) async fn top(
    State(st): State<Arc<AppState>>,
    Path(field): Path<String>,
    Query(q): Query<TopQuery>,
) -> Response {
    let field: SortField = match field.parse() {
        Ok(f) => f,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, msg),
    };
    let limit = match parse_limit(q.limit) {
        Ok(n) => n,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, msg),
    };
    match published(&st).await {
        Ok(g) => Json(top_countries(&g.locations, field, limit)).into_response(),
        Err(resp) => resp,
    }
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    // Ends the response on shutdown so graceful shutdown is not held open.
    let events = broadcast_to_sse(rx).take_until(st.shutdown_requested());

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let event_name = match &m {
                    BusMsg::Heartbeat { .. } => "heartbeat",
                    BusMsg::Run(_) => "run",
                };
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(event_name).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}
